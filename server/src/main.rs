mod routes;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    routes::run().await
}
