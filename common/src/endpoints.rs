use crate::config::NetworkConfig;

pub const PATH_INFO: &str = "/info";
pub const PATH_STATE: &str = "/state";

pub const PATH_ROOT: &str = "/";
pub const PATH_TEMPERATURE: &str = "/temperature";
pub const PATH_SETTINGS: &str = "/settings";
pub const PATH_GRAPH: &str = "/graph";

/// Fully qualified URLs the device talks to, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub info_url: String,
    pub state_url: String,
}

impl Endpoints {
    pub fn new(scheme: &str, host: &str) -> Self {
        Self {
            info_url: endpoint_url(scheme, host, PATH_INFO),
            state_url: endpoint_url(scheme, host, PATH_STATE),
        }
    }

    pub fn from_network(network: &NetworkConfig) -> Self {
        Self::new(&network.api_scheme, &network.api_host)
    }
}

pub fn endpoint_url(scheme: &str, host: &str, path: &str) -> String {
    format!("{scheme}://{host}{path}")
}
