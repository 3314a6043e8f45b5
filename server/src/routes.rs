use std::{collections::VecDeque, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use smarthub_common::{
    automation::{self, parse_time_of_day},
    HubSettings, SensorReading, PATH_GRAPH, PATH_INFO, PATH_ROOT, PATH_SETTINGS, PATH_STATE,
    PATH_TEMPERATURE,
};

use crate::store::{AppStore, StateEntry, StoredSettings, MAX_HISTORY_ENTRIES};

const DEFAULT_GRAPH_SIZE: usize = 10;
const TIME_FORMAT: &str = "%H:%M:%S";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Clone)]
struct AppState {
    history: Arc<Mutex<VecDeque<StateEntry>>>,
    settings: Arc<Mutex<Option<StoredSettings>>>,
    store: AppStore,
    timezone: Tz,
    sunset: NaiveTime,
}

struct ServerConfig {
    port: u16,
    data_dir: PathBuf,
    timezone: Tz,
    sunset: NaiveTime,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct SettingsUpdate {
    user_temp: f32,
    user_light: String,
    light_duration: String,
}

#[derive(Debug, Deserialize)]
struct GraphQuery {
    size: Option<usize>,
}

#[derive(Debug, PartialEq, Serialize)]
struct GraphPoint {
    temperature: f32,
    presence: bool,
    datetime: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    let store = AppStore::new(&config.data_dir);

    let history = store.load_history().await.unwrap_or_else(|err| {
        warn!("failed to load history from store: {err:#}");
        Vec::new()
    });
    let settings = store.load_settings().await.unwrap_or_else(|err| {
        warn!("failed to load settings from store: {err:#}");
        None
    });
    if settings.is_none() {
        info!("no settings stored yet; fan and light stay off until PUT {PATH_SETTINGS}");
    }

    let app_state = AppState {
        history: Arc::new(Mutex::new(history.into())),
        settings: Arc::new(Mutex::new(settings)),
        store,
        timezone: config.timezone,
        sunset: config.sunset,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind smart hub server at {addr}"))?;

    info!(
        "smart hub server listening on http://{addr} (timezone {})",
        config.timezone
    );
    axum::serve(listener, router(app_state)).await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route(PATH_ROOT, get(handle_root))
        .route(PATH_INFO, post(handle_post_info))
        .route(PATH_TEMPERATURE, put(handle_post_info))
        .route(PATH_STATE, get(handle_get_state))
        .route(PATH_SETTINGS, put(handle_put_settings))
        .route(PATH_GRAPH, get(handle_get_graph))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

impl ServerConfig {
    fn from_env() -> Self {
        let port = std::env::var("SMARTHUB_HTTP_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("SMARTHUB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.smarthub"));

        let timezone = match std::env::var("SMARTHUB_TIMEZONE") {
            Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!("unknown timezone `{name}`, using America/Jamaica");
                chrono_tz::America::Jamaica
            }),
            Err(_) => chrono_tz::America::Jamaica,
        };

        let default_sunset = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN);
        let sunset = match std::env::var("SMARTHUB_SUNSET") {
            Ok(value) => parse_time_of_day(&value).unwrap_or_else(|err| {
                warn!("{err}; using 18:00:00");
                default_sunset
            }),
            Err(_) => default_sunset,
        };

        Self {
            port,
            data_dir,
            timezone,
            sunset,
        }
    }
}

async fn handle_root() -> impl IntoResponse {
    Json(MessageBody {
        message: "smart hub server is running",
    })
}

async fn handle_post_info(
    State(state): State<AppState>,
    Json(reading): Json<SensorReading>,
) -> Response {
    let now = Utc::now().with_timezone(&state.timezone);
    let settings = state.settings.lock().await.clone();
    let entry = build_entry(&reading, settings.as_ref(), now);

    let snapshot: Vec<StateEntry> = {
        let mut history = state.history.lock().await;
        history.push_back(entry.clone());
        while history.len() > MAX_HISTORY_ENTRIES {
            history.pop_front();
        }
        history.iter().cloned().collect()
    };

    if let Err(err) = state.store.save_history(&snapshot).await {
        warn!("failed to persist history: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist reading");
    }

    info!(
        "reading {:.1}C presence={} -> fan={} light={}",
        entry.temperature, entry.presence, entry.fan, entry.light
    );
    Json(entry).into_response()
}

async fn handle_get_state(State(state): State<AppState>) -> Response {
    if let Some(latest) = state.history.lock().await.back().cloned() {
        return Json(latest).into_response();
    }

    let now = Utc::now().with_timezone(&state.timezone);
    Json(serde_json::json!({
        "presence": false,
        "fan": false,
        "light": false,
        "current_time": now.format(TIMESTAMP_FORMAT).to_string(),
    }))
    .into_response()
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Response {
    if !update.user_temp.is_finite() {
        return error_response(StatusCode::BAD_REQUEST, "user_temp must be a number");
    }

    let resolved = match HubSettings::resolve(
        update.user_temp,
        &update.user_light,
        &update.light_duration,
        state.sunset,
    ) {
        Ok(resolved) => resolved,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let stored = StoredSettings {
        user_temp: resolved.user_temp,
        user_light: resolved.user_light.format(TIME_FORMAT).to_string(),
        light_time_off: resolved.light_time_off.format(TIME_FORMAT).to_string(),
    };

    if let Err(err) = state.store.save_settings(&stored).await {
        warn!("failed to persist settings: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist settings");
    }
    *state.settings.lock().await = Some(stored.clone());

    info!(
        "settings updated: fan at >= {:.1}C, light {}..{}",
        stored.user_temp, stored.user_light, stored.light_time_off
    );
    Json(stored).into_response()
}

async fn handle_get_graph(
    State(state): State<AppState>,
    Query(query): Query<GraphQuery>,
) -> impl IntoResponse {
    let size = query.size.unwrap_or(DEFAULT_GRAPH_SIZE);
    let history = state.history.lock().await;
    Json(graph_points(&history, size))
}

fn build_entry(
    reading: &SensorReading,
    settings: Option<&StoredSettings>,
    now: DateTime<Tz>,
) -> StateEntry {
    let rules = settings.and_then(to_hub_settings);
    let command = automation::evaluate(rules.as_ref(), reading, now.time());

    StateEntry {
        temperature: reading.temperature,
        presence: reading.presence,
        fan: command.fan,
        light: command.light,
        current_time: now.format(TIMESTAMP_FORMAT).to_string(),
    }
}

fn to_hub_settings(stored: &StoredSettings) -> Option<HubSettings> {
    match (
        parse_time_of_day(&stored.user_light),
        parse_time_of_day(&stored.light_time_off),
    ) {
        (Ok(user_light), Ok(light_time_off)) => Some(HubSettings {
            user_temp: stored.user_temp,
            user_light,
            light_time_off,
        }),
        (Err(err), _) | (_, Err(err)) => {
            warn!("stored settings are unusable: {err}");
            None
        }
    }
}

fn graph_points(history: &VecDeque<StateEntry>, size: usize) -> Vec<GraphPoint> {
    history
        .iter()
        .rev()
        .take(size)
        .map(|entry| GraphPoint {
            temperature: entry.temperature,
            presence: entry.presence,
            datetime: entry.current_time.clone(),
        })
        .collect()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
