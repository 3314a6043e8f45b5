use std::{thread, time::Duration};

use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use reqwest::{blocking::Client, header::CONTENT_TYPE};
use tracing::{info, warn};

use smarthub_common::{
    Actuator, ActuatorPins, Endpoints, HttpResponse, HttpTransport, NetworkLink, PinConfig,
    PinError, RuntimeConfig, SamplingMode, SimulatedSensors, SmartHub, TransportError,
};

const MAX_HTTP_BODY: usize = 4096;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config(|key| std::env::var(key).ok());
    let endpoints = Endpoints::from_network(&runtime.network);

    let transport = ReqwestTransport::new(Duration::from_millis(runtime.hub.http_timeout_ms))
        .context("failed to build http client")?;
    let link = HostLink {
        offline: std::env::var_os("SMARTHUB_OFFLINE").is_some(),
    };
    let pins = SimulatedPins::new(&runtime.pins);
    let sensors = SimulatedSensors::new(StdRng::from_entropy(), runtime.hub.sampling);

    info!(
        "smart hub node started: info={} state={} sampling={:?}",
        endpoints.info_url,
        endpoints.state_url,
        sensors.mode()
    );

    let poll_interval = Duration::from_millis(runtime.hub.poll_interval_ms);
    let mut hub = SmartHub::new(runtime.hub, endpoints, link, transport, pins, sensors);

    loop {
        hub.poll_once();
        thread::sleep(poll_interval);
    }
}

fn load_runtime_config(lookup: impl Fn(&str) -> Option<String>) -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    // Local development servers are usually plain HTTP.
    runtime.network.api_scheme = "http".to_string();

    if let Some(host) = lookup("API_HOST") {
        runtime.network.api_host = host;
    }
    if let Some(scheme) = lookup("API_SCHEME") {
        runtime.network.api_scheme = scheme;
    }
    if let Some(ms) = lookup("SMARTHUB_POLL_MS").and_then(|value| value.parse::<u64>().ok()) {
        runtime.hub.poll_interval_ms = ms;
    }
    if let Some(ms) = lookup("SMARTHUB_HTTP_TIMEOUT_MS").and_then(|value| value.parse::<u64>().ok())
    {
        runtime.hub.http_timeout_ms = ms;
    }
    if let Some(value) = lookup("SMARTHUB_SAMPLING") {
        match SamplingMode::parse(&value) {
            Some(mode) => runtime.hub.sampling = mode,
            None => warn!("unknown SMARTHUB_SAMPLING `{value}`, keeping uniform"),
        }
    }

    runtime.sanitize();
    runtime
}

struct HostLink {
    offline: bool,
}

impl NetworkLink for HostLink {
    fn is_connected(&self) -> bool {
        !self.offline
    }
}

struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn finish(response: reqwest::blocking::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(map_reqwest_error)?;
        if bytes.len() > MAX_HTTP_BODY {
            return Err(TransportError::BodyTooLarge {
                limit: MAX_HTTP_BODY,
            });
        }

        Ok(HttpResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .map_err(map_reqwest_error)?;
        Self::finish(response)
    }

    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().map_err(map_reqwest_error)?;
        Self::finish(response)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

/// Output lines kept in memory; level changes go to the log.
struct SimulatedPins {
    gpio: [i32; 3],
    levels: [Option<bool>; 3],
}

impl SimulatedPins {
    fn new(pins: &PinConfig) -> Self {
        Self {
            gpio: [pins.fan_pin, pins.light_pin, pins.presence_pin],
            levels: [None; 3],
        }
    }

    fn slot(actuator: Actuator) -> usize {
        match actuator {
            Actuator::Fan => 0,
            Actuator::Light => 1,
            Actuator::PresenceIndicator => 2,
        }
    }
}

impl ActuatorPins for SimulatedPins {
    fn write(&mut self, actuator: Actuator, on: bool) -> Result<(), PinError> {
        let slot = Self::slot(actuator);
        if self.levels[slot] != Some(on) {
            info!(
                "GPIO{} ({actuator}) -> {}",
                self.gpio[slot],
                if on { "HIGH" } else { "LOW" }
            );
        }
        self.levels[slot] = Some(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn host_defaults_to_plain_http() {
        let runtime = load_runtime_config(lookup(&[]));

        assert_eq!(runtime.network.api_scheme, "http");
        assert_eq!(
            Endpoints::from_network(&runtime.network).info_url,
            "http://127.0.0.1:8080/info"
        );
    }

    #[test]
    fn env_overrides_apply() {
        let runtime = load_runtime_config(lookup(&[
            ("API_HOST", "https://hub.example.com/"),
            ("API_SCHEME", "https"),
            ("SMARTHUB_POLL_MS", "250"),
            ("SMARTHUB_SAMPLING", "arduino_compat"),
        ]));

        assert_eq!(runtime.network.api_host, "hub.example.com");
        assert_eq!(runtime.network.api_scheme, "https");
        assert_eq!(runtime.hub.poll_interval_ms, 250);
        assert_eq!(runtime.hub.sampling, SamplingMode::ArduinoCompat);
    }

    #[test]
    fn simulated_pins_remember_levels() {
        let mut pins = SimulatedPins::new(&PinConfig::default());
        pins.write(Actuator::Light, true).unwrap();
        pins.write(Actuator::Fan, false).unwrap();

        assert_eq!(pins.levels, [Some(false), Some(true), None]);
    }
}
