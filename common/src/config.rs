use serde::{Deserialize, Serialize};

use crate::sampler::SamplingMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub api_host: String,
    pub api_scheme: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            api_host: "127.0.0.1:8080".to_string(),
            api_scheme: "https".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub fan_pin: i32,
    pub light_pin: i32,
    pub presence_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            fan_pin: 22,
            light_pin: 23,
            presence_pin: 21,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub poll_interval_ms: u64,
    pub http_timeout_ms: u64,
    pub document_capacity_bytes: usize,
    pub wifi_poll_interval_ms: u64,
    pub stats_log_every: u64,
    #[serde(default)]
    pub sampling: SamplingMode,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            http_timeout_ms: 10_000,
            document_capacity_bytes: 1_024,
            wifi_poll_interval_ms: 500,
            stats_log_every: 60,
            sampling: SamplingMode::Uniform,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl NetworkConfig {
    pub fn has_station_credentials(&self) -> bool {
        !self.wifi_ssid.trim().is_empty()
    }

    pub fn sanitize(&mut self) {
        self.api_host = self
            .api_host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();

        let scheme = self.api_scheme.trim().to_ascii_lowercase();
        self.api_scheme = if scheme == "http" {
            scheme
        } else {
            "https".to_string()
        };
    }
}

impl PinConfig {
    pub fn as_array(&self) -> [i32; 3] {
        [self.fan_pin, self.light_pin, self.presence_pin]
    }

    pub fn is_distinct(&self) -> bool {
        self.fan_pin != self.light_pin
            && self.fan_pin != self.presence_pin
            && self.light_pin != self.presence_pin
    }

    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !is_output_capable_gpio(self.fan_pin) {
            self.fan_pin = defaults.fan_pin;
        }
        if !is_output_capable_gpio(self.light_pin) {
            self.light_pin = defaults.light_pin;
        }
        if !is_output_capable_gpio(self.presence_pin) {
            self.presence_pin = defaults.presence_pin;
        }
    }
}

impl HubConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.min(3_600_000);
        self.http_timeout_ms = self.http_timeout_ms.clamp(500, 120_000);
        self.document_capacity_bytes = self.document_capacity_bytes.clamp(64, 16 * 1024);
        self.wifi_poll_interval_ms = self.wifi_poll_interval_ms.clamp(50, 10_000);
        self.stats_log_every = self.stats_log_every.max(1);
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.network.sanitize();
        self.pins.sanitize();
        self.hub.sanitize();
    }
}

// ESP32 pads usable as outputs: 6..=11 carry the flash bus, 20 and 28..=31 are
// not bonded out, 34..=39 are input only.
fn is_output_capable_gpio(pin: i32) -> bool {
    matches!(pin, 0..=5 | 12..=19 | 21..=23 | 25..=27 | 32 | 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_scheme_from_host() {
        let mut network = NetworkConfig {
            api_host: " https://hub.example.com/ ".to_string(),
            api_scheme: "HTTP".to_string(),
            ..NetworkConfig::default()
        };
        network.sanitize();

        assert_eq!(network.api_host, "hub.example.com");
        assert_eq!(network.api_scheme, "http");
    }

    #[test]
    fn unknown_scheme_falls_back_to_https() {
        let mut network = NetworkConfig {
            api_scheme: "ftp".to_string(),
            ..NetworkConfig::default()
        };
        network.sanitize();

        assert_eq!(network.api_scheme, "https");
    }

    #[test]
    fn invalid_pins_fall_back_to_defaults() {
        let mut pins = PinConfig {
            fan_pin: 24,
            light_pin: 35,
            presence_pin: 4,
        };
        pins.sanitize();

        assert_eq!(pins.fan_pin, 22);
        assert_eq!(pins.light_pin, 23);
        assert_eq!(pins.presence_pin, 4);
    }

    #[test]
    fn detects_shared_pins() {
        let pins = PinConfig {
            presence_pin: 22,
            ..PinConfig::default()
        };

        assert!(PinConfig::default().is_distinct());
        assert!(!pins.is_distinct());
    }

    #[test]
    fn hub_limits_are_clamped() {
        let mut hub = HubConfig {
            http_timeout_ms: 0,
            document_capacity_bytes: 1 << 20,
            stats_log_every: 0,
            ..HubConfig::default()
        };
        hub.sanitize();

        assert_eq!(hub.http_timeout_ms, 500);
        assert_eq!(hub.document_capacity_bytes, 16 * 1024);
        assert_eq!(hub.stats_log_every, 1);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let raw = r#"{"network":{"wifi_ssid":"lab","wifi_pass":"","api_host":"hub.local","api_scheme":"http"}}"#;
        let runtime: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(runtime.pins, PinConfig::default());
        assert_eq!(runtime.hub.document_capacity_bytes, 1_024);
        assert!(runtime.network.has_station_credentials());
    }
}
