//! Seams between the polling loop and the board.
//!
//! The ESP target implements these with the Wi-Fi driver, `EspHttpConnection`
//! and GPIO drivers; the host build uses a blocking HTTP client and in-memory
//! pins.

use std::fmt;

use thiserror::Error;

pub trait NetworkLink {
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer: no status code was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("i/o error: {0}")]
    Io(String),
}

/// Blocking HTTP client. Each call owns its connection for the duration of
/// the exchange and releases it before returning, on success and on error.
pub trait HttpTransport {
    fn post_json(&mut self, url: &str, body: &str) -> Result<HttpResponse, TransportError>;
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    Fan,
    Light,
    PresenceIndicator,
}

impl Actuator {
    pub const ALL: [Actuator; 3] = [Self::Fan, Self::Light, Self::PresenceIndicator];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fan => "fan",
            Self::Light => "light",
            Self::PresenceIndicator => "presence",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to drive {actuator} pin: {reason}")]
pub struct PinError {
    pub actuator: Actuator,
    pub reason: String,
}

pub trait ActuatorPins {
    fn write(&mut self, actuator: Actuator, on: bool) -> Result<(), PinError>;
}
