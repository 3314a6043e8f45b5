pub mod automation;
pub mod config;
pub mod endpoints;
pub mod hub;
pub mod ports;
pub mod protocol;
pub mod sampler;

pub use automation::{HubSettings, SettingsError};
pub use config::{HubConfig, NetworkConfig, PinConfig, RuntimeConfig};
pub use endpoints::*;
pub use hub::{HubStats, IterationOutcome, SkipReason, SmartHub};
pub use ports::{
    Actuator, ActuatorPins, HttpResponse, HttpTransport, NetworkLink, PinError, TransportError,
};
pub use protocol::{
    ActuatorCommand, DecodeError, DecodedCommand, FieldWarning, SensorReading,
    DEFAULT_DOCUMENT_CAPACITY,
};
pub use sampler::{SamplingMode, SensorSource, SimulatedSensors};
