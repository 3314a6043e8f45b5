use std::fmt;

use log::{info, warn};

use crate::{
    config::HubConfig,
    endpoints::Endpoints,
    ports::{Actuator, ActuatorPins, HttpResponse, HttpTransport, NetworkLink, TransportError},
    protocol::{
        decode_command, encode_telemetry, ActuatorCommand, DecodeError, DecodedCommand,
        FieldWarning, SensorReading,
    },
    sampler::SensorSource,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub iterations: u64,
    pub offline_iterations: u64,
    pub commands_applied: u64,
    pub commands_skipped: u64,
    pub transport_failures: u64,
    pub pin_faults: u64,
}

/// Why the actuator step was left out of an iteration.
#[derive(Debug)]
pub enum SkipReason {
    Transport(TransportError),
    Decode(DecodeError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "state request failed: {err}"),
            Self::Decode(err) => write!(f, "state document rejected: {err}"),
        }
    }
}

#[derive(Debug)]
pub enum IterationOutcome {
    Offline,
    Applied {
        reading: SensorReading,
        command: ActuatorCommand,
        warnings: Vec<FieldWarning>,
    },
    CommandSkipped {
        reading: SensorReading,
        reason: SkipReason,
    },
}

/// One device: samples sensors, pushes telemetry, pulls and applies commands.
///
/// Every connected call to [`SmartHub::poll_once`] issues exactly one POST
/// followed by exactly one GET. The three pins are written together only
/// when the GET produced a usable document.
pub struct SmartHub<N, T, P, S> {
    config: HubConfig,
    endpoints: Endpoints,
    link: N,
    http: T,
    pins: P,
    sensors: S,
    stats: HubStats,
}

impl<N, T, P, S> SmartHub<N, T, P, S>
where
    N: NetworkLink,
    T: HttpTransport,
    P: ActuatorPins,
    S: SensorSource,
{
    pub fn new(
        mut config: HubConfig,
        endpoints: Endpoints,
        link: N,
        http: T,
        pins: P,
        sensors: S,
    ) -> Self {
        config.sanitize();
        Self {
            config,
            endpoints,
            link,
            http,
            pins,
            sensors,
            stats: HubStats::default(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn stats(&self) -> HubStats {
        self.stats
    }

    pub fn poll_once(&mut self) -> IterationOutcome {
        self.stats.iterations = self.stats.iterations.saturating_add(1);

        let outcome = if self.link.is_connected() {
            self.run_connected()
        } else {
            warn!("wifi disconnected");
            self.stats.offline_iterations = self.stats.offline_iterations.saturating_add(1);
            IterationOutcome::Offline
        };

        if self.stats.iterations.checked_rem(self.config.stats_log_every) == Some(0) {
            let stats = self.stats;
            info!(
                "hub stats: iterations={} offline={} applied={} skipped={} transport_failures={} pin_faults={}",
                stats.iterations,
                stats.offline_iterations,
                stats.commands_applied,
                stats.commands_skipped,
                stats.transport_failures,
                stats.pin_faults
            );
        }

        outcome
    }

    fn run_connected(&mut self) -> IterationOutcome {
        let reading = self.sensors.sample();
        self.publish_telemetry(&reading);

        match self.fetch_command() {
            Ok(DecodedCommand { command, warnings }) => {
                for warning in &warnings {
                    warn!("state document: {warning}");
                }
                self.apply_command(command);
                self.stats.commands_applied = self.stats.commands_applied.saturating_add(1);
                IterationOutcome::Applied {
                    reading,
                    command,
                    warnings,
                }
            }
            Err(reason) => {
                warn!("{reason}; keeping previous pin state");
                self.stats.commands_skipped = self.stats.commands_skipped.saturating_add(1);
                IterationOutcome::CommandSkipped { reading, reason }
            }
        }
    }

    fn publish_telemetry(&mut self, reading: &SensorReading) {
        let payload = match encode_telemetry(reading, self.config.document_capacity_bytes) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("{err}");
                return;
            }
        };

        match self.http.post_json(&self.endpoints.info_url, &payload) {
            Ok(response) => log_response(&response),
            Err(err) => {
                self.stats.transport_failures = self.stats.transport_failures.saturating_add(1);
                warn!("POST {} failed: {err}", self.endpoints.info_url);
            }
        }
    }

    fn fetch_command(&mut self) -> Result<DecodedCommand, SkipReason> {
        let response = self.http.get(&self.endpoints.state_url).map_err(|err| {
            self.stats.transport_failures = self.stats.transport_failures.saturating_add(1);
            SkipReason::Transport(err)
        })?;
        log_response(&response);

        if !response.is_success() {
            warn!("state request returned HTTP {}", response.status);
        }

        decode_command(&response.body, self.config.document_capacity_bytes)
            .map_err(SkipReason::Decode)
    }

    fn apply_command(&mut self, command: ActuatorCommand) {
        let levels = [
            (Actuator::Fan, command.fan),
            (Actuator::Light, command.light),
            (Actuator::PresenceIndicator, command.presence),
        ];

        for (actuator, on) in levels {
            if let Err(err) = self.pins.write(actuator, on) {
                self.stats.pin_faults = self.stats.pin_faults.saturating_add(1);
                warn!("{err}");
            }
        }
    }
}

fn log_response(response: &HttpResponse) {
    info!("HTTP response code: {}", response.status);
    info!("response from server: {}", response.body);
}
