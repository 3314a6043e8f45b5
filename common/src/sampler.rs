use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::protocol::SensorReading;

pub const TEMPERATURE_LOW_C: f32 = 20.2;
pub const TEMPERATURE_HIGH_C: f32 = 36.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Temperature uniform over `[20.2, 36.0)`, presence a fair coin.
    #[default]
    Uniform,
    /// Matches the first firmware generation, which drew from integer
    /// bounds: temperature in `20..=35` and presence always false.
    ArduinoCompat,
}

impl SamplingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "arduino_compat" | "arduino-compat" | "compat" => Some(Self::ArduinoCompat),
            _ => None,
        }
    }
}

pub trait SensorSource {
    fn sample_temperature(&mut self) -> f32;
    fn sample_presence(&mut self) -> bool;

    fn sample(&mut self) -> SensorReading {
        SensorReading {
            temperature: self.sample_temperature(),
            presence: self.sample_presence(),
        }
    }
}

/// Stand-in for the temperature probe and PIR detector.
#[derive(Debug, Clone)]
pub struct SimulatedSensors<R> {
    rng: R,
    mode: SamplingMode,
}

impl<R: Rng> SimulatedSensors<R> {
    pub fn new(rng: R, mode: SamplingMode) -> Self {
        Self { rng, mode }
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }
}

impl<R: Rng> SensorSource for SimulatedSensors<R> {
    fn sample_temperature(&mut self) -> f32 {
        match self.mode {
            SamplingMode::Uniform => self.rng.gen_range(TEMPERATURE_LOW_C..TEMPERATURE_HIGH_C),
            SamplingMode::ArduinoCompat => {
                let low = TEMPERATURE_LOW_C as i32;
                let high = TEMPERATURE_HIGH_C as i32;
                self.rng.gen_range(low..high) as f32
            }
        }
    }

    fn sample_presence(&mut self) -> bool {
        match self.mode {
            SamplingMode::Uniform => self.rng.gen_bool(0.5),
            SamplingMode::ArduinoCompat => self.rng.gen_range(0..1) != 0,
        }
    }
}
