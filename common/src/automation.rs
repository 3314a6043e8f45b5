//! Server-side rules turning a telemetry sample into actuator commands.

use chrono::{Duration, NaiveTime};
use thiserror::Error;

use crate::protocol::{ActuatorCommand, SensorReading};

pub const SUNSET_KEYWORD: &str = "sunset";

/// Longest light window; a full day or more would wrap back onto `user_light`.
const MAX_LIGHT_WINDOW_SECS: i64 = 24 * 3_600 - 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubSettings {
    pub user_temp: f32,
    pub user_light: NaiveTime,
    pub light_time_off: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("`{0}` is not a time of day (expected HH:MM:SS or \"sunset\")")]
    InvalidTime(String),
    #[error("`{0}` is not a duration (expected e.g. 1h30m or 45s)")]
    InvalidDuration(String),
}

impl HubSettings {
    pub fn resolve(
        user_temp: f32,
        user_light: &str,
        light_duration: &str,
        sunset: NaiveTime,
    ) -> Result<Self, SettingsError> {
        let user_light = if user_light.trim().eq_ignore_ascii_case(SUNSET_KEYWORD) {
            sunset
        } else {
            parse_time_of_day(user_light)?
        };
        let duration = parse_duration(light_duration)?
            .min(Duration::seconds(MAX_LIGHT_WINDOW_SECS));
        let (light_time_off, _) = user_light.overflowing_add_signed(duration);

        Ok(Self {
            user_temp,
            user_light,
            light_time_off,
        })
    }
}

pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, SettingsError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| SettingsError::InvalidTime(value.to_string()))
}

/// Parses `1h`, `30m`, `1h30m20s` style durations. Units must appear in
/// hour, minute, second order and at most once each.
pub fn parse_duration(value: &str) -> Result<Duration, SettingsError> {
    let invalid = || SettingsError::InvalidDuration(value.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total_seconds: i64 = 0;
    let mut digits = String::new();
    let mut last_rank = 0;

    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let (rank, scale) = match ch {
            'h' => (1, 3_600),
            'm' => (2, 60),
            's' => (3, 1),
            _ => return Err(invalid()),
        };
        if rank <= last_rank || digits.is_empty() {
            return Err(invalid());
        }

        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        total_seconds = amount
            .checked_mul(scale)
            .and_then(|seconds| total_seconds.checked_add(seconds))
            .ok_or_else(invalid)?;
        digits.clear();
        last_rank = rank;
    }

    if !digits.is_empty() {
        return Err(invalid());
    }

    Duration::try_seconds(total_seconds).ok_or_else(invalid)
}

/// `[start, end)` on a 24h clock; a window whose end is before its start
/// runs across midnight.
pub fn within_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

pub fn evaluate(
    settings: Option<&HubSettings>,
    reading: &SensorReading,
    now: NaiveTime,
) -> ActuatorCommand {
    let Some(settings) = settings else {
        return ActuatorCommand {
            fan: false,
            light: false,
            presence: reading.presence,
        };
    };

    ActuatorCommand {
        fan: reading.presence && reading.temperature >= settings.user_temp,
        light: reading.presence
            && within_window(now, settings.user_light, settings.light_time_off),
        presence: reading.presence,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn settings() -> HubSettings {
        HubSettings::resolve(28.0, "18:00:00", "4h", time(18, 30)).unwrap()
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("1h30m20s").unwrap().num_seconds(), 5_420);
        assert_eq!(parse_duration("45m").unwrap().num_seconds(), 2_700);
        assert_eq!(parse_duration("90s").unwrap().num_seconds(), 90);
    }

    #[test]
    fn rejects_malformed_durations() {
        for value in ["", "h", "10", "1m1h", "1h1h", "2d", "1 h"] {
            assert!(parse_duration(value).is_err(), "{value}");
        }
    }

    #[test]
    fn resolves_light_off_time() {
        let settings = settings();

        assert_eq!(settings.user_light, time(18, 0));
        assert_eq!(settings.light_time_off, time(22, 0));
    }

    #[test]
    fn full_day_duration_keeps_light_on_around_the_clock() {
        for duration in ["24h", "48h", "23h59m60s"] {
            let settings = HubSettings::resolve(28.0, "18:00:00", duration, time(18, 30)).unwrap();

            assert_eq!(
                settings.light_time_off,
                NaiveTime::from_hms_opt(17, 59, 59).unwrap(),
                "{duration}"
            );
            assert!(within_window(time(18, 0), settings.user_light, settings.light_time_off));
            assert!(within_window(time(3, 0), settings.user_light, settings.light_time_off));
            assert!(within_window(
                NaiveTime::from_hms_opt(17, 59, 58).unwrap(),
                settings.user_light,
                settings.light_time_off
            ));
        }
    }

    #[test]
    fn sunset_uses_configured_time() {
        let settings = HubSettings::resolve(26.0, "Sunset", "30m", time(18, 30)).unwrap();

        assert_eq!(settings.user_light, time(18, 30));
        assert_eq!(settings.light_time_off, time(19, 0));
    }

    #[test]
    fn rejects_bad_time_of_day() {
        let err = HubSettings::resolve(26.0, "dusk", "1h", time(18, 30)).unwrap_err();
        assert_eq!(err, SettingsError::InvalidTime("dusk".to_string()));
    }

    #[test]
    fn window_wraps_midnight() {
        let start = time(22, 0);
        let end = time(2, 0);

        assert!(within_window(time(23, 30), start, end));
        assert!(within_window(time(1, 59), start, end));
        assert!(!within_window(time(2, 0), start, end));
        assert!(!within_window(time(12, 0), start, end));
    }

    #[test]
    fn fan_requires_presence_and_heat() {
        let settings = settings();
        let hot_and_present = SensorReading {
            temperature: 30.0,
            presence: true,
        };
        let hot_and_empty = SensorReading {
            temperature: 30.0,
            presence: false,
        };
        let cool_and_present = SensorReading {
            temperature: 24.0,
            presence: true,
        };

        assert!(evaluate(Some(&settings), &hot_and_present, time(9, 0)).fan);
        assert!(!evaluate(Some(&settings), &hot_and_empty, time(9, 0)).fan);
        assert!(!evaluate(Some(&settings), &cool_and_present, time(9, 0)).fan);
    }

    #[test]
    fn light_follows_schedule_window() {
        let settings = settings();
        let reading = SensorReading {
            temperature: 22.0,
            presence: true,
        };

        assert!(evaluate(Some(&settings), &reading, time(19, 0)).light);
        assert!(!evaluate(Some(&settings), &reading, time(23, 0)).light);
        assert!(!evaluate(Some(&settings), &reading, time(9, 0)).light);
    }

    #[test]
    fn no_settings_keeps_outputs_off() {
        let reading = SensorReading {
            temperature: 35.0,
            presence: true,
        };

        assert_eq!(
            evaluate(None, &reading, time(19, 0)),
            ActuatorCommand {
                fan: false,
                light: false,
                presence: true,
            }
        );
    }
}
