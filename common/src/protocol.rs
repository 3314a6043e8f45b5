//! Wire format shared by the device and the companion server.
//!
//! The device pushes a [`SensorReading`] to `/info` and pulls an
//! [`ActuatorCommand`] from `/state`. Documents on both channels are bounded
//! by a fixed capacity so a misbehaving server cannot exhaust device memory.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_DOCUMENT_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub temperature: f32,
    pub presence: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub fan: bool,
    pub light: bool,
    pub presence: bool,
}

/// Something in a `/state` document that was accepted but did not match the
/// expected shape exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWarning {
    Missing(&'static str),
    Coerced {
        field: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "field `{field}` missing, defaulted to false"),
            Self::Coerced { field, found } => {
                write!(f, "field `{field}` was {found}, coerced to bool")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCommand {
    pub command: ActuatorCommand,
    pub warnings: Vec<FieldWarning>,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to serialize telemetry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("telemetry document is {size} bytes, capacity is {capacity}")]
    TooLarge { size: usize, capacity: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("document is {size} bytes, capacity is {capacity}")]
    Oversized { size: usize, capacity: usize },
    #[error("invalid input: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn encode_telemetry(reading: &SensorReading, capacity: usize) -> Result<String, ProtocolError> {
    let payload = serde_json::to_string(reading)?;
    if payload.len() > capacity {
        return Err(ProtocolError::TooLarge {
            size: payload.len(),
            capacity,
        });
    }
    Ok(payload)
}

pub fn decode_command(body: &str, capacity: usize) -> Result<DecodedCommand, DecodeError> {
    if body.len() > capacity {
        return Err(DecodeError::Oversized {
            size: body.len(),
            capacity,
        });
    }

    let document: Value = serde_json::from_str(body)?;
    let empty = Map::new();
    let object = document.as_object().unwrap_or(&empty);

    let mut warnings = Vec::new();
    let command = ActuatorCommand {
        fan: coerce_field(object, "fan", &mut warnings),
        light: coerce_field(object, "light", &mut warnings),
        presence: coerce_field(object, "presence", &mut warnings),
    };

    Ok(DecodedCommand { command, warnings })
}

fn coerce_field(
    object: &Map<String, Value>,
    field: &'static str,
    warnings: &mut Vec<FieldWarning>,
) -> bool {
    match object.get(field) {
        Some(Value::Bool(value)) => *value,
        Some(Value::Number(number)) => {
            warnings.push(FieldWarning::Coerced {
                field,
                found: "a number",
            });
            number.as_f64().is_some_and(|value| value != 0.0)
        }
        Some(other) => {
            warnings.push(FieldWarning::Coerced {
                field,
                found: json_kind(other),
            });
            false
        }
        None => {
            warnings.push(FieldWarning::Missing(field));
            false
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn telemetry_has_two_fields() {
        let reading = SensorReading {
            temperature: 27.5,
            presence: true,
        };
        let payload = encode_telemetry(&reading, DEFAULT_DOCUMENT_CAPACITY).unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value, serde_json::json!({"temperature": 27.5, "presence": true}));
    }

    #[test]
    fn telemetry_respects_capacity() {
        let reading = SensorReading {
            temperature: 20.0,
            presence: false,
        };
        let err = encode_telemetry(&reading, 8).unwrap_err();

        assert!(matches!(err, ProtocolError::TooLarge { capacity: 8, .. }));
    }

    #[test]
    fn decodes_complete_command() {
        let decoded = decode_command(
            r#"{"fan":true,"light":false,"presence":true}"#,
            DEFAULT_DOCUMENT_CAPACITY,
        )
        .unwrap();

        assert_eq!(
            decoded,
            DecodedCommand {
                command: ActuatorCommand {
                    fan: true,
                    light: false,
                    presence: true,
                },
                warnings: Vec::new(),
            }
        );
    }

    #[test]
    fn missing_fields_default_to_false_with_warnings() {
        let decoded = decode_command(r#"{"fan":true}"#, DEFAULT_DOCUMENT_CAPACITY).unwrap();

        assert_eq!(
            decoded.command,
            ActuatorCommand {
                fan: true,
                light: false,
                presence: false,
            }
        );
        assert_eq!(
            decoded.warnings,
            vec![
                FieldWarning::Missing("light"),
                FieldWarning::Missing("presence"),
            ]
        );
    }

    #[test]
    fn present_false_is_not_a_warning() {
        let decoded = decode_command(
            r#"{"fan":false,"light":false,"presence":false}"#,
            DEFAULT_DOCUMENT_CAPACITY,
        )
        .unwrap();

        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.command, ActuatorCommand::default());
    }

    #[test]
    fn non_boolean_values_are_coerced() {
        let decoded = decode_command(
            r#"{"fan":1,"light":"1","presence":null,"current_time":"2026-01-05 08:00:00"}"#,
            DEFAULT_DOCUMENT_CAPACITY,
        )
        .unwrap();

        assert_eq!(
            decoded.command,
            ActuatorCommand {
                fan: true,
                light: false,
                presence: false,
            }
        );
        assert_eq!(
            decoded.warnings,
            vec![
                FieldWarning::Coerced {
                    field: "fan",
                    found: "a number",
                },
                FieldWarning::Coerced {
                    field: "light",
                    found: "a string",
                },
                FieldWarning::Coerced {
                    field: "presence",
                    found: "null",
                },
            ]
        );
    }

    #[test]
    fn non_object_document_reports_every_field_missing() {
        let decoded = decode_command("[true, true, true]", DEFAULT_DOCUMENT_CAPACITY).unwrap();

        assert_eq!(decoded.command, ActuatorCommand::default());
        assert_eq!(decoded.warnings.len(), 3);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = decode_command("{not json", DEFAULT_DOCUMENT_CAPACITY).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode_command("", DEFAULT_DOCUMENT_CAPACITY).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_oversized_document() {
        let body = format!(r#"{{"fan":true,"pad":"{}"}}"#, "x".repeat(2_000));
        let err = decode_command(&body, DEFAULT_DOCUMENT_CAPACITY).unwrap_err();

        assert!(matches!(
            err,
            DecodeError::Oversized {
                capacity: DEFAULT_DOCUMENT_CAPACITY,
                ..
            }
        ));
    }

    #[test]
    fn warnings_render_field_names() {
        assert_eq!(
            FieldWarning::Missing("light").to_string(),
            "field `light` missing, defaulted to false"
        );
    }
}
