//! Agent command schema and validation
//!
//! Inbound commands arrive as JSON on `ROOT/command/{line}`. This
//! module parses and validates them into typed actions; malformed
//! commands are rejected with a failed response and no side effect.
//! Dispatch onto the target AGV happens in the line.

use crate::devices::AgvAction;
use crate::layout::{PathPoint, DEFAULT_CHARGE_TARGET};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw agent command as carried on the bus
///
/// Unknown fields are ignored; missing required fields fail
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCommand {
    #[serde(default)]
    pub command_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub params: Value,
}

/// Why a command was rejected
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(String),
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid parameter '{field}': {reason}")]
    InvalidParam { field: &'static str, reason: String },
    #[error("unknown AGV '{0}'")]
    UnknownTarget(String),
}

/// A command that passed schema validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCommand {
    pub command_id: Option<String>,
    pub kind: CommandKind,
}

/// Validated command payloads
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Queue an action on the named AGV
    Agv { target: String, action: AgvAction },
    /// Publish the full KPI result snapshot immediately
    GetResult,
}

/// Per-command response published on `ROOT/response/{line}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Simulation time the outcome was known (seconds)
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Human-readable outcome
    pub response: String,
}

impl CommandResponse {
    pub fn new(timestamp: f64, command_id: Option<String>, response: impl Into<String>) -> Self {
        Self {
            timestamp,
            command_id,
            response: response.into(),
        }
    }
}

/// Parse and validate a raw JSON command
pub fn parse_command(json: &str) -> Result<ValidatedCommand, CommandError> {
    let raw: AgentCommand =
        serde_json::from_str(json).map_err(|e| CommandError::Malformed(e.to_string()))?;
    validate_command(raw)
}

/// Validate an already-deserialized command
pub fn validate_command(raw: AgentCommand) -> Result<ValidatedCommand, CommandError> {
    let kind = match raw.action.as_str() {
        "get_result" => CommandKind::GetResult,
        "move" => {
            let target = required_target(&raw)?;
            let point_str = raw
                .params
                .get("target_point")
                .and_then(Value::as_str)
                .ok_or(CommandError::MissingField("params.target_point"))?;
            let point: PathPoint =
                point_str
                    .parse()
                    .map_err(|reason| CommandError::InvalidParam {
                        field: "params.target_point",
                        reason,
                    })?;
            CommandKind::Agv {
                target,
                action: AgvAction::Move { target: point },
            }
        }
        "charge" => {
            let target = required_target(&raw)?;
            let level = match raw.params.get("target_level") {
                None | Some(Value::Null) => DEFAULT_CHARGE_TARGET,
                Some(v) => v.as_f64().ok_or(CommandError::InvalidParam {
                    field: "params.target_level",
                    reason: "must be a number".to_string(),
                })?,
            };
            if !(0.0..=100.0).contains(&level) {
                return Err(CommandError::InvalidParam {
                    field: "params.target_level",
                    reason: format!("{} out of range (0, 100]", level),
                });
            }
            CommandKind::Agv {
                target,
                action: AgvAction::Charge {
                    target_level: level,
                },
            }
        }
        "load" => {
            let target = required_target(&raw)?;
            let product_id = match raw.params.get("product_id") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    v.as_str()
                        .ok_or(CommandError::InvalidParam {
                            field: "params.product_id",
                            reason: "must be a string".to_string(),
                        })?
                        .to_string(),
                ),
            };
            CommandKind::Agv {
                target,
                action: AgvAction::Load { product_id },
            }
        }
        "unload" => {
            let target = required_target(&raw)?;
            CommandKind::Agv {
                target,
                action: AgvAction::Unload,
            }
        }
        other => return Err(CommandError::UnknownAction(other.to_string())),
    };

    Ok(ValidatedCommand {
        command_id: raw.command_id,
        kind,
    })
}

fn required_target(raw: &AgentCommand) -> Result<String, CommandError> {
    raw.target
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or(CommandError::MissingField("target"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_command_parses() {
        let cmd = parse_command(
            r#"{"command_id":"c1","action":"move","target":"AGV_1","params":{"target_point":"P3"}}"#,
        )
        .unwrap();

        assert_eq!(cmd.command_id.as_deref(), Some("c1"));
        assert_eq!(
            cmd.kind,
            CommandKind::Agv {
                target: "AGV_1".to_string(),
                action: AgvAction::Move {
                    target: PathPoint::P3
                },
            }
        );
    }

    #[test]
    fn test_charge_defaults_to_80() {
        let cmd =
            parse_command(r#"{"action":"charge","target":"AGV_2","params":{}}"#).unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Agv {
                target: "AGV_2".to_string(),
                action: AgvAction::Charge { target_level: 80.0 },
            }
        );
    }

    #[test]
    fn test_charge_out_of_range_rejected() {
        let err = parse_command(
            r#"{"action":"charge","target":"AGV_1","params":{"target_level":150}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidParam { .. }));
    }

    #[test]
    fn test_move_missing_point_rejected() {
        let err =
            parse_command(r#"{"action":"move","target":"AGV_1","params":{}}"#).unwrap_err();
        assert_eq!(err, CommandError::MissingField("params.target_point"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = parse_command(r#"{"action":"dance","target":"AGV_1"}"#).unwrap_err();
        assert_eq!(err, CommandError::UnknownAction("dance".to_string()));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = parse_command("{not json").unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let cmd = parse_command(
            r#"{"action":"unload","target":"AGV_1","params":{},"extra":"ignored"}"#,
        )
        .unwrap();
        assert!(matches!(cmd.kind, CommandKind::Agv { .. }));
    }

    #[test]
    fn test_get_result_needs_no_target() {
        let cmd = parse_command(r#"{"action":"get_result"}"#).unwrap();
        assert_eq!(cmd.kind, CommandKind::GetResult);
    }

    #[test]
    fn test_load_product_id_optional() {
        let cmd = parse_command(
            r#"{"action":"load","target":"AGV_1","params":{"product_id":"prod_P1_abc"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Agv {
                target: "AGV_1".to_string(),
                action: AgvAction::Load {
                    product_id: Some("prod_P1_abc".to_string())
                },
            }
        );
    }

    #[test]
    fn test_response_omits_missing_command_id() {
        let response = CommandResponse::new(1.5, None, "ok");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("command_id"));
    }
}
