//! Configuration commands and their line-oriented JSON framing.
//!
//! One object per line, field names as sent by the dashboard:
//!
//! ```text
//! {"cmd":"set_target","target":4.5}
//! {"cmd":"set_pid","kp":100,"ki":0.5,"kd":50}
//! {"cmd":"enable"} {"cmd":"disable"} {"cmd":"toggle"} {"cmd":"reset_limit"}
//! ```
//!
//! A frame with a missing or non-numeric field is rejected as a whole, so a
//! gains update never lands half-applied.

use core::fmt;

use serde::Deserialize;

use crate::config::Gains;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetSetpoint(f32),
    SetGains(Gains),
    Enable,
    Disable,
    Toggle,
    ResetLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    Malformed,
    UnknownCommand,
    MissingField(&'static str),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Malformed => write!(f, "Malformed command"),
            CommandError::UnknownCommand => write!(f, "Unknown command"),
            CommandError::MissingField(name) => write!(f, "Missing field: {}", name),
        }
    }
}

#[derive(Deserialize)]
struct CommandFrame<'a> {
    cmd: &'a str,
    #[serde(default)]
    target: Option<f32>,
    #[serde(default)]
    kp: Option<f32>,
    #[serde(default)]
    ki: Option<f32>,
    #[serde(default)]
    kd: Option<f32>,
}

fn required(value: Option<f32>, name: &'static str) -> Result<f32, CommandError> {
    value.ok_or(CommandError::MissingField(name))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (frame, _) = serde_json_core::from_str::<CommandFrame>(line.trim())
            .map_err(|_| CommandError::Malformed)?;

        let command = match frame.cmd {
            "set_target" => Command::SetSetpoint(required(frame.target, "target")?),
            "set_pid" => Command::SetGains(Gains::new(
                required(frame.kp, "kp")?,
                required(frame.ki, "ki")?,
                required(frame.kd, "kd")?,
            )),
            "enable" => Command::Enable,
            "disable" => Command::Disable,
            "toggle" => Command::Toggle,
            "reset_limit" => Command::ResetLimit,
            _ => return Err(CommandError::UnknownCommand),
        };
        Ok(command)
    }
}
