//! Datagram encoding for commands, control messages and telemetry.
//!
//! Three kinds of text datagram share the command and telemetry ports:
//!
//! - commands: `{"protocol":2,"command":{"name":..,"params":{..}}}`
//! - control: `message <body>`
//! - telemetry: `state x y z qw qx qy qz battery`

use gcs_core::models::{Attitude, Command, Telemetry, Vec3, PROTOCOL_VERSION};
use thiserror::Error;

const CONTROL_PREFIX: &str = "message ";
const STATE_PREFIX: &str = "state";
const STATE_FIELDS: usize = 8;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,
    #[error("datagram is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("unknown control message {0:?}")]
    UnknownControl(String),
    #[error("malformed telemetry: {0}")]
    Telemetry(String),
    #[error("malformed command: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocol(u8),
}

/// Bodies of `message ...` datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessage {
    /// Discovery probe
    Ping,
    /// Reply to a probe
    MessageReceived,
    /// Acknowledges a command
    CommandReceived,
    WaypointReached,
}

impl ControlMessage {
    pub fn body(self) -> &'static str {
        match self {
            ControlMessage::Ping => "ping",
            ControlMessage::MessageReceived => "message received",
            ControlMessage::CommandReceived => "command received",
            ControlMessage::WaypointReached => "waypoint reached",
        }
    }

    fn from_body(body: &str) -> Option<Self> {
        match body.trim() {
            "ping" => Some(ControlMessage::Ping),
            "message received" => Some(ControlMessage::MessageReceived),
            "command received" => Some(ControlMessage::CommandReceived),
            "waypoint reached" => Some(ControlMessage::WaypointReached),
            _ => None,
        }
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Control(ControlMessage),
    Telemetry(Telemetry),
    Command(Command),
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(command)?)
}

pub fn encode_control(message: ControlMessage) -> Vec<u8> {
    format!("{CONTROL_PREFIX}{}", message.body()).into_bytes()
}

pub fn encode_telemetry(telemetry: &Telemetry) -> Vec<u8> {
    let Telemetry {
        position: p,
        attitude: q,
        battery_pct,
    } = telemetry;
    format!(
        "{STATE_PREFIX} {} {} {} {} {} {} {} {}",
        p.x, p.y, p.z, q.w, q.x, q.y, q.z, battery_pct
    )
    .into_bytes()
}

pub fn decode_datagram(datagram: &[u8]) -> Result<Inbound, WireError> {
    let text = std::str::from_utf8(datagram)?.trim();
    if text.is_empty() {
        return Err(WireError::Empty);
    }

    if let Some(body) = text.strip_prefix(CONTROL_PREFIX) {
        return ControlMessage::from_body(body)
            .map(Inbound::Control)
            .ok_or_else(|| WireError::UnknownControl(body.to_string()));
    }
    if text.starts_with('{') {
        let command: Command = serde_json::from_str(text)?;
        if command.protocol != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedProtocol(command.protocol));
        }
        return Ok(Inbound::Command(command));
    }

    parse_state(text).map(Inbound::Telemetry)
}

fn parse_state(text: &str) -> Result<Telemetry, WireError> {
    let mut fields = text.split_whitespace();
    if fields.next() != Some(STATE_PREFIX) {
        return Err(WireError::Telemetry(format!("unrecognised datagram {text:?}")));
    }

    let values = fields
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| WireError::Telemetry(format!("bad number {f:?}")))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    if values.len() != STATE_FIELDS {
        return Err(WireError::Telemetry(format!(
            "expected {STATE_FIELDS} fields, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(WireError::Telemetry("non-finite field".to_string()));
    }

    let raw_battery = values[7];
    let battery_pct = raw_battery.clamp(0.0, 100.0);
    if battery_pct != raw_battery {
        tracing::warn!(battery = raw_battery, "Battery reading out of range, clamped");
    }

    Ok(Telemetry {
        position: Vec3::new(values[0], values[1], values[2]),
        attitude: Attitude {
            w: values[3],
            x: values[4],
            y: values[5],
            z: values[6],
        },
        battery_pct,
    })
}
