//! Power indicator line protocol
//!
//! Every device line is a `category,name` pair. Only the `event` and
//! `response` categories are meaningful to the host; anything else, and any
//! line without exactly two fields, is dropped without error so newer
//! firmware can add messages freely.

use serde::{Deserialize, Serialize};

/// Unsolicited notifications from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// Program (re)started and is reading commands
    Start,
    /// Mains power went away
    PowerLost,
    /// Mains power came back
    PowerRestored,
    /// A request was accepted and the device stopped reading input
    RequestBlocking,
}

/// Answers to host requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceResponse {
    PowerMonitorOn,
    PowerOn,
    PowerOff,
    BlinkOn,
    RequestUnrecognised,
    RequestError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    Event(DeviceEvent),
    Response(DeviceResponse),
}

impl DeviceEvent {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "START" => Some(Self::Start),
            "POWER_LOST" => Some(Self::PowerLost),
            "POWER_RESTORED" => Some(Self::PowerRestored),
            "REQUEST_BLOCKING" => Some(Self::RequestBlocking),
            _ => None,
        }
    }
}

impl DeviceResponse {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "POWER_MONITOR_ON" => Some(Self::PowerMonitorOn),
            "POWER_ON" => Some(Self::PowerOn),
            "POWER_OFF" => Some(Self::PowerOff),
            "BLINK_ON" => Some(Self::BlinkOn),
            "REQUEST_UNRECOGNISED" => Some(Self::RequestUnrecognised),
            "REQUEST_ERROR" => Some(Self::RequestError),
            _ => None,
        }
    }
}

/// Decode one complete line (without its terminator)
pub fn parse_line(line: &str) -> Option<ProtocolMessage> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != 2 {
        return None;
    }

    match parts[0] {
        "event" => DeviceEvent::from_name(parts[1]).map(ProtocolMessage::Event),
        "response" => DeviceResponse::from_name(parts[1]).map(ProtocolMessage::Response),
        _ => None,
    }
}
