use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Roles and states ─────────────────────────────────────────────────

/// Which end of the course a unit guards. Fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Start,
    Finish,
}

impl Role {
    /// The role the peer unit must have.
    pub fn peer(self) -> Role {
        match self {
            Role::Start => Role::Finish,
            Role::Finish => Role::Start,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Start => write!(f, "start"),
            Role::Finish => write!(f, "finish"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Role::Start),
            "finish" => Ok(Role::Finish),
            other => Err(format!("unknown role '{other}' (expected start or finish)")),
        }
    }
}

/// Current phase of a unit. Exactly one value per unit at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Before boot.
    Unknown,
    /// Idle, handshaking with the peer.
    Start,
    /// Paired, detector armed, waiting for a departure.
    Ready,
    /// Departure seen, waiting for the confirmation window to pass.
    RunCheck,
    /// Run in progress.
    Run,
    /// Final time on display.
    Finish,
    /// Link failure; run abandoned.
    SendError,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Unknown => "UNKNOWN",
            State::Start => "START",
            State::Ready => "READY",
            State::RunCheck => "RUN_CHECK",
            State::Run => "RUN",
            State::Finish => "FINISH",
            State::SendError => "SEND_ERROR",
        };
        f.write_str(name)
    }
}

// ── Events and messages ──────────────────────────────────────────────

/// Everything the role machine reacts to, local or received.
///
/// The discriminants are the wire codes; both units must be built from the
/// same enumeration since frames carry no version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Event {
    SendError = 1,
    ButtonReset = 2,
    MessageInit = 3,
    MessageAck = 4,
    MessageFinish = 5,
    ObjectLeft = 6,
    ObjectArrived = 7,
    RunConfirmed = 8,
    Timeout = 9,
}

impl Event {
    pub const ALL: [Event; 9] = [
        Event::SendError,
        Event::ButtonReset,
        Event::MessageInit,
        Event::MessageAck,
        Event::MessageFinish,
        Event::ObjectLeft,
        Event::ObjectArrived,
        Event::RunConfirmed,
        Event::Timeout,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Event> {
        Event::ALL.into_iter().find(|e| e.code() == code)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::SendError => "SEND_ERROR",
            Event::ButtonReset => "BUTTON_RESET",
            Event::MessageInit => "MESSAGE_INIT",
            Event::MessageAck => "MESSAGE_ACK",
            Event::MessageFinish => "MESSAGE_FINISH",
            Event::ObjectLeft => "OBJECT_LEFT",
            Event::ObjectArrived => "OBJECT_ARRIVED",
            Event::RunConfirmed => "RUN_CONFIRMED",
            Event::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// The `{event, time}` record carried by both queues and the radio link.
///
/// `time` is only meaningful for `MessageFinish` (measured time) and
/// `RunConfirmed` (elapsed time since departure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    pub event: Event,
    pub time: u32,
}

impl Message {
    pub fn new(event: Event) -> Self {
        Self { event, time: 0 }
    }

    pub fn with_time(event: Event, time: u32) -> Self {
        Self { event, time }
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::new(event)
    }
}

// ── Addressing ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MacParseError {
    #[error("expected 6 colon-separated octets, got {0}")]
    OctetCount(usize),

    #[error("invalid octet '{0}'")]
    Octet(String),
}

/// Fixed 6-byte hardware identity of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(MacParseError::OctetCount(parts.len()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| MacParseError::Octet(part.to_string()))?;
        }
        Ok(MacAddr(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(addr: MacAddr) -> Self {
        addr.to_string()
    }
}
