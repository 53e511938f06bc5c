//! Roster entries (locomotives) and their decoder functions.
//!
//! Grammars:
//!
//! - list reply `jR [<id> ...]`
//! - detail reply `jR <id> "<description>" "<f0>/<f1>/..."`
//! - throttle push `l <cab> <reg> <speedByte> <functionMap>`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::turnout::parse_id_list;
use super::PushTarget;
use crate::error::{ExcsError, ExcsResult};
use crate::protocol::commands::RESP_ROSTER_LIST_PREFIX;

/// Highest function id handled (RCN-212 ceiling, F0..=F68).
pub const MAX_SUPPORTED_FUNCTION: u8 = 68;

/// Highest speed step accepted by the `t` command.
pub const MAX_SPEED: u8 = 127;

/// Label prefix marking a momentary (non-latching) function.
const MOMENTARY_PREFIX: char = '*';

static DETAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^jR\s+(?P<id>\d+)\s+"(?P<desc>[^"]*)"\s+"(?P<functions>[^"]*)"\s*$"#)
        .expect("roster detail pattern is valid")
});

static THROTTLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^l\s+(?P<cab>\d+)\s+(?P<reg>-?\d+)\s+(?P<speed_byte>\d+)\s+(?P<function_map>\d+)\s*$",
    )
    .expect("throttle pattern is valid")
});

/// Travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Reverse,
    Forward,
}

impl Direction {
    /// Digit form used by the `t` command and bit 7 of the speed byte.
    pub fn as_digit(self) -> u8 {
        match self {
            Self::Reverse => 0,
            Self::Forward => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reverse => write!(f, "reverse"),
            Self::Forward => write!(f, "forward"),
        }
    }
}

/// A decoder function slot with its label from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocoFunction {
    pub id: u8,
    pub label: String,
    pub is_momentary: bool,
    pub state: bool,
}

impl LocoFunction {
    /// Create a function from its raw roster label (`*Horn` is momentary).
    pub fn new(id: u8, raw_label: &str) -> Self {
        let (is_momentary, label) = match raw_label.strip_prefix(MOMENTARY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, raw_label),
        };
        let label = if label.is_empty() {
            format!("Function {id}")
        } else {
            label.to_string()
        };
        Self {
            id,
            label,
            is_momentary,
            state: false,
        }
    }
}

/// Speed, direction and emergency-stop flag decoded from a speed byte.
///
/// Bit 0 is the emergency stop flag, bits 1-6 carry the speed and bit 7 the
/// direction (1 = forward). The speed keeps its bit positions, so a byte of
/// `3` decodes to speed 2 with emergency stop set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    pub speed: u8,
    pub direction: Direction,
    pub emergency_stop: bool,
}

impl ThrottleState {
    pub fn from_speed_byte(speed_byte: u8) -> Self {
        Self {
            emergency_stop: speed_byte & 0x01 != 0,
            speed: speed_byte & 0x7E,
            direction: if speed_byte & 0x80 != 0 {
                Direction::Forward
            } else {
                Direction::Reverse
            },
        }
    }
}

/// A locomotive from the command station roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: u16,
    /// Falls back to `Locomotive <id>` when the roster has none.
    pub description: String,
    pub speed: u8,
    pub direction: Direction,
    pub emergency_stop: bool,
    /// Known functions keyed by id; never holds ids above 68.
    pub functions: BTreeMap<u8, LocoFunction>,
    /// Prefix of the throttle pushes that concern this loco.
    pub receive_prefix: String,
}

impl RosterEntry {
    /// Create an entry from its description and `/`-separated function labels.
    pub fn new(id: u16, description: &str, functions: &str) -> Self {
        let description = if description.is_empty() {
            format!("Locomotive {id}")
        } else {
            description.to_string()
        };
        Self {
            id,
            description,
            speed: 0,
            direction: Direction::Forward,
            emergency_stop: false,
            functions: parse_function_labels(functions),
            receive_prefix: format!("l {id}"),
        }
    }

    /// Parse a detail reply.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the grammar does not match
    pub fn from_detail_response(message: &str) -> ExcsResult<Self> {
        let caps = DETAIL_RE.captures(message.trim()).ok_or_else(|| {
            ExcsError::invalid_response(format!("invalid roster details response: {message}"))
        })?;
        let id = caps["id"].parse::<u16>().map_err(|_| {
            ExcsError::invalid_response(format!("cab id out of range in: {message}"))
        })?;
        Ok(Self::new(id, &caps["desc"], &caps["functions"]))
    }

    /// Parse a detail reply and check that it describes `expected_id`.
    ///
    /// # Errors
    ///
    /// - as [`RosterEntry::from_detail_response`], plus `ExcsError::Value` on an id mismatch
    pub fn from_detail_response_for(expected_id: u16, message: &str) -> ExcsResult<Self> {
        let entry = Self::from_detail_response(message)?;
        if entry.id != expected_id {
            return Err(ExcsError::value(format!(
                "cab id {} does not match requested id {}",
                entry.id, expected_id
            )));
        }
        Ok(entry)
    }

    /// Parse a list reply into cab ids. `jR` alone means an empty roster.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the prefix is wrong or an id is not numeric
    pub fn parse_ids(message: &str) -> ExcsResult<Vec<u16>> {
        parse_id_list(message, RESP_ROSTER_LIST_PREFIX, "roster")
    }

    /// Update speed, direction, emergency stop and function states from a
    /// throttle push.
    ///
    /// Bits of the function map for functions not in the roster are ignored.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the grammar does not match
    /// - `ExcsError::Value` if the cab id is not this entry's id, the speed
    ///   byte exceeds 255 or the function map does not fit in 128 bits
    pub fn process_throttle_response(&mut self, message: &str) -> ExcsResult<()> {
        let caps = THROTTLE_RE.captures(message.trim()).ok_or_else(|| {
            ExcsError::invalid_response(format!("invalid throttle response: {message}"))
        })?;

        let cab: u32 = caps["cab"].parse().map_err(|_| {
            ExcsError::invalid_response(format!("cab id out of range in: {message}"))
        })?;
        if cab != u32::from(self.id) {
            return Err(ExcsError::value(format!(
                "cab id {cab} does not match roster entry id {}",
                self.id
            )));
        }

        let speed_byte: u8 = caps["speed_byte"].parse().map_err(|_| {
            ExcsError::value(format!("speed byte out of range in: {message}"))
        })?;
        let function_map: u128 = caps["function_map"].parse().map_err(|_| {
            ExcsError::value(format!("function map out of range in: {message}"))
        })?;

        let throttle = ThrottleState::from_speed_byte(speed_byte);
        self.speed = throttle.speed;
        self.direction = throttle.direction;
        self.emergency_stop = throttle.emergency_stop;

        for (id, function) in self.functions.iter_mut() {
            function.state = (function_map >> id) & 1 == 1;
        }
        Ok(())
    }

    /// Command body that switches one of this loco's functions.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Argument` if `function_id` exceeds the supported ceiling
    pub fn toggle_function_command(&self, function_id: u8, on: bool) -> ExcsResult<String> {
        crate::protocol::commands::set_loco_function(self.id, function_id, on)
    }

    /// Command body that asks the station to report this loco's state.
    pub fn status_command(&self) -> String {
        crate::protocol::commands::loco_state(self.id)
    }
}

impl PushTarget for RosterEntry {
    fn apply_push(&mut self, message: &str) -> ExcsResult<bool> {
        if !message.starts_with(&self.receive_prefix) {
            return Ok(false);
        }
        // "l 3" also prefixes "l 30 ..."; only a matching cab id applies.
        let cab = message.split_whitespace().nth(1);
        if cab != Some(self.id.to_string().as_str()) {
            return Ok(false);
        }
        let before = self.clone();
        self.process_throttle_response(message)?;
        Ok(*self != before)
    }
}

/// Split `/`-separated labels; position is the function id.
fn parse_function_labels(functions: &str) -> BTreeMap<u8, LocoFunction> {
    let mut parsed = BTreeMap::new();
    if functions.is_empty() {
        return parsed;
    }

    for (index, label) in functions.split('/').enumerate() {
        if index > usize::from(MAX_SUPPORTED_FUNCTION) {
            break;
        }
        if label.is_empty() {
            continue;
        }
        // index <= 68 here, so the cast is lossless.
        let id = index as u8;
        parsed.insert(id, LocoFunction::new(id, label));
    }
    parsed
}
