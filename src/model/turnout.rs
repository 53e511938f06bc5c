//! Turnouts (track switches).
//!
//! Three grammars describe turnouts:
//!
//! - list reply `jT [<id> ...]`
//! - detail reply `jT <id> <C|T|X> ["<description>"]`, state as a letter
//! - state push `H <id> <0|1>`, state as a digit

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::PushTarget;
use crate::error::{ExcsError, ExcsResult};
use crate::protocol::commands::RESP_TURNOUT_LIST_PREFIX;

static DETAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^jT\s+(?P<id>\d+)\s+(?P<state>[CTX])(?:\s+"(?P<desc>[^"]*)")?\s*$"#)
        .expect("turnout detail pattern is valid")
});

static STATE_PUSH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^H\s+(?P<id>\d+)\s+(?P<state>\d+)\s*$").expect("turnout state pattern is valid")
});

/// Position of a turnout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnoutState {
    /// Straight through.
    Closed,
    /// Diverging.
    Thrown,
}

impl TurnoutState {
    /// Decode the letter form used in detail replies.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Value` for anything but `C` or `T`, including the `X`
    ///   the station sends for an unknown turnout
    pub fn from_char(c: char) -> ExcsResult<Self> {
        match c {
            'C' => Ok(Self::Closed),
            'T' => Ok(Self::Thrown),
            other => Err(ExcsError::value(format!(
                "invalid turnout state '{other}', expected C or T"
            ))),
        }
    }

    /// Decode the digit form used in `H` pushes.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Value` for anything but `0` or `1`
    pub fn from_digit(token: &str) -> ExcsResult<Self> {
        match token {
            "0" => Ok(Self::Closed),
            "1" => Ok(Self::Thrown),
            other => Err(ExcsError::value(format!(
                "invalid turnout state value '{other}', expected 0 (closed) or 1 (thrown)"
            ))),
        }
    }

    /// Letter form used in `T <id> <state>` commands.
    pub fn as_char(self) -> char {
        match self {
            Self::Closed => 'C',
            Self::Thrown => 'T',
        }
    }
}

impl fmt::Display for TurnoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Thrown => write!(f, "thrown"),
        }
    }
}

/// A turnout defined on the command station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turnout {
    pub id: u16,
    /// Falls back to `Turnout <id>` when the station has none.
    pub description: String,
    pub state: TurnoutState,
    /// Prefix of the `H` pushes that concern this turnout.
    pub receive_prefix: String,
}

impl Turnout {
    /// Create a turnout; an empty description gets the default label.
    pub fn new(id: u16, state: TurnoutState, description: &str) -> Self {
        let description = if description.is_empty() {
            format!("Turnout {id}")
        } else {
            description.to_string()
        };
        Self {
            id,
            description,
            state,
            receive_prefix: format!("H {id}"),
        }
    }

    /// Parse a detail reply.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the grammar does not match
    /// - `ExcsError::Value` if the state letter is `X` (unknown turnout)
    pub fn from_detail_response(message: &str) -> ExcsResult<Self> {
        let caps = DETAIL_RE.captures(message.trim()).ok_or_else(|| {
            ExcsError::invalid_response(format!("invalid turnout detail response: {message}"))
        })?;

        let id = parse_id(&caps["id"], message)?;
        let state_char = caps["state"].chars().next().unwrap_or('X');
        let state = TurnoutState::from_char(state_char).map_err(|e| {
            ExcsError::value(format!("turnout {id}: {e}"))
        })?;
        let description = caps.name("desc").map(|m| m.as_str()).unwrap_or("");

        Ok(Self::new(id, state, description))
    }

    /// Parse a detail reply and check that it describes `expected_id`.
    ///
    /// # Errors
    ///
    /// - as [`Turnout::from_detail_response`], plus `ExcsError::Value` on an id mismatch
    pub fn from_detail_response_for(expected_id: u16, message: &str) -> ExcsResult<Self> {
        let turnout = Self::from_detail_response(message)?;
        if turnout.id != expected_id {
            return Err(ExcsError::value(format!(
                "turnout id {} does not match requested id {}",
                turnout.id, expected_id
            )));
        }
        Ok(turnout)
    }

    /// Parse a list reply into turnout ids. `jT` alone means none.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the prefix is wrong or an id is not numeric
    pub fn parse_ids(message: &str) -> ExcsResult<Vec<u16>> {
        parse_id_list(message, RESP_TURNOUT_LIST_PREFIX, "turnout")
    }

    /// Parse an `H <id> <0|1>` push.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the grammar does not match
    /// - `ExcsError::Value` if the state digit is not 0 or 1
    pub fn parse_state_push(message: &str) -> ExcsResult<(u16, TurnoutState)> {
        let caps = STATE_PUSH_RE.captures(message.trim()).ok_or_else(|| {
            ExcsError::invalid_response(format!("invalid turnout state message: {message}"))
        })?;
        let id = parse_id(&caps["id"], message)?;
        let state = TurnoutState::from_digit(&caps["state"])?;
        Ok((id, state))
    }

    /// Command body that moves turnout `id` to `state`.
    pub fn toggle_command(id: u16, state: TurnoutState) -> String {
        crate::protocol::commands::set_turnout(id, state)
    }
}

impl PushTarget for Turnout {
    fn apply_push(&mut self, message: &str) -> ExcsResult<bool> {
        if !message.starts_with(&self.receive_prefix) {
            return Ok(false);
        }
        // "H 1" is also a prefix of "H 12 ..."; the parsed id decides.
        let (id, state) = Self::parse_state_push(message)?;
        if id != self.id {
            return Ok(false);
        }
        let changed = self.state != state;
        self.state = state;
        Ok(changed)
    }
}

fn parse_id(token: &str, message: &str) -> ExcsResult<u16> {
    token
        .parse()
        .map_err(|_| ExcsError::invalid_response(format!("id '{token}' out of range in: {message}")))
}

/// Shared list grammar: `<prefix>` followed by zero or more integer ids.
pub(crate) fn parse_id_list(message: &str, prefix: &str, kind: &str) -> ExcsResult<Vec<u16>> {
    let rest = message.trim().strip_prefix(prefix).ok_or_else(|| {
        ExcsError::invalid_response(format!("invalid {kind} list response: {message}"))
    })?;

    // "jTx" must not pass as an empty list.
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(ExcsError::invalid_response(format!(
            "invalid {kind} list response: {message}"
        )));
    }

    rest.split_whitespace()
        .map(|token| {
            token.parse::<u16>().map_err(|_| {
                ExcsError::invalid_response(format!("invalid {kind} id '{token}' in: {message}"))
            })
        })
        .collect()
}
