//! Outbound command bodies and the reply prefixes they correlate with.
//!
//! Builders return the unwrapped body; [`super::frame_command`] adds the
//! brackets and terminator on the way out.

use crate::error::{ExcsError, ExcsResult};
use crate::model::roster::{Direction, MAX_SUPPORTED_FUNCTION, MAX_SPEED};
use crate::model::turnout::TurnoutState;

/// Request version and hardware info.
pub const CMD_SYSTEM_INFO: &str = "s";
/// Reply prefix for [`CMD_SYSTEM_INFO`].
pub const RESP_SYSTEM_INFO_PREFIX: &str = "iDCC-EX";

/// Power on all tracks.
pub const CMD_TRACKS_ON: &str = "1";
/// Power off all tracks.
pub const CMD_TRACKS_OFF: &str = "0";

/// List defined turnout ids.
pub const CMD_LIST_TURNOUTS: &str = "JT";
/// Reply prefix for [`CMD_LIST_TURNOUTS`].
pub const RESP_TURNOUT_LIST_PREFIX: &str = "jT";

/// List roster entry ids.
pub const CMD_LIST_ROSTER: &str = "JR";
/// Reply prefix for [`CMD_LIST_ROSTER`].
pub const RESP_ROSTER_LIST_PREFIX: &str = "jR";

/// `JT <id>`: request one turnout's state and description.
pub fn turnout_details(id: u16) -> String {
    format!("JT {id}")
}

/// Reply prefix for [`turnout_details`].
///
/// The trailing space keeps `jT 1 ` from claiming the reply for turnout 12.
pub fn turnout_details_prefix(id: u16) -> String {
    format!("jT {id} ")
}

/// `T <id> C|T`: throw or close a turnout.
pub fn set_turnout(id: u16, state: TurnoutState) -> String {
    format!("T {id} {}", state.as_char())
}

/// `JR <id>`: request one roster entry's description and function labels.
pub fn roster_details(cab: u16) -> String {
    format!("JR {cab}")
}

/// Reply prefix for [`roster_details`].
pub fn roster_details_prefix(cab: u16) -> String {
    format!("jR {cab} ")
}

/// `t <cab>`: ask the station to report a loco's throttle state.
pub fn loco_state(cab: u16) -> String {
    format!("t {cab}")
}

/// `t <cab> <speed> <dir>`: set speed and direction.
///
/// # Errors
///
/// - `ExcsError::Argument` if `speed` exceeds 127
pub fn set_loco_speed(cab: u16, speed: u8, direction: Direction) -> ExcsResult<String> {
    if speed > MAX_SPEED {
        return Err(ExcsError::argument(format!(
            "speed {speed} out of range 0..={MAX_SPEED}"
        )));
    }
    Ok(format!("t {cab} {speed} {}", direction.as_digit()))
}

/// `F <cab> <function> <0|1>`: switch a decoder function.
///
/// # Errors
///
/// - `ExcsError::Argument` if `function` exceeds the supported ceiling
pub fn set_loco_function(cab: u16, function: u8, on: bool) -> ExcsResult<String> {
    if function > MAX_SUPPORTED_FUNCTION {
        return Err(ExcsError::argument(format!(
            "function {function} out of range 0..={MAX_SUPPORTED_FUNCTION}"
        )));
    }
    Ok(format!("F {cab} {function} {}", u8::from(on)))
}

/// `w <address> <cv> <value>`: write a CV on the main track.
///
/// # Errors
///
/// - `ExcsError::Argument` if `cv` is outside 1..=1024
pub fn write_cv(address: u16, cv: u16, value: u8) -> ExcsResult<String> {
    if !(1..=1024).contains(&cv) {
        return Err(ExcsError::argument(format!("CV {cv} out of range 1..=1024")));
    }
    Ok(format!("w {address} {cv} {value}"))
}
