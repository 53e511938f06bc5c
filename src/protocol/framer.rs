//! Line framing.
//!
//! The transport hands over one newline-terminated line at a time. A line is
//! a protocol message only if it is wrapped in `<` and `>`; anything else is
//! line noise and is discarded without raising an error.

use std::fmt;

/// Longest line accepted from the station, terminator included. The longest
/// legitimate reply is a roster detail with 69 function labels.
pub const MAX_LINE_LEN: usize = 4096;

/// Outcome of unwrapping one received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A message body with the brackets stripped. Never empty.
    Message(String),
    /// The line was not a usable message.
    Discard(Discard),
}

/// Why a received line was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// The line did not start with `<` and end with `>`.
    Malformed(String),
    /// The line was exactly `<>`.
    Empty,
    /// The line ran past [`MAX_LINE_LEN`] bytes; the rest of it up to the
    /// next newline is dropped as well.
    Overlong(usize),
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(line) => write!(f, "malformed frame: {line:?}"),
            Self::Empty => write!(f, "empty frame"),
            Self::Overlong(len) => write!(f, "line longer than {len} bytes"),
        }
    }
}

/// Unwrap a received line into a message body.
///
/// Trailing `\r`/`\n` are removed first; surrounding whitespace outside the
/// brackets is ignored.
pub fn unwrap_line(line: &str) -> Frame {
    let line = line.trim();

    let body = match line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
        Some(body) => body,
        None => return Frame::Discard(Discard::Malformed(line.to_string())),
    };

    if body.is_empty() {
        return Frame::Discard(Discard::Empty);
    }

    Frame::Message(body.to_string())
}

/// Wrap a command body for transmission: `s` becomes `<s>\n`.
pub fn frame_command(body: &str) -> String {
    format!("<{body}>\n")
}
