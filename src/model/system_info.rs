//! System information reply: `iDCC-EX V-<version> / <processor> / <motor> [<build>]`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ExcsError, ExcsResult};

static SYSTEM_INFO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^iDCC-EX\s+V-(?P<version>(?P<numeric>\d+(?:\.\d+)*)(?:-[0-9A-Za-z_.]+)?)\s*/\s*(?P<processor>[^/]+?)\s*/\s*(?P<motor>[^\s/]+)(?:\s+(?:/\s*)?(?P<build>\S+))?\s*$",
    )
    .expect("system info pattern is valid")
});

/// Build number reported when the firmware omits it.
pub const UNKNOWN_BUILD: &str = "unknown";

/// A dotted firmware version compared component by component.
///
/// Ordering is lexicographic over the components, so `5.4` < `5.4.0` <
/// `5.4.8` < `5.5.0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version(Vec<u32>);

impl Version {
    /// Build a version from its components.
    pub fn new(components: impl Into<Vec<u32>>) -> Self {
        Self(components.into())
    }

    /// The integer components in order.
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// A version with no components, i.e. not yet retrieved.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Version {
    type Err = ExcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| ExcsError::value(format!("invalid version component '{part}' in '{s}'")))
            })
            .collect::<ExcsResult<Vec<u32>>>()?;
        Ok(Self(components))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Version and hardware description of the command station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Version as reported, e.g. `5.4.8` or `5.2.76-Devel`.
    pub version: String,
    pub version_parsed: Version,
    pub processor_type: String,
    pub motor_controller: String,
    /// Build id, or `"unknown"` if the firmware did not send one.
    pub build_number: String,
}

impl SystemInfo {
    /// Parse a system info reply body.
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the line does not match the grammar
    pub fn parse(message: &str) -> ExcsResult<Self> {
        let caps = SYSTEM_INFO_RE.captures(message.trim()).ok_or_else(|| {
            ExcsError::invalid_response(format!("unrecognised system info response: {message}"))
        })?;

        let version = caps["version"].to_string();
        let version_parsed = caps["numeric"]
            .parse::<Version>()
            .map_err(|_| ExcsError::invalid_response(format!("unparsable version in: {message}")))?;

        Ok(Self {
            version,
            version_parsed,
            processor_type: caps["processor"].trim().to_string(),
            motor_controller: caps["motor"].to_string(),
            build_number: caps
                .name("build")
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| UNKNOWN_BUILD.to_string()),
        })
    }
}

/// Check that a retrieved version meets `minimum`.
///
/// # Errors
///
/// - `ExcsError::Version` if no version has been retrieved or it is older
///   than `minimum`
pub fn validate_version(info: Option<&SystemInfo>, minimum: &Version) -> ExcsResult<()> {
    let info = info
        .filter(|i| !i.version_parsed.is_empty())
        .ok_or_else(|| ExcsError::Version("version has not been retrieved yet".into()))?;

    if info.version_parsed < *minimum {
        return Err(ExcsError::Version(format!(
            "command station version {} is older than minimum supported {}",
            info.version, minimum
        )));
    }
    Ok(())
}
