//! Device identity and the structured-cache parent record.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable external identifier of a managed network device.
///
/// Identifiers are opaque strings; the only constraint is that they are
/// non-empty and carry no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or contains whitespace
    /// at either end.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.is_empty() || id.trim() != id {
            return Err(ParseError::InvalidDeviceId(id));
        }
        Ok(DeviceId(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DeviceId::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> String {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Network operating system family of a device.
///
/// Selects which command string is issued for each data-type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    #[default]
    CiscoIos,
    CiscoNxos,
    AristaEos,
    /// Any other platform, kept verbatim.
    Other(String),
}

impl Platform {
    /// Returns the canonical string form (`cisco_ios`, `cisco_nxos`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            Platform::CiscoIos => "cisco_ios",
            Platform::CiscoNxos => "cisco_nxos",
            Platform::AristaEos => "arista_eos",
            Platform::Other(name) => name,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cisco_ios" | "ios" | "cisco_xe" | "ios-xe" | "iosxe" => Platform::CiscoIos,
            "cisco_nxos" | "nxos" | "nx-os" => Platform::CiscoNxos,
            "arista_eos" | "eos" => Platform::AristaEos,
            _ => Platform::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Platform::from(s.as_str())
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> String {
        platform.as_str().to_string()
    }
}

/// Parent record that every structured cache row for a device hangs off.
///
/// Created or refreshed once per discovery run before any child rows are
/// written for the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub display_name: String,
    pub primary_address: String,
    #[serde(default)]
    pub platform: Platform,
}

impl DeviceRecord {
    pub fn new(
        device_id: DeviceId,
        display_name: impl Into<String>,
        primary_address: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            device_id,
            display_name: display_name.into(),
            primary_address: primary_address.into(),
            platform,
        }
    }
}
