//! Interface link status as reported by device command output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Link status of a discovered interface.
///
/// Vendors word this differently (`up`, `connected`, `administratively down`,
/// `notconnect`, `err-disabled`); parsing folds them into four states and
/// never fails, so an odd status string cannot drop an interface row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Link is operationally up.
    Up,
    /// Link is operationally down.
    Down,
    /// Interface is shut down by configuration.
    AdminDown,
    /// Status missing or not recognized.
    #[default]
    Unknown,
}

impl LinkStatus {
    /// Returns true if the link is operationally up.
    pub const fn is_up(&self) -> bool {
        matches!(self, LinkStatus::Up)
    }

    /// Returns the canonical string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Up => "up",
            LinkStatus::Down => "down",
            LinkStatus::AdminDown => "admin_down",
            LinkStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let status = match normalized.as_str() {
            "up" | "connected" | "up (connected)" => LinkStatus::Up,
            "administratively down" | "admin down" | "admin_down" | "disabled" => {
                LinkStatus::AdminDown
            }
            "down" | "notconnect" | "notconnected" | "err-disabled" | "lowerlayerdown" => {
                LinkStatus::Down
            }
            other if other.starts_with("up") => LinkStatus::Up,
            other if other.starts_with("down") => LinkStatus::Down,
            _ => LinkStatus::Unknown,
        };
        Ok(status)
    }
}
