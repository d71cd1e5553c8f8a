//! MAC address type with lenient parsing of vendor output formats.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// Device command output uses several spellings for the same address, so
/// parsing accepts all of them and display always normalizes to the
/// lowercase colon form.
///
/// # Examples
///
/// ```
/// use netdisc_types::MacAddress;
///
/// let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:11:22:33:44:55");
///
/// // Cisco dotted and hyphenated forms are the same address
/// let cisco: MacAddress = "0011.2233.4455".parse().unwrap();
/// let hyphen: MacAddress = "00-11-22-33-44-55".parse().unwrap();
/// assert_eq!(mac, cisco);
/// assert_eq!(mac, hyphen);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast MAC address (ff:ff:ff:ff:ff:ff).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// The zero/null MAC address (00:00:00:00:00:00).
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true if this is a multicast address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true if this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns true if this is the zero address.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    fn from_hex_digits(raw: &str, digits: &str) -> Result<Self, ParseError> {
        if digits.len() != 12 || !digits.is_ascii() {
            return Err(ParseError::InvalidMacAddress(raw.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseError::InvalidMacAddress(raw.to_string()))?;
        }
        Ok(MacAddress(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        // Colon/hyphen forms carry six groups, the dotted form three.
        let (separator, groups) = if trimmed.contains(':') {
            (':', 6)
        } else if trimmed.contains('-') {
            ('-', 6)
        } else if trimmed.contains('.') {
            ('.', 3)
        } else {
            return Self::from_hex_digits(s, trimmed);
        };

        let parts: Vec<&str> = trimmed.split(separator).collect();
        let width = 12 / groups;
        if parts.len() != groups || parts.iter().any(|p| p.len() != width) {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        Self::from_hex_digits(s, &parts.concat())
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }
}
