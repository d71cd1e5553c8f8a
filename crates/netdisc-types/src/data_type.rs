//! Discoverable data-types and the structured cache tables they feed.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A category of discoverable information, retrieved with one device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Interfaces,
    Arp,
    StaticRoutes,
    OspfRoutes,
    BgpRoutes,
    MacTable,
    CdpNeighbors,
}

impl DataType {
    /// Every data-type, in discovery order.
    pub const ALL: [DataType; 7] = [
        DataType::Interfaces,
        DataType::Arp,
        DataType::StaticRoutes,
        DataType::OspfRoutes,
        DataType::BgpRoutes,
        DataType::MacTable,
        DataType::CdpNeighbors,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            DataType::Interfaces => "interfaces",
            DataType::Arp => "arp",
            DataType::StaticRoutes => "static_routes",
            DataType::OspfRoutes => "ospf_routes",
            DataType::BgpRoutes => "bgp_routes",
            DataType::MacTable => "mac_table",
            DataType::CdpNeighbors => "cdp_neighbors",
        }
    }

    /// Structured cache tables populated from this data-type's output.
    ///
    /// Interfaces feed two tables; IP address rows are associated to their
    /// interface by name and replaced independently.
    pub const fn tables(&self) -> &'static [CacheTable] {
        match self {
            DataType::Interfaces => &[CacheTable::Interfaces, CacheTable::IpAddresses],
            DataType::Arp => &[CacheTable::ArpEntries],
            DataType::StaticRoutes => &[CacheTable::StaticRoutes],
            DataType::OspfRoutes => &[CacheTable::OspfRoutes],
            DataType::BgpRoutes => &[CacheTable::BgpRoutes],
            DataType::MacTable => &[CacheTable::MacEntries],
            DataType::CdpNeighbors => &[CacheTable::CdpNeighbors],
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DataType::ALL
            .into_iter()
            .find(|dt| dt.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownDataType(s.to_string()))
    }
}

/// A table of the structured cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTable {
    Interfaces,
    IpAddresses,
    ArpEntries,
    StaticRoutes,
    OspfRoutes,
    BgpRoutes,
    MacEntries,
    CdpNeighbors,
}

impl CacheTable {
    pub const ALL: [CacheTable; 8] = [
        CacheTable::Interfaces,
        CacheTable::IpAddresses,
        CacheTable::ArpEntries,
        CacheTable::StaticRoutes,
        CacheTable::OspfRoutes,
        CacheTable::BgpRoutes,
        CacheTable::MacEntries,
        CacheTable::CdpNeighbors,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheTable::Interfaces => "interfaces",
            CacheTable::IpAddresses => "ip_addresses",
            CacheTable::ArpEntries => "arp_entries",
            CacheTable::StaticRoutes => "static_routes",
            CacheTable::OspfRoutes => "ospf_routes",
            CacheTable::BgpRoutes => "bgp_routes",
            CacheTable::MacEntries => "mac_entries",
            CacheTable::CdpNeighbors => "cdp_neighbors",
        }
    }
}

impl fmt::Display for CacheTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTable {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        CacheTable::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ParseError::UnknownCacheTable(s.to_string()))
    }
}

/// The explicit set of data-types requested for one discovery.
///
/// Iterates in [`DataType::ALL`] order regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataTypeSet(BTreeSet<DataType>);

impl DataTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every data-type.
    pub fn all() -> Self {
        DataType::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, data_type: DataType) -> bool {
        self.0.insert(data_type)
    }

    pub fn contains(&self, data_type: DataType) -> bool {
        self.0.contains(&data_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DataType> + '_ {
        self.0.iter().copied()
    }

    /// Parses a comma-separated list such as `interfaces,arp`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownDataType`] for the first unknown name.
    pub fn parse_list(list: &str) -> Result<Self, ParseError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(DataType::from_str)
            .collect()
    }
}

impl FromIterator<DataType> for DataTypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        DataTypeSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DataTypeSet {
    type Item = DataType;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, DataType>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}
