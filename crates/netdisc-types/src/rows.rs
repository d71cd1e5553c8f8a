//! Normalized structured cache rows, one shape per cache table.
//!
//! Rows carry no device identifier; the cache stores them under the
//! `(device_id, table)` key they were replaced with.

use crate::{CacheTable, IpPrefix, IpVersion, LinkStatus, MacAddress, VlanId};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// An interface as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub status: LinkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// An IP address configured on an interface.
///
/// Linked to its [`Interface`] by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRow {
    pub interface_name: String,
    pub address: IpAddr,
    pub prefix_length: u8,
    pub ip_version: IpVersion,
}

impl IpAddressRow {
    pub fn new(interface_name: impl Into<String>, address: IpAddr, prefix_length: u8) -> Self {
        Self {
            interface_name: interface_name.into(),
            address,
            prefix_length,
            ip_version: IpVersion::of(&address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub ip_address: IpAddr,
    pub mac_address: MacAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub prefix: IpPrefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfRoute {
    pub prefix: IpPrefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Intra-area, inter-area or external (`O`, `O IA`, `O E2`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpRoute {
    pub prefix: IpPrefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub med: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac_address: MacAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<VlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// `dynamic`, `static`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdpNeighbor {
    pub local_interface: String,
    pub neighbor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbor_interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,
}

/// A structured cache row of any table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum CacheRow {
    #[serde(rename = "interfaces")]
    Interface(Interface),
    #[serde(rename = "ip_addresses")]
    IpAddress(IpAddressRow),
    #[serde(rename = "arp_entries")]
    Arp(ArpEntry),
    StaticRoutes(StaticRoute),
    OspfRoutes(OspfRoute),
    BgpRoutes(BgpRoute),
    #[serde(rename = "mac_entries")]
    Mac(MacEntry),
    CdpNeighbors(CdpNeighbor),
}

impl CacheRow {
    /// The table this row belongs to.
    pub const fn table(&self) -> CacheTable {
        match self {
            CacheRow::Interface(_) => CacheTable::Interfaces,
            CacheRow::IpAddress(_) => CacheTable::IpAddresses,
            CacheRow::Arp(_) => CacheTable::ArpEntries,
            CacheRow::StaticRoutes(_) => CacheTable::StaticRoutes,
            CacheRow::OspfRoutes(_) => CacheTable::OspfRoutes,
            CacheRow::BgpRoutes(_) => CacheTable::BgpRoutes,
            CacheRow::Mac(_) => CacheTable::MacEntries,
            CacheRow::CdpNeighbors(_) => CacheTable::CdpNeighbors,
        }
    }
}
