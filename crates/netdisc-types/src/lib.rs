//! Common types for network topology discovery.
//!
//! This crate provides the vocabulary shared by the discovery engine and
//! its caches:
//!
//! - [`DeviceId`], [`Platform`], [`DeviceRecord`]: device identity and the
//!   parent record every structured cache row hangs off
//! - [`DataType`]: a category of discoverable information (one device command)
//! - [`CacheTable`]: a structured cache table; one data-type may feed several
//! - [`CacheRow`]: a normalized row, one variant per table
//! - [`MacAddress`], [`IpPrefix`], [`VlanId`], [`LinkStatus`]: network
//!   primitives parsed leniently from vendor command output

mod data_type;
mod device;
mod ip;
mod mac;
mod rows;
mod status;
mod vlan;

pub use data_type::{CacheTable, DataType, DataTypeSet};
pub use device::{DeviceId, DeviceRecord, Platform};
pub use ip::{IpPrefix, IpVersion};
pub use mac::MacAddress;
pub use rows::{
    ArpEntry, BgpRoute, CacheRow, CdpNeighbor, Interface, IpAddressRow, MacEntry, OspfRoute,
    StaticRoute,
};
pub use status::LinkStatus;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(String),

    #[error("unknown data type: {0}")]
    UnknownDataType(String),

    #[error("unknown cache table: {0}")]
    UnknownCacheTable(String),

    #[error("invalid device identifier: {0:?}")]
    InvalidDeviceId(String),
}
