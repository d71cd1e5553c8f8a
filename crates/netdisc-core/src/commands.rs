//! Platform-aware mapping of data-types to device commands.

use netdisc_types::{DataType, Platform};
use std::collections::{BTreeMap, HashMap};

/// Resolves the command string issued for a data-type on a platform.
///
/// Built-in commands cover Cisco IOS, NX-OS and Arista EOS; unknown
/// platforms use the IOS set. Overrides replace single entries, and an
/// empty override marks the data-type unsupported on that platform.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    overrides: HashMap<Platform, BTreeMap<DataType, String>>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from `platform -> data-type -> command` overrides.
    pub fn with_overrides(overrides: &BTreeMap<String, BTreeMap<DataType, String>>) -> Self {
        let mut catalog = Self::new();
        for (platform, commands) in overrides {
            for (data_type, command) in commands {
                catalog.set(Platform::from(platform.as_str()), *data_type, command.clone());
            }
        }
        catalog
    }

    /// Overrides one entry.
    pub fn set(&mut self, platform: Platform, data_type: DataType, command: impl Into<String>) {
        self.overrides
            .entry(platform)
            .or_default()
            .insert(data_type, command.into());
    }

    /// Returns the command for `data_type` on `platform`, or `None` if the
    /// platform has no such command.
    pub fn command(&self, platform: &Platform, data_type: DataType) -> Option<&str> {
        match self
            .overrides
            .get(platform)
            .and_then(|commands| commands.get(&data_type))
        {
            Some(command) if command.trim().is_empty() => None,
            Some(command) => Some(command.as_str()),
            None => builtin(platform, data_type),
        }
    }
}

fn builtin(platform: &Platform, data_type: DataType) -> Option<&'static str> {
    match (platform, data_type) {
        (Platform::CiscoNxos, DataType::Interfaces) => Some("show interface"),
        (Platform::AristaEos, DataType::CdpNeighbors) => None,
        (_, DataType::Interfaces) => Some("show interfaces"),
        (_, DataType::Arp) => Some("show ip arp"),
        (_, DataType::StaticRoutes) => Some("show ip route static"),
        (_, DataType::OspfRoutes) => Some("show ip route ospf"),
        (_, DataType::BgpRoutes) => Some("show ip route bgp"),
        (_, DataType::MacTable) => Some("show mac address-table"),
        (_, DataType::CdpNeighbors) => Some("show cdp neighbors detail"),
    }
}
