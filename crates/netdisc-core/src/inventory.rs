//! Device inventory boundary.
//!
//! The discovery core never creates devices. It resolves requested ids to
//! their address and platform through an [`Inventory`].

use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use netdisc_types::{DeviceId, DeviceRecord, Platform};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Resolved identity of a device: what the transport connects to and what
/// the structured cache stores as the parent record.
pub type DeviceInfo = DeviceRecord;

/// Resolves device identifiers.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Returns `Ok(None)` for an unknown device and `Err` only when the
    /// backend itself fails.
    async fn resolve(&self, device_id: &DeviceId) -> Result<Option<DeviceInfo>>;
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default, rename = "device")]
    devices: Vec<InventoryEntry>,
}

#[derive(Debug, Deserialize)]
struct InventoryEntry {
    id: DeviceId,
    #[serde(default)]
    name: Option<String>,
    address: String,
    #[serde(default)]
    platform: Option<String>,
}

/// Fixed in-memory inventory.
///
/// Loadable from TOML:
///
/// ```toml
/// [[device]]
/// id = "core-1"
/// name = "Core switch 1"
/// address = "10.0.0.1"
/// platform = "cisco_nxos"
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    devices: HashMap<DeviceId, DeviceInfo>,
    order: Vec<DeviceId>,
}

impl StaticInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a device.
    pub fn insert(&mut self, device: DeviceInfo) {
        if !self.devices.contains_key(&device.device_id) {
            self.order.push(device.device_id.clone());
        }
        self.devices.insert(device.device_id.clone(), device);
    }

    /// Parses an inventory from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: InventoryFile = toml::from_str(content)
            .map_err(|e| DiscoveryError::inventory(format!("failed to parse inventory: {}", e)))?;

        let mut inventory = Self::new();
        for entry in file.devices {
            if inventory.devices.contains_key(&entry.id) {
                return Err(DiscoveryError::inventory(format!(
                    "duplicate device '{}'",
                    entry.id
                )));
            }
            let name = entry.name.unwrap_or_else(|| entry.id.to_string());
            let platform = entry.platform.map(Platform::from).unwrap_or_default();
            inventory.insert(DeviceInfo::new(entry.id, name, entry.address, platform));
        }
        Ok(inventory)
    }

    /// Loads an inventory file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiscoveryError::inventory(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Device ids in file order.
    pub fn device_ids(&self) -> &[DeviceId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<DeviceInfo> for StaticInventory {
    fn from_iter<I: IntoIterator<Item = DeviceInfo>>(iter: I) -> Self {
        let mut inventory = Self::new();
        for device in iter {
            inventory.insert(device);
        }
        inventory
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn resolve(&self, device_id: &DeviceId) -> Result<Option<DeviceInfo>> {
        Ok(self.devices.get(device_id).cloned())
    }
}
