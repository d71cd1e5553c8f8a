//! Offline transport serving recorded command output from disk.
//!
//! Layout: `<root>/<device id>/<command with spaces as _>.json`, e.g.
//! `fixtures/core-1/show_ip_arp.json`.

use async_trait::async_trait;
use netdisc_core::{DeviceInfo, DeviceTransport, TransportError};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FixtureTransport {
    root: PathBuf,
}

impl FixtureTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the output of `command` on `device`.
    pub fn path_for(&self, device: &str, command: &str) -> PathBuf {
        let file = command.split_whitespace().collect::<Vec<_>>().join("_");
        self.root.join(device).join(format!("{}.json", file))
    }

    fn device_dir(&self, device: &str) -> PathBuf {
        self.root.join(device)
    }
}

#[async_trait]
impl DeviceTransport for FixtureTransport {
    async fn execute(&self, device: &DeviceInfo, command: &str) -> Result<Value, TransportError> {
        let device_id = device.device_id.as_str();
        if !is_dir(&self.device_dir(device_id)).await {
            return Err(TransportError::connection(format!(
                "no fixtures for device {}",
                device_id
            )));
        }

        let path = self.path_for(device_id, command);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransportError::unsupported(format!(
                    "no fixture for '{}' ({})",
                    command,
                    path.display()
                )));
            }
            Err(e) => return Err(TransportError::connection(e.to_string())),
        };

        serde_json::from_str(&content).map_err(|e| {
            TransportError::unsupported(format!("{}: {}", path.display(), e))
        })
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
