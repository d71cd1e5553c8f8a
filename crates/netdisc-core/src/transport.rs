//! Device command transport boundary.

use crate::error::TransportError;
use crate::inventory::DeviceInfo;
use async_trait::async_trait;
use serde_json::Value;

/// Executes one command against one device.
///
/// Implementations return the command output already parsed into a JSON
/// value (a list of row objects), enforce their own per-call timeout, and
/// classify failures into a [`TransportErrorKind`](crate::TransportErrorKind).
/// A single call is the only unit of network I/O in a discovery run.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn execute(&self, device: &DeviceInfo, command: &str) -> Result<Value, TransportError>;
}
