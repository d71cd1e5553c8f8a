//! Per-device and per-data-type discovery results.

use crate::error::{TransportError, TransportErrorKind};
use chrono::{DateTime, Utc};
use netdisc_types::{CacheRow, CacheTable, DataType, DeviceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a data-type failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Auth,
    Unsupported,
    Connection,
    /// The payload was not a list of row objects.
    Parse,
    /// The device is not in the inventory.
    NotFound,
    /// The worker for the device stopped unexpectedly.
    Internal,
}

impl From<TransportErrorKind> for FailureKind {
    fn from(kind: TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::Timeout => FailureKind::Timeout,
            TransportErrorKind::Auth => FailureKind::Auth,
            TransportErrorKind::Unsupported => FailureKind::Unsupported,
            TransportErrorKind::Connection => FailureKind::Connection,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::Unsupported => "unsupported",
            FailureKind::Connection => "connection",
            FailureKind::Parse => "parse",
            FailureKind::NotFound => "not_found",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Why a data-type was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The job was cancelled before this data-type's command was issued.
    Cancelled,
    /// The device's platform has no command for the data-type.
    UnsupportedOnPlatform,
}

/// Terminal status of one data-type on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DataTypeStatus {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
    Skipped { reason: SkipReason },
}

impl DataTypeStatus {
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, DataTypeStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DataTypeStatus::Failed { .. })
    }

    /// Failure kind, if failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            DataTypeStatus::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<&TransportError> for DataTypeStatus {
    fn from(err: &TransportError) -> Self {
        DataTypeStatus::failed(err.kind.into(), err.message.clone())
    }
}

/// Where a data-type's payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    Device,
    RawCache,
}

/// Result of one data-type on one device.
///
/// A cache write failure never changes `status`; it shows up as
/// `cached == false` with `cache_error` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTypeOutcome {
    pub data_type: DataType,
    #[serde(flatten)]
    pub status: DataTypeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PayloadSource>,
    /// Transport calls made (0 when served from the raw cache or skipped).
    pub attempts: u32,
    #[serde(default)]
    pub row_counts: BTreeMap<CacheTable, usize>,
    #[serde(default)]
    pub skipped_rows: usize,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<CacheRow>,
}

impl DataTypeOutcome {
    /// An outcome with the given status and nothing else recorded.
    pub fn bare(data_type: DataType, status: DataTypeStatus) -> Self {
        Self {
            data_type,
            status,
            command: None,
            source: None,
            attempts: 0,
            row_counts: BTreeMap::new(),
            skipped_rows: 0,
            cached: false,
            cache_error: None,
            rows: Vec::new(),
        }
    }

    pub fn skipped(data_type: DataType, reason: SkipReason) -> Self {
        Self::bare(data_type, DataTypeStatus::Skipped { reason })
    }
}

/// Aggregate status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Every attempted data-type succeeded.
    Succeeded,
    /// Some data-types succeeded, some failed.
    Partial,
    /// Nothing succeeded and at least one data-type failed.
    Failed,
    /// Nothing was attempted.
    Skipped,
}

impl DeviceStatus {
    /// Folds per-data-type statuses into a device status.
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a DataTypeStatus>) -> Self {
        let (mut succeeded, mut failed) = (0usize, 0usize);
        for status in statuses {
            match status {
                DataTypeStatus::Succeeded => succeeded += 1,
                DataTypeStatus::Failed { .. } => failed += 1,
                DataTypeStatus::Skipped { .. } => {}
            }
        }
        match (succeeded, failed) {
            (0, 0) => DeviceStatus::Skipped,
            (_, 0) => DeviceStatus::Succeeded,
            (0, _) => DeviceStatus::Failed,
            _ => DeviceStatus::Partial,
        }
    }

    /// Counts toward `successful_devices`.
    pub fn is_successful(&self) -> bool {
        matches!(self, DeviceStatus::Succeeded | DeviceStatus::Partial)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Succeeded => "succeeded",
            DeviceStatus::Partial => "partial",
            DeviceStatus::Failed => "failed",
            DeviceStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Terminal result of one device in a job. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    pub device_id: DeviceId,
    pub status: DeviceStatus,
    pub data_types: Vec<DataTypeOutcome>,
    /// Set when the device record could not be written; no rows were cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl DeviceOutcome {
    pub fn new(device_id: DeviceId, data_types: Vec<DataTypeOutcome>) -> Self {
        let status = DeviceStatus::from_statuses(data_types.iter().map(|d| &d.status));
        Self {
            device_id,
            status,
            data_types,
            record_error: None,
            finished_at: Utc::now(),
        }
    }

    /// Every data-type failed with the same kind and reason.
    pub fn all_failed(
        device_id: DeviceId,
        data_types: impl IntoIterator<Item = DataType>,
        kind: FailureKind,
        reason: &str,
    ) -> Self {
        let outcomes = data_types
            .into_iter()
            .map(|dt| DataTypeOutcome::bare(dt, DataTypeStatus::failed(kind, reason)))
            .collect();
        Self::new(device_id, outcomes)
    }

    /// Every data-type skipped for the same reason.
    pub fn all_skipped(
        device_id: DeviceId,
        data_types: impl IntoIterator<Item = DataType>,
        reason: SkipReason,
    ) -> Self {
        let outcomes = data_types
            .into_iter()
            .map(|dt| DataTypeOutcome::skipped(dt, reason))
            .collect();
        Self::new(device_id, outcomes)
    }

    /// Outcome for one data-type, if it was requested.
    pub fn data_type(&self, data_type: DataType) -> Option<&DataTypeOutcome> {
        self.data_types.iter().find(|d| d.data_type == data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn statuses(list: &[DataTypeStatus]) -> DeviceStatus {
        DeviceStatus::from_statuses(list.iter())
    }

    #[test]
    fn test_device_status_folding() {
        let ok = DataTypeStatus::Succeeded;
        let bad = DataTypeStatus::failed(FailureKind::Timeout, "slow");
        let skip = DataTypeStatus::Skipped {
            reason: SkipReason::Cancelled,
        };

        assert_eq!(statuses(&[ok.clone(), skip.clone()]), DeviceStatus::Succeeded);
        assert_eq!(statuses(&[ok.clone(), bad.clone()]), DeviceStatus::Partial);
        assert_eq!(statuses(&[bad.clone(), skip.clone()]), DeviceStatus::Failed);
        assert_eq!(statuses(&[skip]), DeviceStatus::Skipped);
        assert_eq!(statuses(&[]), DeviceStatus::Skipped);
        assert!(DeviceStatus::Partial.is_successful());
        assert!(!DeviceStatus::Failed.is_successful());
    }

    #[test]
    fn test_status_serializes_flat() {
        let outcome = DataTypeOutcome::bare(
            DataType::Arp,
            DataTypeStatus::failed(FailureKind::Auth, "denied"),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["data_type"], "arp");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["kind"], "auth");
        assert_eq!(value["reason"], "denied");
        assert!(value.get("rows").is_none());
    }

    #[test]
    fn test_all_failed_marks_every_data_type() {
        let outcome = DeviceOutcome::all_failed(
            DeviceId::new("ghost").unwrap(),
            [DataType::Arp, DataType::Interfaces],
            FailureKind::NotFound,
            "device not in inventory",
        );
        assert_eq!(outcome.status, DeviceStatus::Failed);
        assert_eq!(outcome.data_types.len(), 2);
        assert_eq!(
            outcome.data_type(DataType::Arp).unwrap().status.failure_kind(),
            Some(FailureKind::NotFound)
        );
    }
}
