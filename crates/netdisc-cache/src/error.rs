//! Error types for the discovery caches.
//!
//! [`StoreError`] is what a persistence backend reports. [`CacheError`]
//! wraps it with the `(device, table)` unit the failure is scoped to.

use netdisc_types::{CacheTable, DeviceId};
use thiserror::Error;

/// Result type alias for persistence backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by a [`Store`](crate::Store) backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Child rows were written for a device without a committed record.
    #[error("no device record for '{device_id}' (writing {table})")]
    ParentMissing {
        device_id: DeviceId,
        table: CacheTable,
    },

    /// A previous statement failed and the session was never rolled back.
    #[error("session is in an aborted transaction state: {cause}")]
    SessionPoisoned {
        /// The failure that aborted the session.
        cause: String,
    },

    /// A transaction is already open on the session.
    #[error("a transaction is already in progress")]
    TransactionInProgress,

    /// Backend operation failed.
    #[error("store operation failed: {operation}: {message}")]
    Backend { operation: String, message: String },
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Errors from [`StructuredCache`](crate::StructuredCache) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Creating or refreshing the device record failed.
    #[error("failed to write device record for '{device_id}': {source}")]
    DeviceRecord {
        device_id: DeviceId,
        #[source]
        source: StoreError,
    },

    /// Replacing the rows of one `(device, table)` unit failed and was rolled back.
    #[error("failed to replace {table} rows for '{device_id}': {source}")]
    Write {
        device_id: DeviceId,
        table: CacheTable,
        #[source]
        source: StoreError,
    },

    /// A row of another table was handed to `replace_rows`.
    #[error("row for table {found} passed to {expected} replacement")]
    TableMismatch {
        expected: CacheTable,
        found: CacheTable,
    },

    /// Reading from the store failed.
    #[error("failed to read from store: {source}")]
    Read {
        #[source]
        source: StoreError,
    },
}

impl CacheError {
    /// Creates a write error for one `(device, table)` unit.
    pub fn write(device_id: &DeviceId, table: CacheTable, source: StoreError) -> Self {
        Self::Write {
            device_id: device_id.clone(),
            table,
            source,
        }
    }

    /// Creates a device record error.
    pub fn device_record(device_id: &DeviceId, source: StoreError) -> Self {
        Self::DeviceRecord {
            device_id: device_id.clone(),
            source,
        }
    }

    /// Returns true if the failure came from a missing parent record.
    pub fn is_parent_missing(&self) -> bool {
        matches!(
            self,
            CacheError::Write {
                source: StoreError::ParentMissing { .. },
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device() -> DeviceId {
        DeviceId::new("sw1").unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::write(
            &device(),
            CacheTable::ArpEntries,
            StoreError::backend("insert", "disk full"),
        );
        assert_eq!(
            err.to_string(),
            "failed to replace arp_entries rows for 'sw1': store operation failed: insert: disk full"
        );
    }

    #[test]
    fn test_is_parent_missing() {
        let missing = CacheError::write(
            &device(),
            CacheTable::Interfaces,
            StoreError::ParentMissing {
                device_id: device(),
                table: CacheTable::Interfaces,
            },
        );
        assert!(missing.is_parent_missing());

        let other = CacheError::write(
            &device(),
            CacheTable::Interfaces,
            StoreError::TransactionInProgress,
        );
        assert!(!other.is_parent_missing());
    }
}
