//! Normalized per-table cache with replace-by-device semantics.
//!
//! Every write is scoped to one unit: either a device record, or the full
//! row set of one `(device, table)` pair. Each unit runs in its own
//! transaction, and a failed unit is rolled back (or the session reset)
//! before control returns, so the next unit on the shared session starts
//! clean.

use crate::error::{CacheError, CacheResult, StoreError};
use crate::store::{Store, StoreTransaction};
use netdisc_types::{CacheRow, CacheTable, DeviceId, DeviceRecord};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Structured cache over a transactional [`Store`].
pub struct StructuredCache {
    store: Arc<dyn Store>,
    /// The store exposes a single session; writers take turns.
    write_gate: Mutex<()>,
}

impl StructuredCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_gate: Mutex::new(()),
        }
    }

    /// Creates or refreshes the parent record of a device.
    ///
    /// Must complete before any [`replace_rows`](Self::replace_rows) for the
    /// device in a discovery run.
    #[instrument(skip(self, record), fields(device = %record.device_id))]
    pub async fn ensure_device_record(&self, record: &DeviceRecord) -> CacheResult<()> {
        let _gate = self.write_gate.lock().await;
        let device_id = &record.device_id;

        let result: Result<(), StoreError> = async {
            let mut tx = self.begin().await?;
            if let Err(e) = tx.upsert_device(record).await {
                self.recover(tx).await;
                return Err(e);
            }
            self.commit(tx).await
        }
        .await;

        result.map_err(|e| {
            warn!(device = %device_id, error = %e, "device record write failed");
            CacheError::device_record(device_id, e)
        })
    }

    /// Atomically replaces the full row set of `(device_id, table)`.
    ///
    /// On failure the unit is rolled back and previously committed data for
    /// other tables of the same device is untouched.
    #[instrument(skip(self, rows), fields(device = %device_id, table = %table, rows = rows.len()))]
    pub async fn replace_rows(
        &self,
        device_id: &DeviceId,
        table: CacheTable,
        rows: &[CacheRow],
    ) -> CacheResult<usize> {
        if let Some(row) = rows.iter().find(|row| row.table() != table) {
            return Err(CacheError::TableMismatch {
                expected: table,
                found: row.table(),
            });
        }

        let _gate = self.write_gate.lock().await;

        let result: Result<usize, StoreError> = async {
            let mut tx = self.begin().await?;
            let written = async {
                let deleted = tx.delete_rows(device_id, table).await?;
                tx.insert_rows(device_id, table, rows).await?;
                Ok::<_, StoreError>(deleted)
            }
            .await;

            match written {
                Ok(deleted) => {
                    self.commit(tx).await?;
                    debug!(deleted, inserted = rows.len(), "rows replaced");
                    Ok(rows.len())
                }
                Err(e) => {
                    self.recover(tx).await;
                    Err(e)
                }
            }
        }
        .await;

        result.map_err(|e| {
            warn!(device = %device_id, table = %table, error = %e, "row replacement failed");
            CacheError::write(device_id, table, e)
        })
    }

    /// Reads the committed record of a device.
    pub async fn device_record(&self, device_id: &DeviceId) -> CacheResult<Option<DeviceRecord>> {
        self.store
            .device_record(device_id)
            .await
            .map_err(|source| CacheError::Read { source })
    }

    /// Reads the committed rows of one `(device, table)` unit.
    pub async fn rows(&self, device_id: &DeviceId, table: CacheTable) -> CacheResult<Vec<CacheRow>> {
        self.store
            .rows(device_id, table)
            .await
            .map_err(|source| CacheError::Read { source })
    }

    /// Opens a transaction, clearing an aborted state left on the session
    /// by an earlier abandoned transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        match self.store.begin().await {
            Err(StoreError::SessionPoisoned { cause }) => {
                warn!(cause = %cause, "session left aborted, resetting before begin");
                self.reset_session().await;
                self.store.begin().await
            }
            other => other,
        }
    }

    async fn commit(&self, tx: Box<dyn StoreTransaction>) -> Result<(), StoreError> {
        match tx.commit().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.reset_session().await;
                Err(e)
            }
        }
    }

    /// Rolls back a failed unit, falling back to a session reset.
    async fn recover(&self, tx: Box<dyn StoreTransaction>) {
        match tx.rollback().await {
            Ok(()) => debug!("transaction rolled back"),
            Err(e) => {
                warn!(error = %e, "rollback failed, resetting session");
                self.reset_session().await;
            }
        }
    }

    async fn reset_session(&self) {
        if let Err(e) = self.store.reset().await {
            warn!(error = %e, "session reset failed");
        }
    }
}

impl std::fmt::Debug for StructuredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use netdisc_types::{ArpEntry, Interface, LinkStatus, Platform};
    use pretty_assertions::assert_eq;

    fn device(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    fn record(id: &str) -> DeviceRecord {
        DeviceRecord::new(device(id), id, "192.0.2.10", Platform::AristaEos)
    }

    fn interface(name: &str) -> CacheRow {
        CacheRow::Interface(Interface {
            name: name.to_string(),
            status: LinkStatus::Up,
            speed: Some("1000Mb/s".to_string()),
            description: None,
            mac_address: None,
            mtu: None,
        })
    }

    fn arp(ip: &str) -> CacheRow {
        CacheRow::Arp(ArpEntry {
            ip_address: ip.parse().unwrap(),
            mac_address: "aabb.ccdd.eeff".parse().unwrap(),
            interface: Some("Ethernet1".to_string()),
            age: None,
        })
    }

    fn cache() -> (MemoryStore, StructuredCache) {
        let store = MemoryStore::new();
        let cache = StructuredCache::new(Arc::new(store.clone()));
        (store, cache)
    }

    #[tokio::test]
    async fn test_ensure_device_record_is_idempotent() {
        let (_, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();

        let mut renamed = record("r1");
        renamed.display_name = "core-1".to_string();
        cache.ensure_device_record(&renamed).await.unwrap();

        let stored = cache.device_record(&device("r1")).await.unwrap().unwrap();
        assert_eq!(stored.display_name, "core-1");
    }

    #[tokio::test]
    async fn test_rows_require_parent_record() {
        let (store, cache) = cache();
        let err = cache
            .replace_rows(&device("r1"), CacheTable::Interfaces, &[interface("Et1")])
            .await
            .unwrap_err();
        assert!(err.is_parent_missing());
        assert!(!store.is_poisoned());
        assert!(cache
            .rows(&device("r1"), CacheTable::Interfaces)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_replace_is_authoritative() {
        let (_, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();
        cache
            .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.1"), arp("10.0.0.2")])
            .await
            .unwrap();
        cache
            .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.3")])
            .await
            .unwrap();

        let rows = cache.rows(&device("r1"), CacheTable::ArpEntries).await.unwrap();
        assert_eq!(rows, vec![arp("10.0.0.3")]);
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_poison_next_unit() {
        let (store, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();
        cache
            .replace_rows(&device("r1"), CacheTable::Interfaces, &[interface("Et1")])
            .await
            .unwrap();

        store.fail_writes(&device("r1"), CacheTable::Interfaces);
        let err = cache
            .replace_rows(&device("r1"), CacheTable::Interfaces, &[interface("Et2")])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Write { table: CacheTable::Interfaces, .. }));

        cache
            .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.9")])
            .await
            .unwrap();

        // The failed replacement left the previous interface set in place.
        let interfaces = cache.rows(&device("r1"), CacheTable::Interfaces).await.unwrap();
        assert_eq!(interfaces, vec![interface("Et1")]);
        assert_eq!(
            cache.rows(&device("r1"), CacheTable::ArpEntries).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_rollback_falls_back_to_reset() {
        let (store, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();
        store.fail_writes(&device("r1"), CacheTable::ArpEntries);
        store.fail_rollbacks(true);

        assert!(cache
            .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.1")])
            .await
            .is_err());
        assert!(!store.is_poisoned());

        store.clear_faults();
        cache
            .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.1")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_transaction_is_reset_before_next_unit() {
        let (store, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();

        store.fail_writes(&device("r1"), CacheTable::ArpEntries);
        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .insert_rows(&device("r1"), CacheTable::ArpEntries, &[arp("10.0.0.1")])
            .await
            .is_err());
        drop(tx);
        store.clear_faults();
        assert!(store.is_poisoned());

        for ip in ["10.0.0.2", "10.0.0.3"] {
            cache
                .replace_rows(&device("r1"), CacheTable::ArpEntries, &[arp(ip)])
                .await
                .unwrap();
        }
        cache.ensure_device_record(&record("r2")).await.unwrap();

        assert!(!store.is_poisoned());
        assert_eq!(
            cache.rows(&device("r1"), CacheTable::ArpEntries).await.unwrap(),
            vec![arp("10.0.0.3")]
        );
    }

    #[tokio::test]
    async fn test_table_mismatch_rejected_before_store() {
        let (store, cache) = cache();
        cache.ensure_device_record(&record("r1")).await.unwrap();
        let err = cache
            .replace_rows(&device("r1"), CacheTable::MacEntries, &[arp("10.0.0.1")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::TableMismatch {
                expected: CacheTable::MacEntries,
                found: CacheTable::ArpEntries,
            }
        );
        assert_eq!(store.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_device_record_failure_is_reported() {
        let (store, cache) = cache();
        store.fail_device_records(&device("r1"));
        let err = cache.ensure_device_record(&record("r1")).await.unwrap_err();
        assert!(matches!(err, CacheError::DeviceRecord { .. }));
        assert!(!store.is_poisoned());

        cache.ensure_device_record(&record("r2")).await.unwrap();
    }
}
