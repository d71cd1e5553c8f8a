//! Persistence boundary for the structured cache.
//!
//! A [`Store`] is a transactional backend exposing one shared session. Once
//! a statement inside a transaction fails, the session stays aborted until
//! the transaction is rolled back or the session is [`reset`](Store::reset);
//! every later `begin` fails with [`StoreError::SessionPoisoned`].

use crate::error::StoreResult;
use async_trait::async_trait;
use netdisc_types::{CacheRow, CacheTable, DeviceId, DeviceRecord};

/// Transactional backend holding device records and their child rows.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a transaction on the shared session.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Clears an aborted-transaction state left on the session.
    async fn reset(&self) -> StoreResult<()>;

    /// Reads the committed record for a device.
    async fn device_record(&self, device_id: &DeviceId) -> StoreResult<Option<DeviceRecord>>;

    /// Reads the committed rows of one `(device, table)` unit.
    async fn rows(&self, device_id: &DeviceId, table: CacheTable) -> StoreResult<Vec<CacheRow>>;
}

/// An open transaction. Must be finished with `commit` or `rollback`.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Creates or updates a device record.
    async fn upsert_device(&mut self, record: &DeviceRecord) -> StoreResult<()>;

    /// Deletes every row of `table` for `device_id`. Returns the number deleted.
    async fn delete_rows(&mut self, device_id: &DeviceId, table: CacheTable)
        -> StoreResult<usize>;

    /// Inserts rows for `device_id`. Fails with
    /// [`StoreError::ParentMissing`](crate::StoreError::ParentMissing) if the
    /// device has no record.
    async fn insert_rows(
        &mut self,
        device_id: &DeviceId,
        table: CacheTable,
        rows: &[CacheRow],
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
