//! In-process transactional [`Store`].
//!
//! Models a single shared database session: one transaction at a time,
//! staged writes applied on commit, and an aborted state after any failed
//! statement that persists until rollback or reset. Write faults can be
//! injected per `(device, table)` to exercise failure isolation.

use crate::error::{StoreError, StoreResult};
use crate::store::{Store, StoreTransaction};
use async_trait::async_trait;
use netdisc_types::{CacheRow, CacheTable, DeviceId, DeviceRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type RowKey = (DeviceId, CacheTable);

#[derive(Debug, Default)]
struct Faults {
    writes: HashSet<RowKey>,
    records: HashSet<DeviceId>,
    rollback: bool,
}

#[derive(Debug, Default)]
struct Session {
    records: HashMap<DeviceId, DeviceRecord>,
    rows: HashMap<RowKey, Vec<CacheRow>>,
    open: bool,
    aborted: Option<String>,
    faults: Faults,
    commits: u64,
    rollbacks: u64,
}

impl Session {
    fn check_usable(&self) -> StoreResult<()> {
        match &self.aborted {
            Some(cause) => Err(StoreError::SessionPoisoned {
                cause: cause.clone(),
            }),
            None => Ok(()),
        }
    }

    fn abort(&mut self, err: StoreError) -> StoreError {
        self.aborted = Some(err.to_string());
        err
    }
}

/// Transactional in-memory store. Clones share the same session.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    session: Arc<Mutex<Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `insert_rows` for `(device_id, table)` fail.
    pub fn fail_writes(&self, device_id: &DeviceId, table: CacheTable) {
        self.session
            .lock()
            .faults
            .writes
            .insert((device_id.clone(), table));
    }

    /// Makes every `upsert_device` for `device_id` fail.
    pub fn fail_device_records(&self, device_id: &DeviceId) {
        self.session.lock().faults.records.insert(device_id.clone());
    }

    /// Makes `rollback` fail, leaving the session aborted.
    pub fn fail_rollbacks(&self, fail: bool) {
        self.session.lock().faults.rollback = fail;
    }

    pub fn clear_faults(&self) {
        self.session.lock().faults = Faults::default();
    }

    /// Returns true if the session is in an aborted transaction state.
    pub fn is_poisoned(&self) -> bool {
        self.session.lock().aborted.is_some()
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> u64 {
        self.session.lock().commits
    }

    /// Number of rolled back transactions.
    pub fn rollbacks(&self) -> u64 {
        self.session.lock().rollbacks
    }

    /// Devices with a committed record, sorted.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.session.lock().records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every `(device, table)` unit holding at least one committed row.
    pub fn populated_units(&self) -> Vec<(DeviceId, CacheTable)> {
        let mut units: Vec<_> = self
            .session
            .lock()
            .rows
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        units.sort();
        units
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut session = self.session.lock();
        session.check_usable()?;
        if session.open {
            return Err(StoreError::TransactionInProgress);
        }
        session.open = true;
        Ok(Box::new(MemoryTransaction {
            session: Arc::clone(&self.session),
            records: HashMap::new(),
            rows: HashMap::new(),
            finished: false,
        }))
    }

    async fn reset(&self) -> StoreResult<()> {
        let mut session = self.session.lock();
        session.aborted = None;
        session.open = false;
        Ok(())
    }

    async fn device_record(&self, device_id: &DeviceId) -> StoreResult<Option<DeviceRecord>> {
        Ok(self.session.lock().records.get(device_id).cloned())
    }

    async fn rows(&self, device_id: &DeviceId, table: CacheTable) -> StoreResult<Vec<CacheRow>> {
        Ok(self
            .session
            .lock()
            .rows
            .get(&(device_id.clone(), table))
            .cloned()
            .unwrap_or_default())
    }
}

struct MemoryTransaction {
    session: Arc<Mutex<Session>>,
    records: HashMap<DeviceId, DeviceRecord>,
    rows: HashMap<RowKey, Vec<CacheRow>>,
    finished: bool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn upsert_device(&mut self, record: &DeviceRecord) -> StoreResult<()> {
        let mut session = self.session.lock();
        session.check_usable()?;
        if session.faults.records.contains(&record.device_id) {
            let err = StoreError::backend("upsert_device", "injected fault");
            return Err(session.abort(err));
        }
        self.records
            .insert(record.device_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_rows(
        &mut self,
        device_id: &DeviceId,
        table: CacheTable,
    ) -> StoreResult<usize> {
        let session = self.session.lock();
        session.check_usable()?;
        let key = (device_id.clone(), table);
        let existing = match self.rows.get(&key) {
            Some(staged) => staged.len(),
            None => session.rows.get(&key).map_or(0, Vec::len),
        };
        self.rows.insert(key, Vec::new());
        Ok(existing)
    }

    async fn insert_rows(
        &mut self,
        device_id: &DeviceId,
        table: CacheTable,
        rows: &[CacheRow],
    ) -> StoreResult<()> {
        let mut session = self.session.lock();
        session.check_usable()?;

        let key = (device_id.clone(), table);
        if session.faults.writes.contains(&key) {
            let err = StoreError::backend("insert_rows", "injected fault");
            return Err(session.abort(err));
        }
        if !self.records.contains_key(device_id) && !session.records.contains_key(device_id) {
            let err = StoreError::ParentMissing {
                device_id: device_id.clone(),
                table,
            };
            return Err(session.abort(err));
        }
        if let Some(row) = rows.iter().find(|row| row.table() != table) {
            let err = StoreError::backend(
                "insert_rows",
                format!("{} row in {} table", row.table(), table),
            );
            return Err(session.abort(err));
        }

        let committed = session.rows.get(&key).cloned().unwrap_or_default();
        self.rows
            .entry(key)
            .or_insert(committed)
            .extend_from_slice(rows);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        let mut session = self.session.lock();
        session.open = false;
        session.check_usable()?;

        let records = std::mem::take(&mut self.records);
        let rows = std::mem::take(&mut self.rows);
        session.records.extend(records);
        session.rows.extend(rows);
        session.commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        let mut session = self.session.lock();
        session.open = false;
        if session.faults.rollback {
            return Err(StoreError::backend("rollback", "injected fault"));
        }
        session.aborted = None;
        session.rollbacks += 1;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // An abandoned transaction releases the session but leaves any
        // aborted state in place.
        if !self.finished {
            self.session.lock().open = false;
        }
    }
}
