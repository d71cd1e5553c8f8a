//! Raw-response cache keyed by `(device, command)`.
//!
//! Holds the last parsed output of every command issued to every device.
//! Freshness is decided at read time against the configured TTL; writes
//! always overwrite (last-write-wins, no versioning).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use netdisc_types::DeviceId;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default freshness window for raw entries.
pub const DEFAULT_RAW_TTL: Duration = Duration::from_secs(30 * 60);

/// One cached command response.
#[derive(Debug, Clone)]
pub struct RawCacheEntry {
    pub device_id: DeviceId,
    pub command: String,
    pub payload: Value,
    /// Wall-clock capture time, for reporting.
    pub captured_at: DateTime<Utc>,
    /// Monotonic capture time, for freshness.
    stored_at: Instant,
}

impl RawCacheEntry {
    /// Time elapsed since the entry was captured.
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

/// Result of a raw cache lookup.
///
/// A miss and a stale hit both report `fresh == false`; a stale entry is
/// still returned so callers can inspect it.
#[derive(Debug, Clone)]
pub struct RawLookup {
    pub entry: Option<RawCacheEntry>,
    pub fresh: bool,
}

impl RawLookup {
    /// Returns the payload only when the entry is fresh.
    pub fn fresh_payload(&self) -> Option<&Value> {
        match (&self.entry, self.fresh) {
            (Some(entry), true) => Some(&entry.payload),
            _ => None,
        }
    }
}

/// Concurrent `(device, command)` → payload cache with TTL freshness.
///
/// Entries are independently keyed, so workers on different devices never
/// contend on a shared lock.
#[derive(Debug)]
pub struct RawCache {
    entries: DashMap<(DeviceId, String), RawCacheEntry>,
    ttl: Duration,
}

impl RawCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RAW_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up the last response for `command` on `device_id`.
    pub fn get(&self, device_id: &DeviceId, command: &str) -> RawLookup {
        let key = (device_id.clone(), command.to_string());
        match self.entries.get(&key) {
            Some(entry) => {
                let fresh = entry.stored_at.elapsed() < self.ttl;
                debug!(device = %device_id, command, fresh, "raw cache hit");
                RawLookup {
                    entry: Some(entry.clone()),
                    fresh,
                }
            }
            None => RawLookup {
                entry: None,
                fresh: false,
            },
        }
    }

    /// Stores `payload` as the latest response, replacing any previous entry.
    pub fn set(&self, device_id: &DeviceId, command: &str, payload: Value) {
        let entry = RawCacheEntry {
            device_id: device_id.clone(),
            command: command.to_string(),
            payload,
            captured_at: Utc::now(),
            stored_at: Instant::now(),
        };
        self.entries
            .insert((device_id.clone(), command.to_string()), entry);
    }

    /// Drops every entry for one device. Returns the number removed.
    pub fn invalidate_device(&self, device_id: &DeviceId) -> usize {
        let mut removed = 0;
        self.entries.retain(|(id, _), _| {
            let keep = id != device_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Drops every entry older than the TTL. Returns the number removed.
    pub fn purge_stale(&self) -> usize {
        let ttl = self.ttl;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.stored_at.elapsed() < ttl;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "purged stale raw cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RawCache {
    fn default() -> Self {
        Self::new()
    }
}
