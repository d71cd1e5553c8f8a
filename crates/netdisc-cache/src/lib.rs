//! Two-tier cache for network discovery results.
//!
//! - [`RawCache`]: last parsed output per `(device, command)` with TTL freshness
//! - [`StructuredCache`]: normalized rows per `(device, table)`, replaced
//!   wholesale on every write, under a required parent [`DeviceRecord`]
//! - [`Store`] / [`StoreTransaction`]: the transactional persistence boundary
//! - [`MemoryStore`]: in-process store with a shared session and fault injection
//!
//! # Write isolation
//!
//! The store exposes one session shared by every worker. A failed statement
//! aborts that session until it is rolled back. [`StructuredCache`] runs each
//! `(device, table)` replacement in its own transaction and always recovers
//! the session before returning, so one failed unit never poisons another.
//!
//! ```ignore
//! let cache = StructuredCache::new(Arc::new(MemoryStore::new()));
//! cache.ensure_device_record(&record).await?;
//! cache.replace_rows(&record.device_id, CacheTable::ArpEntries, &rows).await?;
//! ```
//!
//! [`DeviceRecord`]: netdisc_types::DeviceRecord

mod error;
mod memory;
mod raw;
mod store;
mod structured;

pub use error::{CacheError, CacheResult, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use raw::{RawCache, RawCacheEntry, RawLookup, DEFAULT_RAW_TTL};
pub use store::{Store, StoreTransaction};
pub use structured::StructuredCache;
