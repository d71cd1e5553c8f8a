//! Network discovery orchestration
//!
//! Fans discovery requests out across many devices, runs one command per
//! requested data-type on each, and writes the results into the raw and
//! structured caches of `netdisc-cache`.
//!
//! - [`DiscoveryOrchestrator`]: accepts requests in blocking or queued mode
//! - [`JobTracker`]: job lifecycle, polling and cancellation
//! - [`DeviceDiscoveryWorker`]: the per-device sequence of commands
//! - [`DeviceTransport`] / [`Inventory`]: boundaries to the devices and
//!   to the source of device identities
//!
//! A job *completes* when every device has an outcome, whatever those
//! outcomes are. Failures are recorded per data-type and per device.

pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod job;
pub mod mapping;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod shell;
pub mod tracker;
pub mod transport;
pub mod worker;

pub use commands::CommandCatalog;
pub use config::{CacheConfig, DiscoveryConfig, JobsConfig, TransportConfig, WorkerConfig};
pub use error::{DiscoveryError, Result, TransportError, TransportErrorKind};
pub use inventory::{DeviceInfo, Inventory, StaticInventory};
pub use job::{
    DeviceProgress, DiscoveryJob, DiscoveryRequest, ExecutionMode, JobId, JobProgress, JobState,
    JobSummary,
};
pub use mapping::{map_payload, MappedRows, MappingError};
pub use orchestrator::{DiscoveryOrchestrator, JobHandle};
pub use outcome::{
    DataTypeOutcome, DataTypeStatus, DeviceOutcome, DeviceStatus, FailureKind, PayloadSource,
    SkipReason,
};
pub use retry::{Attempted, RetryPolicy};
pub use shell::ShellTransport;
pub use tracker::JobTracker;
pub use transport::DeviceTransport;
pub use worker::DeviceDiscoveryWorker;
