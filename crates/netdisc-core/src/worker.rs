//! Per-device discovery.
//!
//! A worker runs the requested data-types of one device in sequence. Each
//! data-type is an independent unit: its command goes through the raw cache
//! and the transport, its payload is mapped into rows, and each table it
//! feeds is replaced in the structured cache as its own transaction. Nothing
//! a single data-type does can abort the rest of the device.

use crate::commands::CommandCatalog;
use crate::inventory::DeviceInfo;
use crate::mapping::map_payload;
use crate::outcome::{
    DataTypeOutcome, DataTypeStatus, DeviceOutcome, FailureKind, PayloadSource, SkipReason,
};
use crate::retry::RetryPolicy;
use crate::transport::DeviceTransport;
use netdisc_cache::{RawCache, StructuredCache};
use netdisc_types::{DataType, DataTypeSet};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Discovers one device at a time. Cheap to share across tasks.
#[derive(Clone)]
pub struct DeviceDiscoveryWorker {
    transport: Arc<dyn DeviceTransport>,
    raw: Arc<RawCache>,
    structured: Arc<StructuredCache>,
    catalog: Arc<CommandCatalog>,
    retry: RetryPolicy,
}

/// Whether structured rows may be written for the device in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheMode {
    /// Caching disabled by the request.
    Off,
    /// The device record is in place.
    Ready,
    /// Caching requested but the device record could not be written.
    NoRecord,
}

impl DeviceDiscoveryWorker {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        raw: Arc<RawCache>,
        structured: Arc<StructuredCache>,
        catalog: Arc<CommandCatalog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            raw,
            structured,
            catalog,
            retry,
        }
    }

    /// Runs every requested data-type against `device` and returns its outcome.
    ///
    /// Once `cancel` is tripped no further command is issued; the remaining
    /// data-types are recorded as skipped.
    #[instrument(skip_all, fields(device = %device.device_id, platform = %device.platform))]
    pub async fn run(
        &self,
        device: &DeviceInfo,
        data_types: &DataTypeSet,
        cache_results: bool,
        cancel: &CancellationToken,
    ) -> DeviceOutcome {
        info!(data_types = data_types.len(), cache_results, "device discovery started");

        let mut record_error = None;
        let mode = if !cache_results {
            CacheMode::Off
        } else if cancel.is_cancelled() {
            // Nothing will be written, don't touch the record either.
            CacheMode::Off
        } else {
            match self.structured.ensure_device_record(device).await {
                Ok(()) => CacheMode::Ready,
                Err(e) => {
                    warn!(error = %e, "continuing without structured caching");
                    record_error = Some(e.to_string());
                    CacheMode::NoRecord
                }
            }
        };

        let mut outcomes = Vec::with_capacity(data_types.len());
        for data_type in data_types.iter() {
            if cancel.is_cancelled() {
                debug!(data_type = %data_type, "skipped, job cancelled");
                outcomes.push(DataTypeOutcome::skipped(data_type, SkipReason::Cancelled));
                continue;
            }

            let Some(command) = self.catalog.command(&device.platform, data_type) else {
                debug!(data_type = %data_type, "skipped, no command for platform");
                outcomes.push(DataTypeOutcome::skipped(
                    data_type,
                    SkipReason::UnsupportedOnPlatform,
                ));
                continue;
            };

            outcomes.push(
                self.discover(device, data_type, command, mode, record_error.as_deref(), cancel)
                    .await,
            );
        }

        let mut outcome = DeviceOutcome::new(device.device_id.clone(), outcomes);
        outcome.record_error = record_error;
        info!(status = %outcome.status, "device discovery finished");
        outcome
    }

    async fn discover(
        &self,
        device: &DeviceInfo,
        data_type: DataType,
        command: &str,
        mode: CacheMode,
        record_error: Option<&str>,
        cancel: &CancellationToken,
    ) -> DataTypeOutcome {
        let mut outcome = DataTypeOutcome::bare(data_type, DataTypeStatus::Succeeded);
        outcome.command = Some(command.to_string());

        let payload = match self.fetch(device, command, mode, cancel, &mut outcome).await {
            Some(payload) => payload,
            None => return outcome,
        };

        let mapped = match map_payload(data_type, &payload) {
            Ok(mapped) => mapped,
            Err(e) => {
                warn!(data_type = %data_type, error = %e, "payload could not be mapped");
                outcome.status = DataTypeStatus::failed(FailureKind::Parse, e.to_string());
                return outcome;
            }
        };
        if mapped.skipped > 0 {
            debug!(data_type = %data_type, skipped = mapped.skipped, "dropped uninterpretable rows");
        }
        outcome.skipped_rows = mapped.skipped;

        let mut cache_errors = Vec::new();
        for (table, rows) in mapped.tables {
            outcome.row_counts.insert(table, rows.len());
            if mode == CacheMode::Ready {
                if let Err(e) = self
                    .structured
                    .replace_rows(&device.device_id, table, &rows)
                    .await
                {
                    cache_errors.push(e.to_string());
                }
            }
            outcome.rows.extend(rows);
        }

        match mode {
            CacheMode::Off => {}
            CacheMode::Ready => {
                outcome.cached = cache_errors.is_empty();
                if !cache_errors.is_empty() {
                    outcome.cache_error = Some(cache_errors.join("; "));
                }
            }
            CacheMode::NoRecord => {
                outcome.cache_error = Some(format!(
                    "device record unavailable: {}",
                    record_error.unwrap_or("unknown error")
                ));
            }
        }
        outcome
    }

    /// Returns the payload for `command`, from the raw cache when fresh and
    /// from the device otherwise. Records a failed status and returns `None`
    /// when the transport gives up.
    async fn fetch(
        &self,
        device: &DeviceInfo,
        command: &str,
        mode: CacheMode,
        cancel: &CancellationToken,
        outcome: &mut DataTypeOutcome,
    ) -> Option<Value> {
        let device_id = &device.device_id;

        if let Some(payload) = self.raw.get(device_id, command).fresh_payload() {
            debug!(command, "served from raw cache");
            outcome.source = Some(PayloadSource::RawCache);
            return Some(payload.clone());
        }

        let attempted = self
            .retry
            .run(cancel, || self.transport.execute(device, command))
            .await;
        outcome.attempts = attempted.attempts;

        match attempted.result {
            Ok(payload) => {
                outcome.source = Some(PayloadSource::Device);
                if mode != CacheMode::Off {
                    self.raw.set(device_id, command, payload.clone());
                }
                Some(payload)
            }
            Err(e) => {
                warn!(command, attempts = attempted.attempts, error = %e, "command failed");
                outcome.status = DataTypeStatus::from(&e);
                None
            }
        }
    }
}

impl std::fmt::Debug for DeviceDiscoveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDiscoveryWorker")
            .field("raw", &self.raw)
            .field("retry", &self.retry)
            .finish()
    }
}
