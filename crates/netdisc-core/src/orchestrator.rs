//! Discovery orchestration.
//!
//! The orchestrator accepts discovery requests, registers them with the
//! [`JobTracker`], and fans each job out across its devices on a bounded
//! pool shared by every job. Blocking and queued submissions run the same
//! fan-out; they differ only in whether `submit` waits for it.
//!
//! Devices are leased to one unsettled job at a time. A request that
//! overlaps an unsettled job is rejected with [`DiscoveryError::DevicesBusy`];
//! a lease lapses as soon as its job settles.

use crate::commands::CommandCatalog;
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::inventory::{DeviceInfo, Inventory};
use crate::job::{DiscoveryJob, DiscoveryRequest, ExecutionMode, JobId, JobProgress, JobSummary};
use crate::outcome::{DeviceOutcome, FailureKind, SkipReason};
use crate::tracker::JobTracker;
use crate::transport::DeviceTransport;
use crate::worker::DeviceDiscoveryWorker;
use chrono::Utc;
use netdisc_cache::{RawCache, Store, StructuredCache};
use netdisc_types::{DataTypeSet, DeviceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Returned by [`DiscoveryOrchestrator::submit`].
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: JobId,
    pub mode: ExecutionMode,
    /// Final for blocking jobs; the pending snapshot for queued ones.
    pub summary: JobSummary,
}

/// Fans discovery jobs out across devices.
#[derive(Clone)]
pub struct DiscoveryOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    worker: DeviceDiscoveryWorker,
    inventory: Arc<dyn Inventory>,
    tracker: Arc<JobTracker>,
    raw: Arc<RawCache>,
    structured: Arc<StructuredCache>,
    pool: Arc<Semaphore>,
    leases: Mutex<HashMap<DeviceId, JobId>>,
    retention: Duration,
}

/// Releases a job's device leases when dropped.
struct Leases {
    inner: Arc<Inner>,
    job_id: JobId,
}

impl std::fmt::Debug for Leases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leases").field("job_id", &self.job_id).finish_non_exhaustive()
    }
}

impl Drop for Leases {
    fn drop(&mut self) {
        let mut leases = self.inner.leases.lock();
        leases.retain(|_, holder| *holder != self.job_id);
        debug!(job_id = %self.job_id, "device leases released");
    }
}

impl DiscoveryOrchestrator {
    /// Builds an orchestrator from configuration and its collaborators.
    pub fn new(
        config: &DiscoveryConfig,
        transport: Arc<dyn DeviceTransport>,
        inventory: Arc<dyn Inventory>,
        store: Arc<dyn Store>,
        tracker: Arc<JobTracker>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog: CommandCatalog = config.command_catalog()?;

        let raw = Arc::new(RawCache::with_ttl(config.raw_ttl()));
        let structured = Arc::new(StructuredCache::new(store));
        let worker = DeviceDiscoveryWorker::new(
            transport,
            Arc::clone(&raw),
            Arc::clone(&structured),
            Arc::new(catalog),
            config.retry_policy(),
        );

        info!(
            max_concurrent_devices = config.worker.max_concurrent_devices,
            raw_ttl_secs = config.cache.raw_ttl_secs,
            "discovery orchestrator ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                worker,
                inventory,
                tracker,
                raw,
                structured,
                pool: Arc::new(Semaphore::new(config.worker.max_concurrent_devices)),
                leases: Mutex::new(HashMap::new()),
                retention: config.job_retention(),
            }),
        })
    }

    pub fn raw_cache(&self) -> &Arc<RawCache> {
        &self.inner.raw
    }

    pub fn structured_cache(&self) -> &Arc<StructuredCache> {
        &self.inner.structured
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.inner.tracker
    }

    /// Accepts a discovery request.
    ///
    /// Blocking requests return once every device has an outcome. Queued
    /// requests return at once with the job pending.
    ///
    /// # Errors
    ///
    /// Fails without creating a job when the request names no devices or no
    /// data-types, or when a requested device is held by an unsettled job.
    #[instrument(skip(self, request), fields(mode = %request.mode, devices = request.device_ids.len()))]
    pub async fn submit(&self, request: DiscoveryRequest) -> Result<JobHandle> {
        if request.device_ids.is_empty() {
            return Err(DiscoveryError::EmptyRequest);
        }
        if request.data_types.is_empty() {
            return Err(DiscoveryError::NoDataTypes);
        }

        let job = DiscoveryJob::new(JobId::new(), &request);
        let job_id = job.job_id;
        let devices = job.requested_device_ids.clone();

        let (leases, cancel) = self.inner.lease(job)?;
        info!(
            job_id = %job_id,
            devices = devices.len(),
            data_types = request.data_types.len(),
            "discovery job accepted"
        );

        let inner = Arc::clone(&self.inner);
        let data_types = request.data_types;
        let cache_results = request.cache_results;
        let run = tokio::spawn(async move {
            let _leases = leases;
            inner
                .execute(job_id, devices, data_types, cache_results, cancel)
                .await;
        });

        if request.mode == ExecutionMode::Blocking {
            if let Err(e) = run.await {
                error!(job_id = %job_id, error = %e, "discovery job aborted");
                self.inner.tracker.mark_failed(job_id, format!("orchestration aborted: {}", e));
            }
        }

        Ok(JobHandle {
            job_id,
            mode: request.mode,
            summary: self.inner.tracker.get(job_id)?.summary(),
        })
    }

    /// Full snapshot of a job.
    pub fn job(&self, job_id: JobId) -> Result<DiscoveryJob> {
        self.inner.tracker.get(job_id)
    }

    /// Poll response for a job.
    pub fn progress(&self, job_id: JobId) -> Result<JobProgress> {
        self.inner.tracker.get(job_id).map(|job| job.progress())
    }

    /// Cancels a queued job; see [`JobTracker::cancel`].
    pub fn cancel(&self, job_id: JobId) -> Result<JobProgress> {
        self.inner.tracker.cancel(job_id).map(|job| job.progress())
    }

    /// Waits for a job to settle and returns its summary.
    pub async fn wait(&self, job_id: JobId) -> Result<JobSummary> {
        self.inner
            .tracker
            .wait_settled(job_id)
            .await
            .map(|job| job.summary())
    }

    /// Drops settled jobs older than the configured retention.
    pub fn prune_expired(&self) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.inner.retention) else {
            return 0;
        };
        match Utc::now().checked_sub_signed(retention) {
            Some(cutoff) => self.inner.tracker.prune_finished(cutoff),
            None => 0,
        }
    }
}

impl Inner {
    /// Leases the job's devices and registers it with the tracker.
    ///
    /// Both happen under the lease lock, so a lease is never visible for a
    /// job the tracker does not know.
    fn lease(self: &Arc<Self>, job: DiscoveryJob) -> Result<(Leases, CancellationToken)> {
        let mut leases = self.leases.lock();
        let job_id = job.job_id;
        let devices = &job.requested_device_ids;

        let mut holder = None;
        let busy: Vec<DeviceId> = devices
            .iter()
            .filter(|id| match leases.get(*id) {
                Some(owner) if self.tracker.is_active(*owner) => {
                    holder.get_or_insert(*owner);
                    true
                }
                _ => false,
            })
            .cloned()
            .collect();

        if let Some(holder) = holder {
            warn!(job_id = %holder, devices = busy.len(), "rejecting overlapping discovery");
            return Err(DiscoveryError::DevicesBusy {
                job_id: holder,
                devices: busy,
            });
        }

        for id in devices {
            leases.insert(id.clone(), job_id);
        }
        let cancel = self.tracker.register(job);
        Ok((
            Leases {
                inner: Arc::clone(self),
                job_id,
            },
            cancel,
        ))
    }

    #[instrument(skip_all, fields(job_id = %job_id))]
    async fn execute(
        &self,
        job_id: JobId,
        devices: Vec<DeviceId>,
        data_types: DataTypeSet,
        cache_results: bool,
        cancel: CancellationToken,
    ) {
        let resolved = match self.resolve(job_id, devices, &data_types).await {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "discovery could not start");
                self.tracker.mark_failed(job_id, e.to_string());
                return;
            }
        };

        let mut tasks = JoinSet::new();
        for device in resolved {
            let worker = self.worker.clone();
            let tracker = Arc::clone(&self.tracker);
            let pool = Arc::clone(&self.pool);
            let data_types = data_types.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = pool.acquire_owned() => permit.ok(),
                };

                let outcome = match permit {
                    Some(_permit) if !cancel.is_cancelled() => {
                        tracker.mark_running(job_id);
                        worker.run(&device, &data_types, cache_results, &cancel).await
                    }
                    _ => {
                        debug!(device = %device.device_id, "device not started");
                        DeviceOutcome::all_skipped(
                            device.device_id.clone(),
                            data_types.iter(),
                            SkipReason::Cancelled,
                        )
                    }
                };
                tracker.record_outcome(job_id, outcome);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "device task stopped unexpectedly");
            }
        }

        // Devices whose task died never recorded an outcome.
        if let Ok(job) = self.tracker.get(job_id) {
            for device_id in job.pending_devices() {
                self.tracker.record_outcome(
                    job_id,
                    DeviceOutcome::all_failed(
                        device_id,
                        data_types.iter(),
                        FailureKind::Internal,
                        "device worker stopped unexpectedly",
                    ),
                );
            }
        }
    }

    /// Resolves every device. Unknown devices get their outcome here.
    async fn resolve(
        &self,
        job_id: JobId,
        devices: Vec<DeviceId>,
        data_types: &DataTypeSet,
    ) -> Result<Vec<DeviceInfo>> {
        let mut resolved = Vec::with_capacity(devices.len());
        for device_id in devices {
            match self.inventory.resolve(&device_id).await? {
                Some(info) => resolved.push(info),
                None => {
                    warn!(device = %device_id, "device not in inventory");
                    self.tracker.record_outcome(
                        job_id,
                        DeviceOutcome::all_failed(
                            device_id,
                            data_types.iter(),
                            FailureKind::NotFound,
                            "device not in inventory",
                        ),
                    );
                }
            }
        }
        Ok(resolved)
    }
}

impl std::fmt::Debug for DiscoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryOrchestrator")
            .field("tracker", &self.inner.tracker)
            .field("available_permits", &self.inner.pool.available_permits())
            .finish()
    }
}
