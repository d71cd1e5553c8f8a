//! End-to-end discovery through the orchestrator, tracker, worker and caches.

mod common;

use common::{config, harness, id, ids, ScriptedTransport};
use netdisc_core::{
    DataTypeStatus, DeviceOutcome, DeviceStatus, DiscoveryError, DiscoveryRequest, FailureKind,
    JobState, JobSummary, PayloadSource, SkipReason, TransportError,
};
use netdisc_types::{CacheTable, DataType, DataTypeSet};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn outcome<'a>(summary: &'a JobSummary, device: &str) -> &'a DeviceOutcome {
    summary
        .devices
        .iter()
        .find(|d| d.device_id.as_str() == device)
        .unwrap()
}

fn types(list: &[DataType]) -> DataTypeSet {
    list.iter().copied().collect()
}

#[tokio::test]
async fn all_reachable_devices_succeed_and_are_cached() {
    let h = harness(&["r1", "r2", "r3"], ScriptedTransport::new(), config(4));

    let handle = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r2", "r3"]), DataTypeSet::all()))
        .await
        .unwrap();
    let summary = handle.summary;

    assert_eq!(summary.status, JobState::Completed);
    assert_eq!(summary.total_devices, 3);
    assert_eq!(summary.completed_devices, 3);
    assert_eq!(summary.successful_devices, 3);
    assert_eq!(summary.failed_devices, 0);

    for device in ["r1", "r2", "r3"] {
        let outcome = outcome(&summary, device);
        assert_eq!(outcome.status, DeviceStatus::Succeeded);
        assert!(outcome.data_types.iter().all(|d| d.cached));
        for table in CacheTable::ALL {
            let rows = h
                .orchestrator
                .structured_cache()
                .rows(&id(device), table)
                .await
                .unwrap();
            assert!(!rows.is_empty(), "{} {} empty", device, table);
        }
    }
    assert_eq!(h.store.device_ids(), ids(&["r1", "r2", "r3"]));
}

#[tokio::test]
async fn permanent_auth_failure_is_isolated_to_its_device() {
    let transport = ScriptedTransport::new();
    transport.fail_device("r2", TransportError::auth("Permission denied"));
    let h = harness(&["r1", "r2", "r3"], transport, config(4));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r2", "r3"]), DataTypeSet::all()))
        .await
        .unwrap()
        .summary;

    assert_eq!(summary.status, JobState::Completed);
    assert_eq!(summary.completed_devices, 3);
    assert_eq!(summary.successful_devices, 2);
    assert_eq!(summary.failed_devices, 1);

    let r2 = outcome(&summary, "r2");
    assert_eq!(r2.status, DeviceStatus::Failed);
    for dt in &r2.data_types {
        assert_eq!(dt.status.failure_kind(), Some(FailureKind::Auth));
        assert_eq!(dt.attempts, 1);
    }
    assert_eq!(h.transport.calls_to("r2"), DataType::ALL.len());

    let units = h.store.populated_units();
    assert!(units.iter().all(|(device, _)| *device != id("r2")));
    assert_eq!(units.iter().filter(|(device, _)| *device == id("r1")).count(), 8);
    assert_eq!(units.iter().filter(|(device, _)| *device == id("r3")).count(), 8);
}

#[tokio::test]
async fn queued_job_reports_progress_until_completed() {
    let h = harness(&["r1", "r2"], ScriptedTransport::gated(), config(2));

    let handle = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r2"]), types(&[DataType::Arp])).queued())
        .await
        .unwrap();
    assert_eq!(handle.summary.status, JobState::Pending);

    let progress = h.orchestrator.progress(handle.job_id).unwrap();
    assert!(matches!(progress.status, JobState::Pending | JobState::Running));
    assert!(progress.completed_devices < progress.total_devices);

    h.transport.release(10);
    let summary = h.orchestrator.wait(handle.job_id).await.unwrap();
    assert_eq!(summary.status, JobState::Completed);

    let progress = h.orchestrator.progress(handle.job_id).unwrap();
    assert_eq!(progress.status, JobState::Completed);
    assert_eq!(progress.completed_devices, progress.total_devices);

    // Polling a settled job returns the same snapshot.
    assert_eq!(h.orchestrator.job(handle.job_id).unwrap(), h.orchestrator.job(handle.job_id).unwrap());
}

#[tokio::test]
async fn cancelled_job_finishes_in_flight_work_only() {
    let h = harness(&["r1", "r2", "r3"], ScriptedTransport::gated(), config(1));

    let handle = h
        .orchestrator
        .submit(
            DiscoveryRequest::new(
                ids(&["r1", "r2", "r3"]),
                types(&[DataType::Arp, DataType::MacTable]),
            )
            .queued(),
        )
        .await
        .unwrap();

    h.transport.wait_started().await;
    let progress = h.orchestrator.cancel(handle.job_id).unwrap();
    assert_eq!(progress.status, JobState::Cancelled);

    h.transport.release(10);
    let summary = h.orchestrator.wait(handle.job_id).await.unwrap();

    assert_eq!(summary.status, JobState::Cancelled);
    assert_eq!(summary.completed_devices, summary.total_devices);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    let (started, command) = &calls[0];
    assert_eq!(command, "show ip arp");

    for device in &summary.devices {
        if device.device_id == *started {
            assert!(device.data_type(DataType::Arp).unwrap().status.is_succeeded());
            assert_eq!(
                device.data_type(DataType::MacTable).unwrap().status,
                DataTypeStatus::Skipped {
                    reason: SkipReason::Cancelled
                }
            );
        } else {
            assert_eq!(device.status, DeviceStatus::Skipped);
        }
    }

    assert!(matches!(
        h.orchestrator.cancel(handle.job_id),
        Err(DiscoveryError::AlreadyTerminal {
            state: JobState::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn overlapping_jobs_are_rejected() {
    let h = harness(&["r1", "r2", "r3"], ScriptedTransport::gated(), config(4));

    let first = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r2"]), types(&[DataType::Arp])).queued())
        .await
        .unwrap();

    let err = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r2", "r3"]), types(&[DataType::Arp])))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DiscoveryError::DevicesBusy {
            job_id: first.job_id,
            devices: ids(&["r2"]),
        }
    );
    assert!(err.is_retryable());
    assert_eq!(h.tracker.len(), 1);

    h.transport.release(10);
    h.orchestrator.wait(first.job_id).await.unwrap();

    let second = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r2", "r3"]), types(&[DataType::Arp])).queued())
        .await
        .unwrap();
    h.transport.release(10);
    let summary = h.orchestrator.wait(second.job_id).await.unwrap();
    assert_eq!(summary.successful_devices, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_submissions_admit_one_job() {
    let h = harness(&["r1"], ScriptedTransport::gated(), config(4));

    let submissions: Vec<_> = (0..16)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .submit(DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Arp])).queued())
                    .await
            })
        })
        .collect();

    let mut admitted = Vec::new();
    let mut rejected = Vec::new();
    for submission in submissions {
        match submission.await.unwrap() {
            Ok(handle) => admitted.push(handle.job_id),
            Err(e) => rejected.push(e),
        }
    }

    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected.len(), 15);
    for err in rejected {
        assert_eq!(
            err,
            DiscoveryError::DevicesBusy {
                job_id: admitted[0],
                devices: ids(&["r1"]),
            }
        );
    }

    h.transport.release(10);
    h.orchestrator.wait(admitted[0]).await.unwrap();
    assert_eq!(h.transport.calls_to("r1"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn device_pool_bounds_commands_in_flight() {
    let devices = ["r1", "r2", "r3", "r4", "r5"];
    let h = harness(&devices, ScriptedTransport::gated(), config(2));

    let handle = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&devices), types(&[DataType::Arp])).queued())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.transport.calls().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // The other devices wait for a pool permit, not for the transport.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.calls().len(), 2);
    assert_eq!(h.transport.in_flight(), 2);

    for _ in &devices {
        h.transport.release(1);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(h.transport.in_flight() <= 2);
    }
    let summary = h.orchestrator.wait(handle.job_id).await.unwrap();

    assert_eq!(summary.successful_devices, 5);
    assert_eq!(h.transport.calls().len(), 5);
    assert_eq!(h.transport.peak_in_flight(), 2);
}

#[tokio::test]
async fn unknown_device_fails_with_not_found() {
    let h = harness(&["r1"], ScriptedTransport::new(), config(4));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "ghost"]), types(&[DataType::Arp, DataType::BgpRoutes])))
        .await
        .unwrap()
        .summary;

    assert_eq!(summary.status, JobState::Completed);
    assert_eq!(summary.completed_devices, 2);
    assert_eq!(summary.failed_devices, 1);

    let ghost = outcome(&summary, "ghost");
    assert!(ghost
        .data_types
        .iter()
        .all(|d| d.status.failure_kind() == Some(FailureKind::NotFound)));
    assert_eq!(h.transport.calls_to("ghost"), 0);
    assert_eq!(h.store.device_ids(), ids(&["r1"]));
}

#[tokio::test]
async fn repeated_discovery_replaces_rows() {
    let h = harness(&["r1"], ScriptedTransport::new(), config(4));
    let request = DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Interfaces, DataType::Arp]));
    let cache = h.orchestrator.structured_cache();

    h.orchestrator.submit(request.clone()).await.unwrap();
    let interfaces = cache.rows(&id("r1"), CacheTable::Interfaces).await.unwrap();
    let arp = cache.rows(&id("r1"), CacheTable::ArpEntries).await.unwrap();

    let summary = h.orchestrator.submit(request).await.unwrap().summary;
    assert_eq!(cache.rows(&id("r1"), CacheTable::Interfaces).await.unwrap(), interfaces);
    assert_eq!(cache.rows(&id("r1"), CacheTable::ArpEntries).await.unwrap(), arp);
    assert_eq!(arp.len(), 2);

    // The second run is served from the fresh raw entries.
    let r1 = outcome(&summary, "r1");
    assert!(r1
        .data_types
        .iter()
        .all(|d| d.source == Some(PayloadSource::RawCache) && d.attempts == 0));
    assert_eq!(h.transport.calls().len(), 2);
}

#[tokio::test]
async fn device_record_failure_prevents_child_rows() {
    let h = harness(&["r1", "r2"], ScriptedTransport::new(), config(4));
    h.store.fail_device_records(&id("r2"));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r2"]), DataTypeSet::all()))
        .await
        .unwrap()
        .summary;

    assert_eq!(summary.successful_devices, 2);
    let r2 = outcome(&summary, "r2");
    assert!(r2.record_error.is_some());
    assert!(r2.data_types.iter().all(|d| d.status.is_succeeded() && !d.cached));

    let records = h.store.device_ids();
    for (device, _) in h.store.populated_units() {
        assert!(records.contains(&device));
    }
    assert_eq!(records, ids(&["r1"]));
    assert!(!h.store.is_poisoned());
}

#[tokio::test]
async fn cache_write_failure_is_scoped_to_one_table() {
    let h = harness(&["r1"], ScriptedTransport::new(), config(4));
    h.store.fail_writes(&id("r1"), CacheTable::Interfaces);

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Interfaces, DataType::Arp])))
        .await
        .unwrap()
        .summary;

    let r1 = outcome(&summary, "r1");
    assert_eq!(r1.status, DeviceStatus::Succeeded);
    let interfaces = r1.data_type(DataType::Interfaces).unwrap();
    assert!(interfaces.status.is_succeeded());
    assert!(!interfaces.cached);
    assert!(interfaces.cache_error.is_some());
    assert!(r1.data_type(DataType::Arp).unwrap().cached);

    assert_eq!(
        h.store.populated_units(),
        vec![
            (id("r1"), CacheTable::IpAddresses),
            (id("r1"), CacheTable::ArpEntries),
        ]
    );
    assert!(!h.store.is_poisoned());
}

#[tokio::test]
async fn disabled_caching_still_returns_rows() {
    let h = harness(&["r1"], ScriptedTransport::new(), config(4));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Arp])).without_cache())
        .await
        .unwrap()
        .summary;

    let arp = outcome(&summary, "r1").data_type(DataType::Arp).unwrap();
    assert!(arp.status.is_succeeded());
    assert_eq!(arp.rows.len(), 2);
    assert!(!arp.cached);
    assert!(h.store.device_ids().is_empty());
    assert!(h.orchestrator.raw_cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_then_recorded() {
    let transport = ScriptedTransport::new();
    transport.fail_times("r1", "show ip arp", 2, TransportError::timeout("no answer"));
    transport.fail_times("r1", "show mac address-table", 5, TransportError::connection("reset"));
    let h = harness(&["r1"], transport, config(4));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Arp, DataType::MacTable])))
        .await
        .unwrap()
        .summary;

    let r1 = outcome(&summary, "r1");
    assert_eq!(r1.status, DeviceStatus::Partial);
    let arp = r1.data_type(DataType::Arp).unwrap();
    assert!(arp.status.is_succeeded());
    assert_eq!(arp.attempts, 3);
    let mac = r1.data_type(DataType::MacTable).unwrap();
    assert_eq!(mac.status.failure_kind(), Some(FailureKind::Connection));
    assert_eq!(mac.attempts, 3);
    assert_eq!(summary.successful_devices, 1);
}

#[tokio::test]
async fn invalid_requests_fail_at_submission() {
    let h = harness(&["r1"], ScriptedTransport::new(), config(4));

    assert_eq!(
        h.orchestrator
            .submit(DiscoveryRequest::new(Vec::new(), DataTypeSet::all()))
            .await
            .unwrap_err(),
        DiscoveryError::EmptyRequest
    );
    assert_eq!(
        h.orchestrator
            .submit(DiscoveryRequest::new(ids(&["r1"]), DataTypeSet::new()))
            .await
            .unwrap_err(),
        DiscoveryError::NoDataTypes
    );
    assert!(h.tracker.is_empty());
}

#[tokio::test]
async fn duplicate_devices_collapse_to_one_worker() {
    let h = harness(&["r1", "r2"], ScriptedTransport::new(), config(4));

    let summary = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1", "r1", "r2", "r1"]), types(&[DataType::Arp])))
        .await
        .unwrap()
        .summary;

    assert_eq!(summary.total_devices, 2);
    assert_eq!(summary.completed_devices, 2);
    assert_eq!(h.transport.calls_to("r1"), 1);
}

#[tokio::test]
async fn settled_jobs_are_pruned_after_retention() {
    let mut cfg = config(4);
    cfg.jobs.retention_secs = 0;
    let h = harness(&["r1"], ScriptedTransport::new(), cfg);

    let handle = h
        .orchestrator
        .submit(DiscoveryRequest::new(ids(&["r1"]), types(&[DataType::Arp])))
        .await
        .unwrap();
    assert_eq!(h.orchestrator.prune_expired(), 1);
    assert_eq!(
        h.orchestrator.progress(handle.job_id).unwrap_err(),
        DiscoveryError::JobNotFound(handle.job_id)
    );
}
