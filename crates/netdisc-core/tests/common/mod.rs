//! Shared fixtures for discovery integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use netdisc_cache::MemoryStore;
use netdisc_core::{
    DeviceInfo, DeviceTransport, DiscoveryConfig, DiscoveryOrchestrator, JobTracker,
    StaticInventory, TransportError,
};
use netdisc_types::{DeviceId, DeviceRecord, Platform};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub fn id(s: &str) -> DeviceId {
    DeviceId::new(s).unwrap()
}

pub fn ids(list: &[&str]) -> Vec<DeviceId> {
    list.iter().map(|s| id(s)).collect()
}

/// Canned output for the built-in Cisco IOS commands.
pub fn payload_for(command: &str) -> Value {
    match command {
        "show interfaces" => json!([
            {"interface": "GigabitEthernet0/1", "link_status": "up", "ip_address": "10.0.0.1/24"},
            {"interface": "GigabitEthernet0/2", "link_status": "down"}
        ]),
        "show ip arp" => json!([
            {"address": "10.0.0.2", "mac": "0011.2233.4455", "interface": "GigabitEthernet0/1"},
            {"address": "10.0.0.3", "mac": "0011.2233.4466", "interface": "GigabitEthernet0/1"}
        ]),
        "show ip route static" => json!([{"destination": "0.0.0.0/0", "nexthop_ip": "10.0.0.254"}]),
        "show ip route ospf" => json!([
            {"destination": "10.20.0.0/16", "nexthop_ip": "10.0.0.2", "area": "0", "type": "O"}
        ]),
        "show ip route bgp" => json!([
            {"network": "203.0.113.0/24", "next_hop": "10.0.0.3", "as_path": "65001", "origin": "i"}
        ]),
        "show mac address-table" => json!([
            {"mac": "0011.2233.4455", "vlan": "10", "port": "GigabitEthernet0/1", "type": "DYNAMIC"}
        ]),
        "show cdp neighbors detail" => json!([
            {"local_port": "GigabitEthernet0/1", "destination_host": "peer-1",
             "remote_port": "GigabitEthernet1/0/1", "management_ip": "10.0.0.2"}
        ]),
        _ => json!([]),
    }
}

/// Transport answering from [`payload_for`], with scripted failures.
#[derive(Default)]
pub struct ScriptedTransport {
    /// Every command on the device fails with this error.
    device_failures: Mutex<HashMap<DeviceId, TransportError>>,
    /// One command on one device fails this many times, then succeeds.
    flaky: Mutex<HashMap<(DeviceId, String), (u32, TransportError)>>,
    /// Overrides the canned payload for a command on one device.
    payloads: Mutex<HashMap<(DeviceId, String), Value>>,
    calls: Mutex<Vec<(DeviceId, String)>>,
    /// When set, every call waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
    started: Notify,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when a call returns.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose calls block until [`release`](Self::release).
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn fail_device(&self, device: &str, error: TransportError) {
        self.device_failures.lock().insert(id(device), error);
    }

    pub fn fail_times(&self, device: &str, command: &str, times: u32, error: TransportError) {
        self.flaky
            .lock()
            .insert((id(device), command.to_string()), (times, error));
    }

    pub fn set_payload(&self, device: &str, command: &str, payload: Value) {
        self.payloads
            .lock()
            .insert((id(device), command.to_string()), payload);
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    /// Resolves once a call has been issued.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self) -> Vec<(DeviceId, String)> {
        self.calls.lock().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most calls ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, device: &str) -> usize {
        let device = id(device);
        self.calls.lock().iter().filter(|(d, _)| *d == device).count()
    }
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    async fn execute(&self, device: &DeviceInfo, command: &str) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .push((device.device_id.clone(), command.to_string()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(err) = self.device_failures.lock().get(&device.device_id) {
            return Err(err.clone());
        }

        let key = (device.device_id.clone(), command.to_string());
        {
            let mut flaky = self.flaky.lock();
            if let Some((remaining, err)) = flaky.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
        }

        if let Some(payload) = self.payloads.lock().get(&key) {
            return Ok(payload.clone());
        }
        Ok(payload_for(command))
    }
}

pub fn inventory(devices: &[&str]) -> StaticInventory {
    devices
        .iter()
        .enumerate()
        .map(|(n, name)| {
            DeviceRecord::new(
                id(name),
                name.to_uppercase(),
                format!("192.0.2.{}", n + 1),
                Platform::CiscoIos,
            )
        })
        .collect()
}

pub struct Harness {
    pub orchestrator: DiscoveryOrchestrator,
    pub transport: Arc<ScriptedTransport>,
    pub store: MemoryStore,
    pub tracker: Arc<JobTracker>,
}

pub fn config(max_concurrent_devices: usize) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default();
    config.worker.max_concurrent_devices = max_concurrent_devices;
    config.worker.retry_backoff_ms = 10;
    config.worker.retry_backoff_max_ms = 40;
    config
}

pub fn harness(devices: &[&str], transport: ScriptedTransport, config: DiscoveryConfig) -> Harness {
    let transport = Arc::new(transport);
    let store = MemoryStore::new();
    let tracker = Arc::new(JobTracker::new());
    let orchestrator = DiscoveryOrchestrator::new(
        &config,
        transport.clone(),
        Arc::new(inventory(devices)),
        Arc::new(store.clone()),
        Arc::clone(&tracker),
    )
    .unwrap();

    Harness {
        orchestrator,
        transport,
        store,
        tracker,
    }
}
