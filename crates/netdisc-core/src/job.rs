//! Discovery jobs: requests, lifecycle state and caller-facing snapshots.

use crate::outcome::{DeviceOutcome, DeviceStatus};
use chrono::{DateTime, Utc};
use netdisc_types::{DataTypeSet, DeviceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a discovery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Lifecycle state of a job.
///
/// `pending -> running -> completed`, `pending|running -> cancelled`, and
/// `pending|running -> failed` when orchestration cannot proceed. Terminal
/// states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `submit` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The caller waits until every device has an outcome.
    #[default]
    Blocking,
    /// The caller gets a handle at once; the job runs in the background.
    Queued,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(ExecutionMode::Blocking),
            "queued" => Ok(ExecutionMode::Queued),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Blocking => f.write_str("blocking"),
            ExecutionMode::Queued => f.write_str("queued"),
        }
    }
}

/// A discovery request as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub device_ids: Vec<DeviceId>,
    pub data_types: DataTypeSet,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_cache_results")]
    pub cache_results: bool,
}

fn default_cache_results() -> bool {
    true
}

impl DiscoveryRequest {
    pub fn new(device_ids: Vec<DeviceId>, data_types: DataTypeSet) -> Self {
        Self {
            device_ids,
            data_types,
            mode: ExecutionMode::Blocking,
            cache_results: true,
        }
    }

    pub fn queued(mut self) -> Self {
        self.mode = ExecutionMode::Queued;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_results = false;
        self
    }

    /// Device ids with duplicates removed, first occurrence kept.
    pub fn unique_device_ids(&self) -> Vec<DeviceId> {
        let mut seen = std::collections::HashSet::new();
        self.device_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }
}

/// One discovery job and its per-device outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub job_id: JobId,
    pub mode: ExecutionMode,
    /// Ordered and unique.
    pub requested_device_ids: Vec<DeviceId>,
    pub requested_data_types: DataTypeSet,
    pub cache_results: bool,
    pub state: JobState,
    pub outcomes: HashMap<DeviceId, DeviceOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set once no more work is pending for the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl DiscoveryJob {
    pub fn new(job_id: JobId, request: &DiscoveryRequest) -> Self {
        Self {
            job_id,
            mode: request.mode,
            requested_device_ids: request.unique_device_ids(),
            requested_data_types: request.data_types.clone(),
            cache_results: request.cache_results,
            state: JobState::Pending,
            outcomes: HashMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn total_devices(&self) -> usize {
        self.requested_device_ids.len()
    }

    pub fn completed_devices(&self) -> usize {
        self.outcomes.len()
    }

    /// True once the job is terminal and no device work is outstanding.
    pub fn is_settled(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Requested devices that have no outcome yet, in request order.
    pub fn pending_devices(&self) -> Vec<DeviceId> {
        self.requested_device_ids
            .iter()
            .filter(|id| !self.outcomes.contains_key(*id))
            .cloned()
            .collect()
    }

    fn count(&self, pred: impl Fn(DeviceStatus) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o.status)).count()
    }

    /// Poll response.
    pub fn progress(&self) -> JobProgress {
        let devices = self
            .requested_device_ids
            .iter()
            .map(|id| {
                let status = self
                    .outcomes
                    .get(id)
                    .map_or(DeviceProgress::Pending, |outcome| outcome.status.into());
                (id.clone(), status)
            })
            .collect();

        JobProgress {
            job_id: self.job_id,
            status: self.state,
            total_devices: self.total_devices(),
            completed_devices: self.completed_devices(),
            devices,
        }
    }

    /// Submit response, with per-device detail in request order.
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.job_id,
            status: self.state,
            total_devices: self.total_devices(),
            completed_devices: self.completed_devices(),
            successful_devices: self.count(|s| s.is_successful()),
            failed_devices: self.count(|s| s == DeviceStatus::Failed),
            skipped_devices: self.count(|s| s == DeviceStatus::Skipped),
            error: self.error.clone(),
            devices: self
                .requested_device_ids
                .iter()
                .filter_map(|id| self.outcomes.get(id).cloned())
                .collect(),
        }
    }
}

/// Per-device entry of a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceProgress {
    Pending,
    Succeeded,
    Partial,
    Failed,
    Skipped,
}

impl From<DeviceStatus> for DeviceProgress {
    fn from(status: DeviceStatus) -> Self {
        match status {
            DeviceStatus::Succeeded => DeviceProgress::Succeeded,
            DeviceStatus::Partial => DeviceProgress::Partial,
            DeviceStatus::Failed => DeviceProgress::Failed,
            DeviceStatus::Skipped => DeviceProgress::Skipped,
        }
    }
}

/// Poll response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobState,
    pub total_devices: usize,
    pub completed_devices: usize,
    pub devices: BTreeMap<DeviceId, DeviceProgress>,
}

/// Submit response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobState,
    pub total_devices: usize,
    pub completed_devices: usize,
    pub successful_devices: usize,
    pub failed_devices: usize,
    pub skipped_devices: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub devices: Vec<DeviceOutcome>,
}
