//! Error types for discovery operations.
//!
//! [`TransportError`] is what a [`DeviceTransport`](crate::DeviceTransport)
//! reports for one command. It is recorded per data-type and never crosses
//! the worker boundary. [`DiscoveryError`] is what submission, polling and
//! cancellation return to the caller.

use crate::job::{JobId, JobState};
use netdisc_types::{DeviceId, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Classification of a failed device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The command did not answer within the per-call timeout.
    Timeout,
    /// Credentials were rejected.
    Auth,
    /// The device does not understand the command.
    Unsupported,
    /// The session could not be established or was reset.
    Connection,
}

impl TransportErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Auth => "auth",
            TransportErrorKind::Unsupported => "unsupported",
            TransportErrorKind::Connection => "connection",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed device command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unsupported, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    /// Returns true if the command may succeed when retried.
    ///
    /// Timeouts and connection failures are transient; authentication and
    /// unsupported-command failures are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout | TransportErrorKind::Connection
        )
    }
}

/// Errors surfaced to callers of the orchestrator and job tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Submission named no devices.
    #[error("discovery request names no devices")]
    EmptyRequest,

    /// Submission named no data-types.
    #[error("discovery request names no data types")]
    NoDataTypes,

    /// Submission carried a malformed identifier or data-type name.
    #[error("invalid discovery request: {0}")]
    InvalidRequest(#[from] ParseError),

    /// Requested devices are held by a job that has not settled.
    #[error("devices already under discovery by job {job_id}: {}", format_devices(.devices))]
    DevicesBusy {
        job_id: JobId,
        devices: Vec<DeviceId>,
    },

    /// No job with this id (never existed or pruned).
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// The job already reached a terminal state.
    #[error("job {job_id} already {state}")]
    AlreadyTerminal { job_id: JobId, state: JobState },

    /// Blocking jobs run on the caller's context and cannot be cancelled.
    #[error("job {0} runs in blocking mode and cannot be cancelled")]
    NotCancellable(JobId),

    /// The device inventory backend failed.
    #[error("inventory error: {message}")]
    Inventory { message: String },

    /// Configuration could not be read or is invalid.
    #[error("invalid configuration for {field}: {message}")]
    Config { field: String, message: String },
}

fn format_devices(devices: &[DeviceId]) -> String {
    devices
        .iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl DiscoveryError {
    /// Creates an inventory error.
    pub fn inventory(message: impl Into<String>) -> Self {
        Self::Inventory {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if the request may be accepted when resubmitted later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::DevicesBusy { .. } | DiscoveryError::Inventory { .. }
        )
    }
}
