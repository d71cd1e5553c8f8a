//! Device transport that runs each command through a shell template.
//!
//! The template is rendered with `{address}`, `{device}` and `{command}`
//! (each shell-quoted) and executed with `/bin/sh -c`. The command is
//! expected to print the parsed output as JSON on stdout.
//!
//! ```ignore
//! let transport = ShellTransport::new("ssh -o BatchMode=yes {address} {command}", timeout)?;
//! let rows = transport.execute(&device, "show ip arp").await?;
//! ```

use crate::error::{DiscoveryError, TransportError};
use crate::inventory::DeviceInfo;
use crate::transport::DeviceTransport;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(address|device|command)\}").expect("Invalid regex pattern"));

static AUTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)permission denied|authentication|access denied|login incorrect")
        .expect("Invalid regex pattern")
});

static UNSUPPORTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)invalid input|unknown command|not supported|unrecognized command")
        .expect("Invalid regex pattern")
});

/// Quotes a string for safe use inside a shell command line.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Maps a failed command's exit code and stderr to a transport error.
///
/// Anything not recognizably an authentication or unsupported-command
/// failure (including `ssh` exit 255 and connection refused/reset) is a
/// connection failure.
pub fn classify_failure(exit_code: i32, stderr: &str) -> TransportError {
    let message = if stderr.is_empty() {
        format!("exit code {}", exit_code)
    } else {
        stderr.to_string()
    };

    if AUTH_RE.is_match(stderr) {
        TransportError::auth(message)
    } else if UNSUPPORTED_RE.is_match(stderr) {
        TransportError::unsupported(message)
    } else {
        TransportError::connection(message)
    }
}

/// [`DeviceTransport`] backed by an external command.
#[derive(Debug, Clone)]
pub struct ShellTransport {
    template: String,
    timeout: Duration,
}

impl ShellTransport {
    /// Creates a transport from a command template.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the template lacks `{command}`.
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
        let template = template.into();
        if !template.contains("{command}") {
            return Err(DiscoveryError::config(
                "transport.command_template",
                "template must contain {command}",
            ));
        }
        Ok(Self { template, timeout })
    }

    /// Renders the shell command line for one device command.
    ///
    /// Placeholders are substituted in one pass, so placeholder text inside
    /// a substituted value is left alone.
    pub fn render(&self, device: &DeviceInfo, command: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &Captures<'_>| match &caps[1] {
                "address" => shellquote(&device.primary_address),
                "device" => shellquote(device.device_id.as_str()),
                _ => shellquote(command),
            })
            .into_owned()
    }
}

#[async_trait]
impl DeviceTransport for ShellTransport {
    async fn execute(&self, device: &DeviceInfo, command: &str) -> Result<Value, TransportError> {
        let cmd = self.render(device, command);
        debug!(device = %device.device_id, command = %cmd, "Executing device command");

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TransportError::connection(format!(
                    "failed to spawn '{}': {}",
                    cmd, e
                )))
            }
            Err(_) => {
                return Err(TransportError::timeout(format!(
                    "'{}' did not finish within {:?}",
                    command, self.timeout
                )))
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                device = %device.device_id,
                command,
                exit_code,
                stderr = %stderr,
                "Device command failed"
            );
            return Err(classify_failure(exit_code, &stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            TransportError::unsupported(format!("'{}' produced non-JSON output: {}", command, e))
        })
    }
}
