//! Duration probe backed by the `ffprobe` CLI.

use std::{process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::error::{Context, Error, Result};

/// Default binary name, resolved from `PATH`.
const BINARY_NAME: &str = "ffprobe";

/// Probes a media locator for its duration in seconds.
///
/// Implementations must treat every internal failure as an `Err`; callers
/// route those through validation failure, so a probe must never panic or
/// block indefinitely.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, locator: &str) -> Result<f64>;
}

/// `DurationProbe` that shells out to ffprobe and parses its JSON output.
#[derive(Clone, Debug)]
pub struct FfprobeProbe {
    binary: String,
    timeout: Duration,
}

impl FfprobeProbe {
    #[must_use]
    pub fn new(binary: Option<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| BINARY_NAME.to_string()),
            timeout,
        }
    }

    /// Check that the probe binary is runnable. Used by `clipbot doctor`.
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|_| Error::probe_unavailable(&self.binary))?;

        if !output.status.success() {
            return Err(Error::probe_failed(
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl DurationProbe for FfprobeProbe {
    async fn probe(&self, locator: &str) -> Result<f64> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", "error", "-show_entries", "format=duration"]);
        cmd.args(["-print_format", "json"]);
        cmd.arg(locator);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!(locator, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                Error::ProbeTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            })?
            .map_err(|_| Error::probe_unavailable(&self.binary))?;

        if !output.status.success() {
            return Err(Error::probe_failed(
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let seconds = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
        debug!(locator, seconds, "probed media duration");
        Ok(seconds)
    }
}

/// Parse `ffprobe -show_entries format=duration -print_format json` output.
fn parse_duration(stdout: &str) -> Result<f64> {
    #[derive(Debug, Default, Deserialize)]
    struct ProbeOutput {
        #[serde(default)]
        format: ProbeFormat,
    }

    #[derive(Debug, Default, Deserialize)]
    struct ProbeFormat {
        // ffprobe emits the duration as a decimal string.
        #[serde(default)]
        duration: Option<String>,
    }

    let parsed: ProbeOutput =
        serde_json::from_str(stdout).context("unparsable ffprobe output")?;
    let raw = parsed
        .format
        .duration
        .context("ffprobe output has no format.duration")?;
    raw.trim()
        .parse::<f64>()
        .context("ffprobe duration is not a number")
}
