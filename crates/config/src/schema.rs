//! Config schema types (timeouts, validation limits, processing, registry).
//!
//! All durations are plain milliseconds so the file format stays a flat set
//! of numeric thresholds. The only cross-field constraint is that each
//! warning threshold is below its matching timeout (checked in `validate`).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipbotConfig {
    pub timeouts: TimeoutConfig,
    pub validation: ValidationConfig,
    pub processing: ProcessingConfig,
    pub registry: RegistryConfig,
}

/// Staged timeout thresholds for the two session guard timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a session may sit in WAITING before the "getting close"
    /// notification is sent.
    pub wait_warning_ms: u64,
    /// How long a session may sit in WAITING before it times out to IDLE.
    pub wait_timeout_ms: u64,
    /// How long a job may run before the slow-processing notification.
    pub processing_warning_ms: u64,
    /// How long a job may run before it is aborted with an error.
    pub processing_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wait_warning_ms: 30_000,
            wait_timeout_ms: 60_000,
            processing_warning_ms: 240_000,
            processing_timeout_ms: 300_000,
        }
    }
}

/// Attachment limits applied by the validation gate before any cost accrues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum attachment size in bytes. Checked before the duration probe
    /// so oversized files never incur a probe.
    pub max_file_size_bytes: u64,
    /// Maximum probed media duration in seconds.
    pub max_duration_seconds: f64,
    /// How long the external probe may run before it counts as failed.
    pub probe_timeout_ms: u64,
    /// Path to the ffprobe binary. Resolved from `PATH` when unset.
    pub ffprobe_path: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 25 * 1024 * 1024,
            max_duration_seconds: 180.0,
            probe_timeout_ms: 10_000,
            ffprobe_path: None,
        }
    }
}

/// Processing cost controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum accumulated cost per session before the job is aborted
    /// with COST_EXCEEDED. Checked reactively as deltas arrive.
    pub cost_ceiling: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { cost_ceiling: 0.50 }
    }
}

/// Session registry lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Sessions idle longer than this are destroyed by the sweep,
    /// regardless of state.
    pub session_ttl_ms: u64,
    /// Interval between sweep passes.
    pub sweep_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: 1_800_000,
            sweep_interval_ms: 60_000,
        }
    }
}
