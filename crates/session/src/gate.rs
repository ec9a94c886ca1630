//! Validation gate: the checks a request must pass before cost may accrue.
//!
//! The checks are ordered and short-circuit: byte size first, then the
//! external duration probe. An oversized attachment is rejected without
//! ever invoking the probe, so structurally invalid input incurs no cost.

use {
    clipbot_config::schema::ValidationConfig,
    clipbot_media::{DurationProbe, MediaRef},
    tracing::debug,
};

/// Why the gate refused a request.
#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    TooLarge { size_bytes: u64, limit_bytes: u64 },
    TooLong { duration_seconds: f64, limit_seconds: f64 },
    ProbeFailed { reason: String },
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge {
                size_bytes,
                limit_bytes,
            } => write!(
                f,
                "attachment is {size_bytes} bytes, over the {limit_bytes} byte limit"
            ),
            Self::TooLong {
                duration_seconds,
                limit_seconds,
            } => write!(
                f,
                "media runs {duration_seconds:.1}s, over the {limit_seconds:.1}s limit"
            ),
            Self::ProbeFailed { reason } => write!(f, "could not read the media: {reason}"),
        }
    }
}

/// Check the attachment against the configured limits.
///
/// Returns the probed duration on pass so the backend never re-probes.
pub async fn check_media(
    media: &MediaRef,
    limits: &ValidationConfig,
    probe: &dyn DurationProbe,
) -> Result<f64, GateRejection> {
    if media.size_bytes > limits.max_file_size_bytes {
        debug!(
            size_bytes = media.size_bytes,
            limit_bytes = limits.max_file_size_bytes,
            "gate: attachment too large"
        );
        return Err(GateRejection::TooLarge {
            size_bytes: media.size_bytes,
            limit_bytes: limits.max_file_size_bytes,
        });
    }

    let duration_seconds = probe
        .probe(&media.locator)
        .await
        .map_err(|e| GateRejection::ProbeFailed {
            reason: e.to_string(),
        })?;

    if duration_seconds > limits.max_duration_seconds {
        debug!(
            duration_seconds,
            limit_seconds = limits.max_duration_seconds,
            "gate: media too long"
        );
        return Err(GateRejection::TooLong {
            duration_seconds,
            limit_seconds: limits.max_duration_seconds,
        });
    }

    Ok(duration_seconds)
}
