//! Configuration validation.
//!
//! The thresholds are independent except for one rule per timer pair:
//! the warning must fire strictly before the timeout.

use crate::schema::ClipbotConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "timeouts.wait_warning_ms".
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        });
    }

    fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
#[must_use]
pub fn validate(cfg: &ClipbotConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_staged_pair(
        &mut result,
        "timeouts.wait_warning_ms",
        cfg.timeouts.wait_warning_ms,
        "timeouts.wait_timeout_ms",
        cfg.timeouts.wait_timeout_ms,
    );
    check_staged_pair(
        &mut result,
        "timeouts.processing_warning_ms",
        cfg.timeouts.processing_warning_ms,
        "timeouts.processing_timeout_ms",
        cfg.timeouts.processing_timeout_ms,
    );

    if cfg.validation.max_file_size_bytes == 0 {
        result.error(
            "validation.max_file_size_bytes",
            "must be positive; every attachment would be rejected",
        );
    }
    if cfg.validation.max_duration_seconds <= 0.0 {
        result.error("validation.max_duration_seconds", "must be positive");
    }
    if cfg.validation.probe_timeout_ms == 0 {
        result.error("validation.probe_timeout_ms", "must be positive");
    }

    if cfg.processing.cost_ceiling <= 0.0 {
        result.error("processing.cost_ceiling", "must be positive");
    }

    if cfg.registry.session_ttl_ms == 0 {
        result.error("registry.session_ttl_ms", "must be positive");
    }
    if cfg.registry.sweep_interval_ms == 0 {
        result.error("registry.sweep_interval_ms", "must be positive");
    }
    if cfg.registry.sweep_interval_ms > cfg.registry.session_ttl_ms {
        result.warning(
            "registry.sweep_interval_ms",
            "longer than session_ttl_ms; idle sessions will linger past their TTL",
        );
    }

    result
}

fn check_staged_pair(
    result: &mut ValidationResult,
    warn_path: &str,
    warn_ms: u64,
    timeout_path: &str,
    timeout_ms: u64,
) {
    if timeout_ms == 0 {
        result.error(timeout_path, "must be positive");
    }
    if warn_ms >= timeout_ms {
        result.error(
            warn_path,
            format!("must be below {timeout_path} ({warn_ms} >= {timeout_ms})"),
        );
    }
}
