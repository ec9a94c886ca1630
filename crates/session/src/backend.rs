use {anyhow::Result, async_trait::async_trait, clipbot_media::MediaRef, tokio::sync::mpsc};

/// A validated unit of work handed to the processing backend.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub session_key: String,
    /// The command fragment, verbatim (e.g. "sc", "clip").
    pub command: String,
    pub media: MediaRef,
    /// Duration probed during validation, so the backend never re-probes.
    pub duration_seconds: f64,
}

/// Incremental updates a backend reports while running.
#[derive(Debug, Clone, Copy)]
pub enum BackendUpdate {
    /// Cost accrued since the previous update. Applied to the session's
    /// budget and checked against the ceiling before completion lands.
    Cost(f64),
}

/// The costed processing executor (AI call, rendering, upload).
///
/// Invoked only after the validation gate has passed. `Ok(())` becomes a
/// SUCCESS event, `Err` a FAIL event; cost deltas stream through `updates`
/// while the job runs.
#[async_trait]
pub trait ProcessingBackend: Send + Sync {
    async fn run(&self, job: ProcessingJob, updates: mpsc::Sender<BackendUpdate>) -> Result<()>;
}
