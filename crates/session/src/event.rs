use clipbot_media::MediaRef;

/// Everything that can happen to a session.
///
/// External input, timer stages, and backend results all arrive through
/// the same dispatch path as one of these. Timer-originated events carry
/// the epoch of the timer that produced them; a stale epoch means the
/// timer was superseded and the event is dropped.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A command fragment (e.g. "sc" or "clip"), opaque to the core.
    Command(String),
    /// A media fragment: locator plus byte size.
    Media(MediaRef),
    /// First timer stage fired and the armed condition still held.
    TimerWarn { epoch: u64 },
    /// Second timer stage fired: the staged timeout expired.
    Timeout { epoch: u64 },
    /// Processing backend finished successfully.
    Success,
    /// Processing backend failed.
    Fail { reason: String },
    /// Incremental cost accrued by the processing backend.
    CostDelta(f64),
    /// Operator/user request to return a terminal session to IDLE.
    Reset,
}

impl SessionEvent {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Media(_) => "media",
            Self::TimerWarn { .. } => "timer_warn",
            Self::Timeout { .. } => "timeout",
            Self::Success => "success",
            Self::Fail { .. } => "fail",
            Self::CostDelta(_) => "cost_delta",
            Self::Reset => "reset",
        }
    }
}
