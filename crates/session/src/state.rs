//! The per-conversation session state machine.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    clipbot_config::ClipbotConfig,
    clipbot_media::{DurationProbe, MediaRef},
    tokio::sync::{Mutex, mpsc},
    tracing::{debug, info, warn},
};

use crate::{
    backend::{BackendUpdate, ProcessingBackend, ProcessingJob},
    event::SessionEvent,
    gate,
    notify::Notifier,
    now_ms,
    timer::{GuardTimer, StageFn, StillValidFn},
};

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Waiting,
    Processing,
    Done,
    Error,
    CostExceeded,
}

impl SessionState {
    /// Terminal states are left only via RESET.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::CostExceeded)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::CostExceeded => "cost_exceeded",
        };
        write!(f, "{name}")
    }
}

/// Which staged timer a session is arming.
#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Waiting,
    Processing,
}

/// Point-in-time copy of a session's mutable fields, for inspection.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_cost: f64,
    pub pending_command: Option<String>,
    pub pending_media: Option<MediaRef>,
    pub timer_active: bool,
}

/// Fields mutated only under the session lock, one transition at a time.
struct SessionInner {
    state: SessionState,
    pending_command: Option<String>,
    pending_media: Option<MediaRef>,
    session_cost: f64,
    /// At most one live guard timer; arming a new one cancels the old.
    timer: Option<GuardTimer>,
    /// Bumped on every arm; timer events carrying an older epoch are stale.
    timer_epoch: u64,
    /// Suppresses a duplicate warning within one timer lifetime.
    warned: bool,
}

/// One conversation's state machine.
///
/// All mutation goes through [`Session::dispatch`] under the inner lock;
/// `last_active_ms` lives outside the lock so the registry sweep can read
/// it without contending with an in-flight transition.
pub struct Session {
    key: String,
    last_active_ms: AtomicU64,
    inner: Mutex<SessionInner>,
    config: Arc<ClipbotConfig>,
    notifier: Arc<dyn Notifier>,
    probe: Arc<dyn DurationProbe>,
    backend: Arc<dyn ProcessingBackend>,
}

impl Session {
    pub fn new(
        key: impl Into<String>,
        config: Arc<ClipbotConfig>,
        notifier: Arc<dyn Notifier>,
        probe: Arc<dyn DurationProbe>,
        backend: Arc<dyn ProcessingBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            last_active_ms: AtomicU64::new(now_ms()),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                pending_command: None,
                pending_media: None,
                session_cost: 0.0,
                timer: None,
                timer_epoch: 0,
                warned: false,
            }),
            config,
            notifier,
            probe,
            backend,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last accepted-event timestamp, readable without the session lock.
    #[must_use]
    pub fn last_active_ms(&self) -> u64 {
        self.last_active_ms.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            state: inner.state,
            session_cost: inner.session_cost,
            pending_command: inner.pending_command.clone(),
            pending_media: inner.pending_media.clone(),
            timer_active: inner.timer.is_some(),
        }
    }

    /// Cancel any live timer. Called by the registry before removal.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
    }

    /// Apply one event. Events not legal for the current state are logged
    /// and ignored without touching state or `last_active`.
    pub async fn dispatch(self: &Arc<Self>, event: SessionEvent) {
        let mut inner = self.inner.lock().await;
        debug!(key = %self.key, state = %inner.state, event = event.name(), "dispatch");
        match event {
            SessionEvent::Command(text) => {
                self.on_fragment(&mut inner, Some(text), None).await;
            },
            SessionEvent::Media(media) => {
                self.on_fragment(&mut inner, None, Some(media)).await;
            },
            SessionEvent::TimerWarn { epoch } => self.on_timer_warn(&mut inner, epoch).await,
            SessionEvent::Timeout { epoch } => self.on_timeout(&mut inner, epoch).await,
            SessionEvent::Success => self.on_completion(&mut inner, Ok(())).await,
            SessionEvent::Fail { reason } => self.on_completion(&mut inner, Err(reason)).await,
            SessionEvent::CostDelta(delta) => self.on_cost_delta(&mut inner, delta).await,
            SessionEvent::Reset => self.on_reset(&mut inner).await,
        }
    }

    // ── Transition handlers (run under the inner lock) ──────────────────

    async fn on_fragment(
        self: &Arc<Self>,
        inner: &mut SessionInner,
        command: Option<String>,
        media: Option<MediaRef>,
    ) {
        match inner.state {
            SessionState::Idle => {
                record_fragment(inner, command, media);
                inner.state = SessionState::Waiting;
                self.arm_timer(inner, TimerKind::Waiting);
                self.touch();
                info!(key = %self.key, "session waiting for remaining input");
            },
            SessionState::Waiting => {
                record_fragment(inner, command, media);
                if inner.pending_command.is_some() && inner.pending_media.is_some() {
                    self.clear_timer(inner);
                    self.touch();
                    self.try_start_processing(inner).await;
                } else {
                    // Duplicate or still-insufficient fragment: stay in
                    // WAITING with a fresh timer.
                    self.arm_timer(inner, TimerKind::Waiting);
                    self.touch();
                    debug!(key = %self.key, "fragment recorded, still waiting");
                }
            },
            state => self.reject(state, "input fragment"),
        }
    }

    /// Run the validation gate and enter PROCESSING or ERROR.
    async fn try_start_processing(self: &Arc<Self>, inner: &mut SessionInner) {
        let command = inner.pending_command.clone().unwrap_or_default();
        let Some(media) = inner.pending_media.clone() else {
            return;
        };

        match gate::check_media(&media, &self.config.validation, self.probe.as_ref()).await {
            Ok(duration_seconds) => {
                inner.state = SessionState::Processing;
                self.arm_timer(inner, TimerKind::Processing);
                info!(
                    key = %self.key,
                    command = %command,
                    duration_seconds,
                    "validation passed, processing started"
                );
                self.spawn_backend(ProcessingJob {
                    session_key: self.key.clone(),
                    command,
                    media,
                    duration_seconds,
                });
                self.notify("on it — processing your clip").await;
            },
            Err(rejection) => {
                // Cost is never incremented on a gate failure.
                inner.state = SessionState::Error;
                warn!(key = %self.key, rejection = %rejection, "validation failed");
                self.notify(&rejection.to_string()).await;
            },
        }
    }

    async fn on_timer_warn(&self, inner: &mut SessionInner, epoch: u64) {
        if epoch != inner.timer_epoch || inner.warned {
            debug!(key = %self.key, epoch, "stale or duplicate warning ignored");
            return;
        }
        let text = match inner.state {
            SessionState::Waiting => "still waiting for the rest of your request — it times out soon",
            SessionState::Processing => "still working on it — this is taking longer than usual",
            _ => return,
        };
        inner.warned = true;
        // A warning is not an accepted input event; last_active is untouched.
        self.notify(text).await;
    }

    async fn on_timeout(&self, inner: &mut SessionInner, epoch: u64) {
        if epoch != inner.timer_epoch {
            debug!(key = %self.key, epoch, current = inner.timer_epoch, "stale timeout ignored");
            return;
        }
        match inner.state {
            SessionState::Waiting => {
                self.clear_timer(inner);
                inner.pending_command = None;
                inner.pending_media = None;
                inner.session_cost = 0.0;
                inner.state = SessionState::Idle;
                info!(key = %self.key, "waiting timed out, back to idle");
                self.notify("timed out waiting for input — send the command and clip together")
                    .await;
                self.touch();
            },
            SessionState::Processing => {
                self.clear_timer(inner);
                inner.pending_command = None;
                inner.pending_media = None;
                inner.state = SessionState::Error;
                warn!(key = %self.key, "processing timed out");
                self.notify("processing timed out — use reset to try again").await;
                self.touch();
            },
            state => self.reject(state, "timeout"),
        }
    }

    async fn on_completion(&self, inner: &mut SessionInner, result: Result<(), String>) {
        if inner.state != SessionState::Processing {
            self.reject(inner.state, if result.is_ok() { "success" } else { "fail" });
            return;
        }
        self.clear_timer(inner);
        inner.pending_command = None;
        inner.pending_media = None;
        match result {
            Ok(()) => {
                inner.state = SessionState::Done;
                info!(key = %self.key, cost = inner.session_cost, "processing finished");
                self.notify("done — your clip is ready").await;
            },
            Err(reason) => {
                inner.state = SessionState::Error;
                warn!(key = %self.key, reason = %reason, "processing failed");
                self.notify(&format!("processing failed: {reason}")).await;
            },
        }
        self.touch();
    }

    async fn on_cost_delta(&self, inner: &mut SessionInner, delta: f64) {
        if inner.state != SessionState::Processing {
            self.reject(inner.state, "cost_delta");
            return;
        }
        // The accumulator never decreases while processing.
        inner.session_cost += delta.max(0.0);
        self.touch();
        let ceiling = self.config.processing.cost_ceiling;
        if inner.session_cost > ceiling {
            self.clear_timer(inner);
            inner.pending_command = None;
            inner.pending_media = None;
            inner.state = SessionState::CostExceeded;
            warn!(
                key = %self.key,
                cost = inner.session_cost,
                ceiling,
                "cost ceiling exceeded, aborting"
            );
            self.notify("stopped — this request ran past its cost budget")
                .await;
        }
    }

    async fn on_reset(&self, inner: &mut SessionInner) {
        if !inner.state.is_terminal() {
            self.reject(inner.state, "reset");
            return;
        }
        self.clear_timer(inner);
        inner.pending_command = None;
        inner.pending_media = None;
        inner.session_cost = 0.0;
        inner.state = SessionState::Idle;
        info!(key = %self.key, "session reset");
        self.notify("ready for a new request").await;
        self.touch();
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn touch(&self) {
        // fetch_max keeps last_active monotone even if a stale caller races.
        self.last_active_ms.fetch_max(now_ms(), Ordering::SeqCst);
    }

    fn reject(&self, state: SessionState, event: &str) {
        debug!(key = %self.key, state = %state, event, "event not legal in current state, ignored");
    }

    fn clear_timer(&self, inner: &mut SessionInner) {
        if let Some(timer) = inner.timer.take() {
            timer.cancel();
        }
    }

    /// Arm the staged timer for `kind`, cancelling any previous timer.
    /// Stage callbacks post events back through `dispatch` rather than
    /// mutating session fields directly.
    fn arm_timer(self: &Arc<Self>, inner: &mut SessionInner, kind: TimerKind) {
        self.clear_timer(inner);
        inner.timer_epoch += 1;
        inner.warned = false;
        let epoch = inner.timer_epoch;

        let timeouts = &self.config.timeouts;
        let (warning_ms, timeout_ms, armed_state) = match kind {
            TimerKind::Waiting => (
                timeouts.wait_warning_ms,
                timeouts.wait_timeout_ms,
                SessionState::Waiting,
            ),
            TimerKind::Processing => (
                timeouts.processing_warning_ms,
                timeouts.processing_timeout_ms,
                SessionState::Processing,
            ),
        };

        let still_valid: StillValidFn = {
            let weak = Arc::downgrade(self);
            Box::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(session) => {
                            let inner = session.inner.lock().await;
                            inner.state == armed_state && inner.timer_epoch == epoch
                        },
                        None => false,
                    }
                })
            })
        };

        inner.timer = Some(GuardTimer::start(
            Duration::from_millis(warning_ms),
            Duration::from_millis(timeout_ms.saturating_sub(warning_ms)),
            still_valid,
            stage_event(Arc::downgrade(self), SessionEvent::TimerWarn { epoch }),
            stage_event(Arc::downgrade(self), SessionEvent::Timeout { epoch }),
        ));
    }

    /// Run the backend in its own task, forwarding cost updates and the
    /// final outcome back through `dispatch`. Holds only a weak reference:
    /// a swept session drops the job on the floor.
    fn spawn_backend(self: &Arc<Self>, job: ProcessingJob) {
        let weak = Arc::downgrade(self);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(16);
            let mut run = Box::pin(backend.run(job, tx));
            let result = loop {
                tokio::select! {
                    biased;
                    Some(update) = rx.recv() => {
                        let BackendUpdate::Cost(delta) = update;
                        match weak.upgrade() {
                            Some(session) => {
                                session.dispatch(SessionEvent::CostDelta(delta)).await;
                            },
                            None => return,
                        }
                    },
                    result = &mut run => break result,
                }
            };

            // Drain cost reported in the same poll as completion, so the
            // ceiling check always lands before SUCCESS/FAIL does.
            while let Some(BackendUpdate::Cost(delta)) = rx.recv().await {
                match weak.upgrade() {
                    Some(session) => session.dispatch(SessionEvent::CostDelta(delta)).await,
                    None => return,
                }
            }

            let event = match result {
                Ok(()) => SessionEvent::Success,
                Err(e) => SessionEvent::Fail {
                    reason: e.to_string(),
                },
            };
            if let Some(session) = weak.upgrade() {
                session.dispatch(event).await;
            }
        });
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.notifier.send(&self.key, text).await {
            warn!(key = %self.key, error = %e, "failed to send notification");
        }
    }
}

/// Build a timer stage callback that posts `event` back through dispatch.
fn stage_event(weak: Weak<Session>, event: SessionEvent) -> StageFn {
    Box::new(move || {
        Box::pin(async move {
            if let Some(session) = weak.upgrade() {
                session.dispatch(event).await;
            }
        })
    })
}

fn record_fragment(inner: &mut SessionInner, command: Option<String>, media: Option<MediaRef>) {
    if let Some(text) = command {
        inner.pending_command = Some(text);
    }
    if let Some(media) = media {
        inner.pending_media = Some(media);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use {anyhow::anyhow, async_trait::async_trait, rstest::rstest};

    use super::*;

    // ── Test doubles ─────────────────────────────────────────────────────

    struct RecordingNotifier {
        sent: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn count_containing(&self, needle: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, _session_key: &str, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct CountingProbe {
        calls: AtomicUsize,
        result: Result<f64, String>,
    }

    impl CountingProbe {
        fn ok(duration: f64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(duration),
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(reason.to_string()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DurationProbe for CountingProbe {
        async fn probe(&self, _locator: &str) -> clipbot_media::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(d) => Ok(*d),
                Err(msg) => Err(clipbot_media::Error::probe_failed(msg.clone())),
            }
        }
    }

    /// Backend that never finishes within a test: the session sits in
    /// PROCESSING until a timer or the test intervenes.
    struct StallBackend;

    #[async_trait]
    impl ProcessingBackend for StallBackend {
        async fn run(
            &self,
            _job: ProcessingJob,
            _updates: mpsc::Sender<BackendUpdate>,
        ) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    /// Backend that emits the scripted cost deltas, then the scripted result.
    struct ScriptBackend {
        deltas: Vec<f64>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl ProcessingBackend for ScriptBackend {
        async fn run(
            &self,
            _job: ProcessingJob,
            updates: mpsc::Sender<BackendUpdate>,
        ) -> anyhow::Result<()> {
            for delta in &self.deltas {
                let _ = updates.send(BackendUpdate::Cost(*delta)).await;
            }
            match &self.fail_with {
                None => Ok(()),
                Some(reason) => Err(anyhow!("{reason}")),
            }
        }
    }

    // ── Harness ──────────────────────────────────────────────────────────

    struct Harness {
        session: Arc<Session>,
        notifier: Arc<RecordingNotifier>,
        probe: Arc<CountingProbe>,
    }

    fn test_config(
        wait: (u64, u64),
        processing: (u64, u64),
        cost_ceiling: f64,
    ) -> Arc<ClipbotConfig> {
        let mut config = ClipbotConfig::default();
        config.timeouts.wait_warning_ms = wait.0;
        config.timeouts.wait_timeout_ms = wait.1;
        config.timeouts.processing_warning_ms = processing.0;
        config.timeouts.processing_timeout_ms = processing.1;
        config.validation.max_file_size_bytes = 1_000;
        config.validation.max_duration_seconds = 60.0;
        config.processing.cost_ceiling = cost_ceiling;
        Arc::new(config)
    }

    fn harness(
        config: Arc<ClipbotConfig>,
        probe: Arc<CountingProbe>,
        backend: Arc<dyn ProcessingBackend>,
    ) -> Harness {
        let notifier = RecordingNotifier::new();
        let session = Session::new(
            "chan:1",
            config,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&probe) as Arc<dyn DurationProbe>,
            backend,
        );
        Harness {
            session,
            notifier,
            probe,
        }
    }

    fn default_harness(backend: Arc<dyn ProcessingBackend>) -> Harness {
        harness(
            test_config((60, 120), (10_000, 20_000), 0.5),
            CountingProbe::ok(5.0),
            backend,
        )
    }

    fn media(size_bytes: u64) -> SessionEvent {
        SessionEvent::Media(MediaRef::new("clip.mp4", size_bytes))
    }

    fn command() -> SessionEvent {
        SessionEvent::Command("sc".into())
    }

    async fn wait_for_state(session: &Arc<Session>, state: SessionState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while session.state().await != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session did not reach {state} in time"));
    }

    // ── Tests ────────────────────────────────────────────────────────────

    #[rstest]
    #[case::command_first(true)]
    #[case::media_first(false)]
    #[tokio::test]
    async fn test_fragments_in_either_order_reach_processing_once(#[case] command_first: bool) {
        let h = default_harness(Arc::new(StallBackend));
        if command_first {
            h.session.dispatch(command()).await;
            h.session.dispatch(media(500)).await;
        } else {
            h.session.dispatch(media(500)).await;
            h.session.dispatch(command()).await;
        }

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Processing);
        assert_eq!(snap.session_cost, 0.0, "no cost may accrue before processing");
        assert!(snap.timer_active);
        assert_eq!(h.probe.calls(), 1);
        assert_eq!(h.notifier.count_containing("on it"), 1);
    }

    #[rstest]
    #[case::success(SessionEvent::Success)]
    #[case::fail(SessionEvent::Fail { reason: "x".into() })]
    #[case::cost(SessionEvent::CostDelta(1.0))]
    #[case::timeout(SessionEvent::Timeout { epoch: 7 })]
    #[case::reset(SessionEvent::Reset)]
    #[tokio::test]
    async fn test_rejected_event_in_idle_is_a_noop(#[case] event: SessionEvent) {
        let h = default_harness(Arc::new(StallBackend));
        let before = h.session.last_active_ms();

        h.session.dispatch(event).await;

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.session_cost, 0.0);
        assert_eq!(h.session.last_active_ms(), before, "last_active must not move");
    }

    #[tokio::test]
    async fn test_input_rejected_in_terminal_state() {
        let h = default_harness(Arc::new(ScriptBackend {
            deltas: vec![],
            fail_with: None,
        }));
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        wait_for_state(&h.session, SessionState::Done).await;

        let before = h.session.last_active_ms();
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Done);
        assert!(snap.pending_command.is_none());
        assert_eq!(h.session.last_active_ms(), before);
    }

    #[tokio::test]
    async fn test_oversized_attachment_errors_without_probing() {
        let h = default_harness(Arc::new(StallBackend));
        h.session.dispatch(command()).await;
        h.session.dispatch(media(5_000)).await;

        assert_eq!(h.session.state().await, SessionState::Error);
        assert_eq!(h.probe.calls(), 0, "size check must short-circuit the probe");
        assert_eq!(h.notifier.count_containing("over the"), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_is_a_validation_failure() {
        let h = harness(
            test_config((60, 120), (10_000, 20_000), 0.5),
            CountingProbe::failing("corrupt container"),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;

        assert_eq!(h.session.state().await, SessionState::Error);
        assert_eq!(h.notifier.count_containing("could not read"), 1);
    }

    #[tokio::test]
    async fn test_media_over_duration_limit_rejected() {
        let h = harness(
            test_config((60, 120), (10_000, 20_000), 0.5),
            CountingProbe::ok(90.0),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;

        assert_eq!(h.session.state().await, SessionState::Error);
        assert_eq!(h.notifier.count_containing("over the 60.0s limit"), 1);
    }

    #[tokio::test]
    async fn test_wait_timeout_returns_to_idle_exactly_once() {
        let h = harness(
            test_config((40, 80), (10_000, 20_000), 0.5),
            CountingProbe::ok(5.0),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        assert_eq!(h.session.state().await, SessionState::Waiting);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Idle);
        assert!(snap.pending_command.is_none());
        assert!(!snap.timer_active);
        assert_eq!(h.notifier.count_containing("times out soon"), 1);
        assert_eq!(h.notifier.count_containing("timed out waiting"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_fragment_restarts_wait_timer() {
        let h = harness(
            test_config((60, 120), (10_000, 20_000), 0.5),
            CountingProbe::ok(5.0),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Same fragment kind again: stays WAITING, timer restarts from zero.
        h.session.dispatch(command()).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // 160ms after the first fragment, but only 80ms after the restart.
        assert_eq!(h.session.state().await, SessionState::Waiting);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.session.state().await, SessionState::Idle);
        assert_eq!(
            h.notifier.count_containing("timed out waiting"),
            1,
            "the superseded timer must not also fire"
        );
    }

    #[tokio::test]
    async fn test_success_clears_pending_and_keeps_cost_until_reset() {
        let h = default_harness(Arc::new(ScriptBackend {
            deltas: vec![0.05],
            fail_with: None,
        }));
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        wait_for_state(&h.session, SessionState::Done).await;

        let snap = h.session.snapshot().await;
        assert!((snap.session_cost - 0.05).abs() < 1e-9);
        assert!(snap.pending_command.is_none());
        assert!(snap.pending_media.is_none());
        assert!(!snap.timer_active);
        assert_eq!(h.notifier.count_containing("your clip is ready"), 1);

        h.session.dispatch(SessionEvent::Reset).await;
        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.session_cost, 0.0);
    }

    #[tokio::test]
    async fn test_backend_failure_notifies_once_and_is_resettable() {
        let h = default_harness(Arc::new(ScriptBackend {
            deltas: vec![],
            fail_with: Some("model exploded".into()),
        }));
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        wait_for_state(&h.session, SessionState::Error).await;

        assert_eq!(h.notifier.count_containing("processing failed"), 1);

        h.session.dispatch(SessionEvent::Reset).await;
        assert_eq!(h.session.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_processing_timeout_aborts_stalled_backend() {
        let h = harness(
            test_config((10_000, 20_000), (40, 80), 0.5),
            CountingProbe::ok(5.0),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        assert_eq!(h.session.state().await, SessionState::Processing);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Error);
        assert!(!snap.timer_active);
        assert_eq!(h.notifier.count_containing("taking longer than usual"), 1);
        assert_eq!(h.notifier.count_containing("processing timed out"), 1);
    }

    #[tokio::test]
    async fn test_cost_ceiling_beats_pending_success() {
        let h = default_harness(Arc::new(ScriptBackend {
            deltas: vec![0.3, 0.3],
            fail_with: None,
        }));
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        wait_for_state(&h.session, SessionState::CostExceeded).await;

        // Give the queued SUCCESS time to arrive; it must be rejected.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::CostExceeded, "SUCCESS must not win");
        assert!((snap.session_cost - 0.6).abs() < 1e-9);
        assert_eq!(h.notifier.count_containing("cost budget"), 1);

        h.session.dispatch(SessionEvent::Reset).await;
        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.session_cost, 0.0);
    }

    #[tokio::test]
    async fn test_reset_rejected_outside_terminal_states() {
        let h = default_harness(Arc::new(StallBackend));
        h.session.dispatch(command()).await;
        h.session.dispatch(SessionEvent::Reset).await;

        let snap = h.session.snapshot().await;
        assert_eq!(snap.state, SessionState::Waiting);
        assert!(snap.pending_command.is_some(), "reset must not clear a live request");
    }

    #[tokio::test]
    async fn test_stale_wait_timer_cannot_fire_into_processing() {
        // Short wait timeout, long processing timeout: if the cancelled
        // waiting timer leaked, it would expire mid-processing.
        let h = harness(
            test_config((20, 40), (10_000, 20_000), 0.5),
            CountingProbe::ok(5.0),
            Arc::new(StallBackend),
        );
        h.session.dispatch(command()).await;
        h.session.dispatch(media(500)).await;
        assert_eq!(h.session.state().await, SessionState::Processing);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(h.session.state().await, SessionState::Processing);
        assert_eq!(h.notifier.count_containing("timed out waiting"), 0);
    }
}
