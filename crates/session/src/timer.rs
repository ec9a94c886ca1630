//! Cancellable two-stage guard timer.
//!
//! A [`GuardTimer`] runs two sequential waits in a spawned task. After the
//! first wait it invokes `on_warn` at most once if `still_valid` holds;
//! after the second it invokes `on_expire` exactly once if `still_valid`
//! still holds. `cancel` is non-blocking and wins any race with firing:
//! once it returns, a wait that has not yet completed will never fire.
//! A callback that already started must itself re-check validity.

use std::time::Duration;

use {futures::future::BoxFuture, tokio::task::JoinHandle, tokio_util::sync::CancellationToken};

/// Re-checked at each stage boundary; `false` means the armed condition
/// no longer holds and the stage must not fire.
pub type StillValidFn = Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// One stage callback (warning or expiry).
pub type StageFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Handle to a running two-stage timer. Dropping the handle cancels it.
pub struct GuardTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl GuardTimer {
    /// Arm a timer: wait `first`, maybe warn, wait `second`, maybe expire.
    #[must_use]
    pub fn start(
        first: Duration,
        second: Duration,
        still_valid: StillValidFn,
        on_warn: StageFn,
        on_expire: StageFn,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(first) => {},
                () = task_token.cancelled() => return,
            }
            if !task_token.is_cancelled() && still_valid().await {
                on_warn().await;
            }

            tokio::select! {
                () = tokio::time::sleep(second) => {},
                () = task_token.cancelled() => return,
            }
            if !task_token.is_cancelled() && still_valid().await {
                on_expire().await;
            }
        });

        Self { token, handle }
    }

    /// Cancel the timer. Never blocks; any stage not yet past its
    /// cancellation check will not fire.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the timer task has run to completion or been cancelled
    /// and observed it.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for GuardTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
