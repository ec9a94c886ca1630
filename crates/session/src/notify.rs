use {anyhow::Result, async_trait::async_trait};

/// Outbound notification channel, implemented by the transport layer.
///
/// Fire-and-forget from the session's perspective: send failures are
/// logged by the caller, never routed back into the state machine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, session_key: &str, text: &str) -> Result<()>;
}
