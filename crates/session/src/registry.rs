//! Concurrent key→session registry with TTL eviction.

use std::{sync::Arc, time::Duration};

use {
    clipbot_config::ClipbotConfig,
    clipbot_media::DurationProbe,
    dashmap::DashMap,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, info},
};

use crate::{
    backend::ProcessingBackend,
    event::SessionEvent,
    notify::Notifier,
    now_ms,
    state::Session,
};

/// Owns every live session. The registry is the only component that
/// creates or destroys sessions; everything else holds `Arc<Session>`.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    config: Arc<ClipbotConfig>,
    notifier: Arc<dyn Notifier>,
    probe: Arc<dyn DurationProbe>,
    backend: Arc<dyn ProcessingBackend>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<ClipbotConfig>,
        notifier: Arc<dyn Notifier>,
        probe: Arc<dyn DurationProbe>,
        backend: Arc<dyn ProcessingBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            config,
            notifier,
            probe,
            backend,
            sweeper: Mutex::new(None),
        })
    }

    /// Resolve the session for a key, creating it in IDLE if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<Session> {
        self.sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                info!(key, "session created");
                Session::new(
                    key,
                    Arc::clone(&self.config),
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.probe),
                    Arc::clone(&self.backend),
                )
            })
            .clone()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| Arc::clone(&entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Route an inbound event to its session, creating it if needed.
    pub async fn dispatch(&self, key: &str, event: SessionEvent) {
        let session = self.get_or_create(key);
        session.dispatch(event).await;
    }

    /// Remove every session idle longer than `ttl_ms`, cancelling its
    /// timer first. Safe to run concurrently with `get_or_create` and
    /// with in-flight dispatch; iteration works on a snapshot of keys so
    /// the map is never mutated while being iterated.
    pub async fn sweep(&self, now_ms: u64, ttl_ms: u64) -> usize {
        let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;
        for key in keys {
            let evicted = self.sessions.remove_if(&key, |_, session| {
                now_ms.saturating_sub(session.last_active_ms()) > ttl_ms
            });
            if let Some((_, session)) = evicted {
                session.shutdown().await;
                debug!(key = %session.key(), "session evicted by ttl sweep");
                removed += 1;
            }
        }
        removed
    }

    /// Start the periodic sweep task, replacing any already running one.
    pub async fn start_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let interval = Duration::from_millis(self.config.registry.sweep_interval_ms);
        let ttl_ms = self.config.registry.session_ttl_ms;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.sweep(now_ms(), ttl_ms).await;
                if removed > 0 {
                    info!(removed, remaining = registry.len(), "ttl sweep");
                }
            }
        });

        let mut sweeper = self.sweeper.lock().await;
        if let Some(old) = sweeper.take() {
            old.abort();
        }
        *sweeper = Some(handle);
    }

    /// Stop the periodic sweep task.
    pub async fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }
}
