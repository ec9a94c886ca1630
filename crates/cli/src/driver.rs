//! Local line-oriented driver.
//!
//! Stands in for the chat transport so the session core can be exercised
//! end to end from a terminal. Events are read from stdin, one per line;
//! notifications are printed to stdout. The processing backend is a dry
//! run that sleeps briefly and reports a flat cost — the real executor
//! lives behind the `ProcessingBackend` trait.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        sync::mpsc,
    },
    tracing::info,
};

use {
    clipbot_config::ClipbotConfig,
    clipbot_media::{FfprobeProbe, MediaRef},
    clipbot_session::{
        BackendUpdate, Notifier, ProcessingBackend, ProcessingJob, SessionEvent, SessionRegistry,
    },
};

const HELP: &str = "\
commands (one per line):
  <key> cmd <text>             send a command fragment
  <key> media <locator> <bytes>  send a media fragment
  <key> reset                  reset a finished session
  quit";

/// Notifier that prints to stdout.
struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, session_key: &str, text: &str) -> Result<()> {
        println!("[{session_key}] {text}");
        Ok(())
    }
}

/// Backend that simulates a costed job: sleeps, reports one cost delta.
struct DryRunBackend {
    latency: Duration,
    cost: f64,
}

#[async_trait]
impl ProcessingBackend for DryRunBackend {
    async fn run(&self, job: ProcessingJob, updates: mpsc::Sender<BackendUpdate>) -> Result<()> {
        info!(
            key = %job.session_key,
            command = %job.command,
            duration_seconds = job.duration_seconds,
            "dry-run job started"
        );
        tokio::time::sleep(self.latency).await;
        let _ = updates.send(BackendUpdate::Cost(self.cost)).await;
        Ok(())
    }
}

pub async fn run(config: ClipbotConfig) -> Result<()> {
    let result = clipbot_config::validate::validate(&config);
    if result.has_errors() {
        for d in &result.diagnostics {
            eprintln!("{}: {}: {}", d.severity, d.path, d.message);
        }
        anyhow::bail!("refusing to start with invalid config");
    }

    let config = Arc::new(config);
    let probe = FfprobeProbe::new(
        config.validation.ffprobe_path.clone(),
        Duration::from_millis(config.validation.probe_timeout_ms),
    );
    let registry = SessionRegistry::new(
        Arc::clone(&config),
        Arc::new(StdoutNotifier),
        Arc::new(probe),
        Arc::new(DryRunBackend {
            latency: Duration::from_millis(500),
            cost: 0.05,
        }),
    );
    registry.start_sweeper().await;

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match parse_line(line) {
            Some((key, event)) => registry.dispatch(&key, event).await,
            None => println!("{HELP}"),
        }
    }

    registry.stop_sweeper().await;
    Ok(())
}

/// Parse one driver line into a session key and event.
fn parse_line(line: &str) -> Option<(String, SessionEvent)> {
    let mut parts = line.split_whitespace();
    let key = parts.next()?.to_string();
    let verb = parts.next()?;
    match verb {
        "cmd" => {
            let text = parts.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            Some((key, SessionEvent::Command(text)))
        },
        "media" => {
            let locator = parts.next()?.to_string();
            let size_bytes = parts.next()?.parse().ok()?;
            Some((key, SessionEvent::Media(MediaRef::new(locator, size_bytes))))
        },
        "reset" => Some((key, SessionEvent::Reset)),
        _ => None,
    }
}
