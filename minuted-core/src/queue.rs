//! Turn queue — a dedicated lane for chat response work.
//!
//! Chat turns run on their own worker task so latency-sensitive responses
//! are not starved by other background work. The queue owns the retry
//! policy: whole turns are retried with exponential backoff, but only when
//! the orchestrator re-raised a transient provider error, and only up to a
//! bounded attempt count.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{MinutedError, Result};
use crate::orchestrator::ResponseOrchestrator;
use crate::types::ChatMessage;

/// Backoff before retry `attempt` (0-based), doubling from the configured
/// initial delay and capped at 32s. A rate-limited provider's requested
/// delay wins when it is longer.
fn backoff_delay(config: &QueueConfig, attempt: u32, err: &MinutedError) -> Duration {
    let computed = config
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(5))
        .min(32_000);
    let server = err.retry_after_secs().map(|s| s * 1000).unwrap_or(0);
    Duration::from_millis(computed.max(server))
}

/// A background worker that processes chat turns in arrival order.
pub struct TurnQueue {
    tx: mpsc::Sender<Uuid>,
    worker: JoinHandle<()>,
    orchestrator: Arc<ResponseOrchestrator>,
}

impl TurnQueue {
    /// Spawn the worker lane.
    pub fn start(orchestrator: Arc<ResponseOrchestrator>, config: QueueConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Uuid>(config.capacity);
        let worker_orchestrator = Arc::clone(&orchestrator);

        let worker = tokio::spawn(async move {
            while let Some(chat_id) = rx.recv().await {
                run_with_retry(&worker_orchestrator, chat_id, &config).await;
            }
        });

        Self {
            tx,
            worker,
            orchestrator,
        }
    }

    /// Queue a turn for `chat_id`. Returns false if the queue has shut down.
    pub async fn enqueue(&self, chat_id: Uuid) -> bool {
        self.tx.send(chat_id).await.is_ok()
    }

    /// Persist the user's message synchronously and queue the response turn,
    /// returning the persisted message so the caller can render it at once.
    pub async fn send_message(&self, chat_id: Uuid, content: &str) -> Result<ChatMessage> {
        let message = self.orchestrator.create_user_message(chat_id, content)?;
        if !self.enqueue(chat_id).await {
            warn!(chat_id = %chat_id, "Turn queue is shut down, response not enqueued");
        }
        Ok(message)
    }

    /// Stop accepting work and wait for the in-flight turn to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Turn queue worker panicked");
        }
    }
}

async fn run_with_retry(
    orchestrator: &ResponseOrchestrator,
    chat_id: Uuid,
    config: &QueueConfig,
) {
    for attempt in 0..config.max_attempts {
        match orchestrator.respond(chat_id).await {
            Ok(()) => {
                if attempt > 0 {
                    info!(chat_id = %chat_id, attempt = attempt + 1, "Turn succeeded after retry");
                }
                return;
            }
            Err(err) if err.is_transient() && attempt + 1 < config.max_attempts => {
                let delay = backoff_delay(config, attempt, &err);
                warn!(
                    chat_id = %chat_id,
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying turn after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                // Terminal for this turn; the orchestrator already put the
                // UI into a terminal state.
                error!(chat_id = %chat_id, error = %err, "Turn failed terminally");
                return;
            }
        }
    }
}
