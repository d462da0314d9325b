//! Async webhook queue — bounded workers consuming deliveries with
//! retry and exponential backoff. Terminal failures are logged with the
//! job id; webhook work is at-least-once, never blocking the HTTP
//! response path.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use nexus_domain::config::WebhookQueueConfig;
use nexus_domain::webhook::WebhookEvent;

use crate::state::AppState;

#[derive(Debug)]
pub struct QueuedDelivery {
    pub job_id: Uuid,
    pub event: WebhookEvent,
}

pub struct WebhookQueue {
    tx: mpsc::Sender<QueuedDelivery>,
    rx: Mutex<Option<mpsc::Receiver<QueuedDelivery>>>,
    config: WebhookQueueConfig,
}

impl WebhookQueue {
    pub fn new(config: WebhookQueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            config,
        }
    }

    /// Enqueue a delivery for background processing. Returns the job id,
    /// or an error when the queue is full.
    pub async fn enqueue(&self, event: WebhookEvent) -> Result<Uuid, &'static str> {
        let job_id = Uuid::new_v4();
        self.tx
            .send(QueuedDelivery { job_id, event })
            .await
            .map_err(|_| "webhook queue is closed")?;
        Ok(job_id)
    }

    /// Start the worker pool. Workers share one receiver; each delivery
    /// is processed by exactly one worker.
    pub async fn spawn_workers(self: &Arc<Self>, state: AppState) {
        let receiver = Arc::new(Mutex::new(
            self.rx
                .lock()
                .await
                .take()
                .expect("webhook queue workers already spawned"),
        ));

        for worker_id in 0..self.config.concurrency.max(1) {
            let receiver = receiver.clone();
            let state = state.clone();
            let queue = self.clone();
            tokio::spawn(async move {
                loop {
                    let delivery = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };
                    let Some(delivery) = delivery else {
                        break;
                    };
                    queue.process_with_retry(&state, worker_id, delivery).await;
                }
            });
        }
        tracing::info!(
            workers = self.config.concurrency.max(1),
            "webhook queue workers started"
        );
    }

    async fn process_with_retry(&self, state: &AppState, worker_id: usize, job: QueuedDelivery) {
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 0..max_attempts {
            match crate::webhook::process(state, job.event.clone()).await {
                Ok(result) => {
                    tracing::info!(
                        job_id = %job.job_id,
                        worker_id,
                        attempt = attempt + 1,
                        session_id = %result.session_id,
                        duration_ms = result.duration_ms,
                        "webhook delivery processed"
                    );
                    return;
                }
                Err(e) if e.status_code() < 500 && e.status_code() != 429 => {
                    // Validation-class failures will never succeed on
                    // retry; drop immediately.
                    tracing::warn!(
                        job_id = %job.job_id,
                        worker_id,
                        error = %e,
                        "webhook delivery rejected, not retrying"
                    );
                    return;
                }
                Err(e) if attempt + 1 < max_attempts => {
                    let backoff = std::time::Duration::from_millis(
                        self.config.backoff_base_ms << attempt.min(6),
                    );
                    tracing::warn!(
                        job_id = %job.job_id,
                        worker_id,
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job.job_id,
                        worker_id,
                        attempts = max_attempts,
                        error = %e,
                        "webhook delivery failed terminally"
                    );
                    return;
                }
            }
        }
    }
}
