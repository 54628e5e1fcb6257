use crate::{DecryptionEngine, Trigger};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use veil_common::spawn_detached;
use veil_ledger::ContentRecord;

/// Feeds queued posts to a [`DecryptionEngine`] with bounded concurrency.
///
/// Dropping the scheduler stops the worker and abandons pipelines that are
/// still running; their posts go back to `Idle`.
pub struct DecryptionScheduler {
    queue: mpsc::UnboundedSender<ContentRecord>,
    shutdown: CancellationToken,
}

impl DecryptionScheduler {
    /// Start a worker that runs at most `concurrency` pipelines at once.
    pub fn spawn(engine: Arc<DecryptionEngine>, concurrency: usize) -> Self {
        let (queue, mut pending) = mpsc::unbounded_channel::<ContentRecord>();
        let shutdown = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        let worker_shutdown = shutdown.clone();
        spawn_detached(async move {
            loop {
                let record = tokio::select! {
                    _ = worker_shutdown.cancelled() => break,
                    record = pending.recv() => match record {
                        Some(record) => record,
                        None => break,
                    },
                };
                let permit = tokio::select! {
                    _ = worker_shutdown.cancelled() => break,
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let engine = engine.clone();
                let task_shutdown = worker_shutdown.clone();
                spawn_detached(async move {
                    let _permit = permit;
                    tokio::select! {
                        _ = task_shutdown.cancelled() => {}
                        outcome = engine.decrypt(&record) => match outcome {
                            Ok(Trigger::Ran) => {}
                            Ok(trigger) => debug!(content_id = %record.id, ?trigger, "Skipped queued post"),
                            Err(error) => warn!(content_id = %record.id, %error, "Could not start decryption"),
                        },
                    }
                });
            }
            debug!("Decryption scheduler stopped");
        });

        Self { queue, shutdown }
    }

    /// Queue `record` for decryption. Queuing a post that is already
    /// running or finished is harmless. Returns false once the worker has
    /// stopped.
    pub fn enqueue(&self, record: ContentRecord) -> bool {
        self.queue.send(record).is_ok()
    }
}

impl Drop for DecryptionScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
