//! Propagation Engine - retry-until-acknowledged delivery to neighbors.
//!
//! A fixed pool of long-lived workers drains a bounded queue of
//! [`Obligation`]s. Each obligation is "value V must reach neighbor N", and
//! the worker that claims it keeps retrying until N acknowledges:
//!
//! 1. Send `broadcast` to N, bounded by the per-attempt timeout
//! 2. On any reply that is not an `error`, the obligation is done
//! 3. On timeout, transport failure or rejection, sleep for the current
//!    backoff, double it (capped), and go back to 1
//!
//! There is no attempt limit and no cancellation. A neighbor that stays
//! down pins one worker; the rest of the pool keeps serving other
//! destinations. When the queue is full, [`PropagationEngine::enqueue`]
//! waits for a free slot rather than dropping work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::message::Payload;
use crate::transport::Transport;
use crate::{BroadcastValue, NodeId};

/// "This value must reach this neighbor."
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Obligation {
    pub value: BroadcastValue,
    pub destination: NodeId,
}

impl Obligation {
    pub fn new(value: BroadcastValue, destination: impl Into<NodeId>) -> Self {
        Self {
            value,
            destination: destination.into(),
        }
    }
}

/// Configuration for the propagation engine.
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Number of long-lived delivery workers.
    pub workers: usize,

    /// Obligations that can wait in the queue before producers stall.
    pub queue_capacity: usize,

    /// Deadline for a single delivery attempt.
    pub attempt_timeout: Duration,

    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,

    /// Ceiling for the delay between attempts.
    pub max_backoff: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            queue_capacity: 100,
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl PropagationConfig {
    /// Set the worker count (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the queue capacity (at least one).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_backoff, self.max_backoff)
    }
}

/// Counters describing engine activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Obligations accepted into the queue.
    pub enqueued: u64,
    /// Obligations acknowledged by their destination.
    pub delivered: u64,
    /// Delivery attempts that failed and were retried.
    pub failed_attempts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PropagationStats {
        PropagationStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Bounded worker pool delivering obligations with retries.
///
/// Dropping the engine closes the queue: workers drain what is left and exit.
pub struct PropagationEngine {
    queue: Sender<Obligation>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for PropagationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationEngine")
            .field("workers", &self.workers.len())
            .field("pending", &self.queue.len())
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

impl PropagationEngine {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn start(transport: Arc<dyn Transport>, config: PropagationConfig) -> Self {
        let worker_count = config.workers.max(1);
        let (queue, receiver) = async_channel::bounded(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let config = Arc::new(config);

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    transport: Arc::clone(&transport),
                    queue: receiver.clone(),
                    config: Arc::clone(&config),
                    counters: Arc::clone(&counters),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            node = transport.node_id(),
            workers = worker_count,
            capacity = config.queue_capacity,
            "Propagation engine started"
        );

        Self {
            queue,
            counters,
            workers,
        }
    }

    /// Queue an obligation, waiting for a free slot if the queue is full.
    pub async fn enqueue(&self, obligation: Obligation) -> Result<()> {
        self.queue
            .send(obligation)
            .await
            .map_err(|_| Error::QueueClosed)?;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Obligations waiting for a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Size of the worker pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PropagationStats {
        self.counters.snapshot()
    }
}

struct Worker {
    id: usize,
    transport: Arc<dyn Transport>,
    queue: Receiver<Obligation>,
    config: Arc<PropagationConfig>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self) {
        while let Ok(obligation) = self.queue.recv().await {
            self.deliver(obligation).await;
        }
        debug!(worker = self.id, "Propagation queue closed, worker exiting");
    }

    /// Retry one obligation until its destination acknowledges.
    async fn deliver(&self, obligation: Obligation) {
        let mut backoff = self.config.backoff();
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            debug!(
                worker = self.id,
                value = obligation.value,
                dest = %obligation.destination,
                attempt,
                "Relaying broadcast"
            );

            let request = Payload::Broadcast {
                message: obligation.value,
            };
            let result = self
                .transport
                .request(&obligation.destination, request, self.config.attempt_timeout)
                .await;

            match result {
                Ok(Payload::Error { code, text }) => {
                    // Transports normally surface error bodies as Rejected.
                    self.record_failure(&obligation, attempt, &Error::Rejected { code, text });
                }
                Ok(_) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    if attempt > 1 {
                        info!(
                            value = obligation.value,
                            dest = %obligation.destination,
                            attempt,
                            "Broadcast delivered after retries"
                        );
                    }
                    return;
                }
                Err(e) => self.record_failure(&obligation, attempt, &e),
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    fn record_failure(&self, obligation: &Obligation, attempt: u64, error: &Error) {
        self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
        if attempt == 1 {
            warn!(
                value = obligation.value,
                dest = %obligation.destination,
                "Relay failed, retrying with backoff: {}",
                error
            );
        } else {
            debug!(
                value = obligation.value,
                dest = %obligation.destination,
                attempt,
                "Relay attempt failed: {}",
                error
            );
        }
    }
}
