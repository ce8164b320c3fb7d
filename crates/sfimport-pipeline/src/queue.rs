//! Bounded import queue drained by a fixed pool of workers.
//!
//! The channel capacity is the only backpressure: [`ImportQueueManager::enqueue`]
//! never waits, it fails with [`QueueError::Full`] instead. A job id can be
//! queued or in flight at most once at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::worker::{ImportWorker, JobOutcome};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// A unit of work: the job id plus the raw file it imports.
#[derive(Debug, Clone)]
pub struct ImportTask {
    pub job_id: i64,
    pub bytes: Arc<[u8]>,
}

impl ImportTask {
    #[must_use]
    pub fn new(job_id: i64, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            job_id,
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub running: bool,
    pub workers: usize,
    pub capacity: usize,
    /// Tasks waiting in the channel.
    pub queued: usize,
    /// Tasks queued or being processed.
    pub in_flight: usize,
}

struct RunningQueue {
    sender: mpsc::Sender<ImportTask>,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

type InFlight = Arc<Mutex<HashSet<i64>>>;

pub struct ImportQueueManager {
    worker: ImportWorker,
    config: QueueConfig,
    running: Mutex<Option<RunningQueue>>,
    in_flight: InFlight,
}

impl ImportQueueManager {
    #[must_use]
    pub fn new(worker: ImportWorker, config: QueueConfig) -> Self {
        Self {
            worker,
            config,
            running: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> QueueConfig {
        self.config
    }

    /// Spawns the worker pool. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyRunning`] if the pool is already up.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(QueueError::AlreadyRunning);
        }

        let (sender, receiver) = mpsc::channel(self.config.capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let token = CancellationToken::new();
        let handles = (0..self.config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    self.worker.clone(),
                    Arc::clone(&receiver),
                    token.clone(),
                    Arc::clone(&self.in_flight),
                ))
            })
            .collect();

        *running = Some(RunningQueue {
            sender,
            token,
            handles,
        });
        tracing::info!(
            workers = self.config.workers.max(1),
            capacity = self.config.capacity.max(1),
            "import queue started"
        );
        Ok(())
    }

    /// Cancels the shared token, waits for every worker to exit, then drops
    /// the channel. Tasks still waiting in the channel are abandoned; their
    /// jobs stay `pending`. Calling `stop` on a stopped queue is a no-op.
    pub async fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(queue) = taken else {
            return;
        };

        queue.token.cancel();
        for result in futures::future::join_all(queue.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "import worker panicked");
            }
        }
        let abandoned = queue.sender.max_capacity() - queue.sender.capacity();
        drop(queue.sender);
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!(abandoned, "import queue stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Queues `task` without waiting.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotRunning`] if the pool has not been started.
    /// - [`QueueError::AlreadyQueued`] if the job is queued or in flight.
    /// - [`QueueError::Full`] if the channel is at capacity.
    pub fn enqueue(&self, task: ImportTask) -> Result<(), QueueError> {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = running.as_ref() else {
            return Err(QueueError::NotRunning);
        };

        let job_id = task.job_id;
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(job_id) {
                return Err(QueueError::AlreadyQueued(job_id));
            }
        }

        match queue.sender.try_send(task) {
            Ok(()) => {
                tracing::debug!(job_id, "import job queued");
                Ok(())
            }
            Err(err) => {
                self.in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&job_id);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        let capacity = queue.sender.max_capacity();
                        tracing::warn!(job_id, capacity, "import queue full");
                        Err(QueueError::Full { capacity })
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(QueueError::NotRunning),
                }
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        match running.as_ref() {
            Some(queue) => QueueStats {
                running: true,
                workers: queue.handles.len(),
                capacity: queue.sender.max_capacity(),
                queued: queue.sender.max_capacity() - queue.sender.capacity(),
                in_flight,
            },
            None => QueueStats {
                running: false,
                workers: 0,
                capacity: self.config.capacity,
                queued: 0,
                in_flight,
            },
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    worker: ImportWorker,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<ImportTask>>>,
    token: CancellationToken,
    in_flight: InFlight,
) {
    tracing::debug!(worker = worker_id, "import worker started");
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                () = token.cancelled() => None,
                task = receiver.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        let outcome = worker.process(task.job_id, &task.bytes, &token).await;
        in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task.job_id);
        if let JobOutcome::Failed(reason) = &outcome {
            tracing::debug!(
                worker = worker_id,
                job_id = task.job_id,
                reason = %reason,
                "worker finished failed job"
            );
        }
    }
    tracing::debug!(worker = worker_id, "import worker stopped");
}
