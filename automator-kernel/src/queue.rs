//! In-process job queue.
//!
//! A bounded channel feeds `queue.workers` tasks; each task runs the
//! synchronous runner on the blocking pool, one job at a time. Nothing is
//! retried and nothing survives a restart.

use crate::config::QueueConf;
use crate::health::HealthTracker;
use crate::models::Job;
use crate::runner::Runner;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is full ({0} pending)")]
    Full(usize),
    #[error("job queue is closed")]
    Closed,
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    health: HealthTracker,
}

impl JobQueue {
    /// Spawns the workers; they stop once every `JobQueue` clone is dropped
    /// and the channel has drained.
    pub fn start(
        runner: Arc<Runner>,
        conf: &QueueConf,
        health: HealthTracker,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel::<Job>(conf.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = conf.workers.max(1);

        let handles = (0..workers)
            .map(|worker| spawn_worker(worker, rx.clone(), runner.clone(), health.clone()))
            .collect();
        info!(workers, capacity = conf.capacity, "job queue started");

        (Self { tx, health }, handles)
    }

    pub fn enqueue(&self, action: impl Into<String>, data: Value) -> Result<Uuid, QueueError> {
        let job = Job::new(action, data);
        let id = job.id;
        let action = job.action.clone();
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full(self.depth()),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        self.health.record_accepted();
        debug!(job_id = %id, action = %action, "job enqueued");
        Ok(id)
    }

    /// Jobs waiting for a worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

fn spawn_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    runner: Arc<Runner>,
    health: HealthTracker,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            let job = { rx.lock().await.recv().await };
            let Some(job) = job else {
                debug!(worker, "job queue closed, worker exiting");
                break;
            };

            let job_id = job.id;
            let runner = runner.clone();
            let result = task::spawn_blocking(move || runner.perform(&job.action, &job.data)).await;
            match result {
                Ok(Ok(outcome)) => {
                    health.record_succeeded();
                    debug!(worker, job_id = %job_id, node = %outcome.node_name(), "job done");
                }
                // already logged as fatal by the runner
                Ok(Err(_)) => health.record_failed(),
                Err(e) => {
                    health.record_failed();
                    error!(fatal = true, worker, job_id = %job_id, error = %e, "job panicked");
                }
            }
        }
        warn!(worker, "worker stopped");
    })
}
