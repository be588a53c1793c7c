use crate::error::PoolError;
use crate::pipeline::{HeightPipeline, Measurement, MeasurementConfig, MeasurementError};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a single measurement produced.
pub type MeasurementOutcome = Result<Measurement, MeasurementError>;

pub struct MeasurementTask {
    pub task_id: u64,
    pub image: Vec<u8>,
    pub result_sender: oneshot::Sender<MeasurementOutcome>,
}

/// Worker count used when none is given: one per logical CPU.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<MeasurementTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns a dispatcher and `worker_count` workers. Must be called inside a tokio runtime.
    pub fn new(pipeline: HeightPipeline, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<MeasurementTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<MeasurementTask>())
            .unzip();

        // Round-robin dispatcher
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    warn!(task_id = task.task_id, worker = worker_idx, "worker gone, dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_idx, mut worker_receiver)| {
                let worker_pipeline = pipeline.clone();
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let pipeline = worker_pipeline.clone();
                        let MeasurementTask {
                            task_id,
                            image,
                            result_sender,
                        } = task;

                        // The measurement is CPU-bound; keep it off the async workers.
                        match tokio::task::spawn_blocking(move || pipeline.measure(&image)).await {
                            Ok(outcome) => {
                                debug!(task_id, worker = worker_idx, ok = outcome.is_ok(), "measurement finished");
                                let _ = result_sender.send(outcome);
                            }
                            Err(error) => {
                                // Dropping the sender surfaces as PoolError::WorkerDropped.
                                warn!(task_id, worker = worker_idx, %error, "measurement task panicked");
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    pub async fn submit(&self, task_id: u64, image: Vec<u8>) -> Result<MeasurementOutcome, PoolError> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = MeasurementTask {
            task_id,
            image,
            result_sender,
        };

        self.task_sender.send(task).map_err(|_| PoolError::Closed)?;

        result_receiver.await.map_err(|_| PoolError::WorkerDropped)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting work and waits for queued tasks to finish.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Measures many images concurrently. Each measurement is independent of the others.
pub struct MeasurementPool {
    worker_pool: WorkerPool,
    task_counter: AtomicU64,
}

impl MeasurementPool {
    pub fn new(config: MeasurementConfig) -> Self {
        Self::with_pipeline(HeightPipeline::new(config), default_worker_count())
    }

    pub fn with_pipeline(pipeline: HeightPipeline, worker_count: usize) -> Self {
        Self {
            worker_pool: WorkerPool::new(pipeline, worker_count),
            task_counter: AtomicU64::new(0),
        }
    }

    pub async fn measure(&self, image: Vec<u8>) -> Result<MeasurementOutcome, PoolError> {
        let task_id = self.task_counter.fetch_add(1, Ordering::Relaxed);
        self.worker_pool.submit(task_id, image).await
    }

    /// Measures every image; results come back in input order.
    pub async fn measure_batch(&self, images: Vec<Vec<u8>>) -> Vec<Result<MeasurementOutcome, PoolError>> {
        join_all(images.into_iter().map(|image| self.measure(image))).await
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
