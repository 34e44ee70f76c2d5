use crate::core_modules::sample::Sample;
use crate::error::{WatermapError, WatermapResult};
use crate::pipeline::{ExportDocument, WatermapPipeline};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};

pub struct RunTask {
    pub batch_id: u64,
    pub samples: Vec<Sample>,
    pub result_sender: oneshot::Sender<WatermapResult<ExportDocument>>,
}

/// Fixed set of workers, each running whole aggregations on the blocking pool.
/// Every run builds its own grid store; only the water oracle is shared.
pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<RunTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(pipeline: WatermapPipeline, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<RunTask>();
        let mut workers = Vec::with_capacity(worker_count);

        // Create a single dispatcher that distributes tasks to workers
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<RunTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        for mut worker_receiver in worker_receivers {
            let worker_pipeline = pipeline.clone();

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let run_pipeline = worker_pipeline.clone();
                    let batch_id = task.batch_id;
                    let samples = task.samples;

                    let result = tokio::task::spawn_blocking(move || run_pipeline.run(&samples))
                        .await
                        .unwrap_or_else(|e| {
                            Err(WatermapError::Worker(format!("batch {batch_id} panicked: {e}")))
                        });

                    let _ = task.result_sender.send(result);
                }
            });

            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn submit(&self, batch_id: u64, samples: Vec<Sample>) -> WatermapResult<ExportDocument> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = RunTask { batch_id, samples, result_sender };

        self.task_sender
            .send(task)
            .map_err(|_| WatermapError::Worker("failed to send task to worker pool".into()))?;

        result_receiver
            .await
            .map_err(|_| WatermapError::Worker("failed to receive result from worker".into()))?
    }
}

/// Runs independent sample batches concurrently, one aggregation per batch.
pub struct ParallelPipeline {
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    /// Sizes the pool to the number of logical CPUs.
    pub fn new(pipeline: WatermapPipeline) -> Self {
        Self::with_workers(pipeline, num_cpus::get())
    }

    pub fn with_workers(pipeline: WatermapPipeline, worker_count: usize) -> Self {
        Self { worker_pool: WorkerPool::new(pipeline, worker_count) }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// Results come back in the same order as `batches`.
    pub async fn run_batches(&self, batches: Vec<Vec<Sample>>) -> Vec<WatermapResult<ExportDocument>> {
        let runs = batches
            .into_iter()
            .enumerate()
            .map(|(batch_id, samples)| self.worker_pool.submit(batch_id as u64, samples));
        join_all(runs).await
    }
}
