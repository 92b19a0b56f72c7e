//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fabula_models::StoryRecord;
use fabula_queue::{GenerateStoryJob, JobQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::{process_story, ProcessingContext};

/// Idle threshold for claiming another consumer's pending message.
///
/// Redis reports idle time since delivery, which keeps growing while
/// the original consumer is still working. The threshold is therefore
/// floored above the job timeout: a message only becomes claimable
/// once its original run must have been cancelled, so a claim can
/// never start a second live run of the same story.
fn claim_idle_threshold(config: &WorkerConfig) -> Duration {
    let floor = config.job_timeout + Duration::from_secs(60);
    config.claim_min_idle.max(floor)
}

/// A claimed message needs no run when its story is gone or already
/// reached a terminal state (the crashed worker died after finishing).
fn story_already_resolved(record: Option<&StoryRecord>) -> bool {
    record.is_none_or(|r| r.status.is_terminal())
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<ProcessingContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: ProcessingContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        // Initialize queue
        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Spawn a task to claim pending jobs periodically
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = Arc::clone(&self.ctx);
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle = claim_idle_threshold(&self.config);
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        // Claim jobs orphaned by crashed workers
                        match queue_clone
                            .claim_pending(&consumer_name, claim_min_idle.as_millis() as u64, 5)
                            .await
                        {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending jobs", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let permit = match semaphore_clone.clone().acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_claimed_job(ctx, queue, message_id, job)
                                            .await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        // Wait for in-flight jobs to complete
        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                1000, // Block for 1 second
                available.min(5),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single job.
    ///
    /// Both outcomes are terminal: the processor records success or
    /// failure in the job store, so the message is acked and the
    /// story's dedup key cleared either way.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: GenerateStoryJob,
    ) {
        let job_id = job.job_id.clone();
        info!("Executing job {}", job_id);

        match process_story(&ctx, &job).await {
            Ok(()) => info!("Job {} completed successfully", job_id),
            Err(e) => error!("Job {} failed: {}", job_id, e),
        }

        if let Err(e) = queue.ack(&message_id).await {
            error!("Failed to ack job {}: {}", job_id, e);
        }
        if let Err(e) = queue.clear_dedup(&job).await {
            warn!("Failed to clear dedup key for job {}: {}", job_id, e);
        }
    }

    /// Execute a message claimed from a crashed worker.
    ///
    /// If the crashed worker already drove the story to a terminal
    /// state, the message is acked without running the pipeline again.
    async fn execute_claimed_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        message_id: String,
        job: GenerateStoryJob,
    ) {
        match ctx.store.get(&job.story_id).await {
            Ok(record) if story_already_resolved(record.as_ref()) => {
                info!(
                    "Skipping claimed job {}: story {} already resolved",
                    job.job_id, job.story_id
                );
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack claimed job {}: {}", job.job_id, e);
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!("Failed to clear dedup key for job {}: {}", job.job_id, e);
                }
            }
            _ => Self::execute_job(ctx, queue, message_id, job).await,
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabula_models::StoryStatus;

    #[test]
    fn test_claim_threshold_floored_above_job_timeout() {
        let config = WorkerConfig::default();
        assert!(config.claim_min_idle < config.job_timeout);
        assert!(claim_idle_threshold(&config) > config.job_timeout);
    }

    #[test]
    fn test_claim_threshold_keeps_larger_configured_value() {
        let config = WorkerConfig {
            claim_min_idle: Duration::from_secs(7200),
            ..WorkerConfig::default()
        };
        assert_eq!(claim_idle_threshold(&config), Duration::from_secs(7200));
    }

    #[test]
    fn test_resolved_stories_need_no_reclaim_run() {
        let completed = StoryRecord::new("u", "T", "P").complete(
            vec![],
            None,
            None,
            fabula_models::AssetHandles::default(),
        );
        let failed = StoryRecord::new("u", "T", "P").fail("boom");
        let processing = StoryRecord::new("u", "T", "P");

        assert!(story_already_resolved(None));
        assert!(story_already_resolved(Some(&completed)));
        assert!(story_already_resolved(Some(&failed)));
        assert_eq!(processing.status, StoryStatus::Processing);
        assert!(!story_already_resolved(Some(&processing)));
    }
}
