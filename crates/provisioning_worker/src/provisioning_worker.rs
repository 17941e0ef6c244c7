use crate::domain::{BatchReconciler, EntityRequestExpander, TickDisposition};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thingshare_domain::{
    BatchRepository, CreateBatchInput, DomainResult, GatewayRegistry, OrganizationDirectory,
    PageOptions, ProvisioningBatch,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ProvisioningWorkerConfig {
    /// Delay between reconciliation ticks of one batch.
    pub retry_delay: Duration,
    /// Retry budget granted to each new batch.
    pub batch_retries: u32,
}

impl Default for ProvisioningWorkerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(30),
            batch_retries: 5,
        }
    }
}

/// Where a batch's entity declarations come from.
#[derive(Debug, Clone)]
pub enum BatchSource {
    Files(Vec<PathBuf>),
    /// Re-derive the file list from an organization's registration.
    Organization(String),
}

#[derive(Debug, Clone)]
pub struct SubmitBatchInput {
    pub name: String,
    pub target_url: String,
    pub source: BatchSource,
}

/// Handle to one batch's scheduled reconciliation job.
pub struct ProvisioningJobHandle {
    pub join_handle: JoinHandle<()>,
    pub cancellation_token: CancellationToken,
}

impl ProvisioningJobHandle {
    /// Idempotent: cancelling an already-cancelled job is a no-op.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }
}

/// Owns provisioning batches: expands submitted declarations into creation
/// requests and drives each batch's reconciliation job until it converges,
/// fails, or is cancelled.
pub struct ProvisioningWorker {
    repository: Arc<dyn BatchRepository>,
    organizations: Arc<dyn OrganizationDirectory>,
    reconciler: Arc<BatchReconciler>,
    jobs: Arc<RwLock<HashMap<String, ProvisioningJobHandle>>>,
    config: ProvisioningWorkerConfig,
    shutdown_token: CancellationToken,
}

impl ProvisioningWorker {
    pub fn new(
        repository: Arc<dyn BatchRepository>,
        registry: Arc<dyn GatewayRegistry>,
        organizations: Arc<dyn OrganizationDirectory>,
        config: ProvisioningWorkerConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        let reconciler = Arc::new(BatchReconciler::new(Arc::clone(&repository), registry));
        Self {
            repository,
            organizations,
            reconciler,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            config,
            shutdown_token,
        }
    }

    /// Expand the declarations, persist the batch, and schedule its first
    /// reconciliation tick immediately.
    #[instrument(skip(self, input), fields(name = %input.name, target_url = %input.target_url))]
    pub async fn submit_batch(&self, input: SubmitBatchInput) -> DomainResult<ProvisioningBatch> {
        let files = match input.source {
            BatchSource::Files(files) => files,
            BatchSource::Organization(organization) => {
                debug!(organization = %organization, "resolving entity files via organization");
                self.organizations.data_load_files(&organization).await?
            }
        };

        let requests = EntityRequestExpander::expand_files(&files, Utc::now())?;
        let batch = self
            .repository
            .create_batch(CreateBatchInput {
                name: input.name,
                target_url: input.target_url,
                source_files: files
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect(),
                retries: self.config.batch_retries,
                requests,
            })
            .await?;

        self.schedule_job(&batch.id).await;
        info!(
            batch_id = %batch.id,
            entity_count = batch.requests.len(),
            "scheduled provisioning batch"
        );
        Ok(batch)
    }

    pub async fn list_batches(&self, options: PageOptions) -> DomainResult<Vec<ProvisioningBatch>> {
        self.repository.list_batches(options).await
    }

    /// Cancel a batch's scheduled job. Unknown or already-cancelled jobs are
    /// a no-op.
    pub async fn cancel_job(&self, batch_id: &str) {
        let handle = self.jobs.write().await.remove(batch_id);
        if let Some(handle) = handle {
            debug!(batch_id = %batch_id, "cancelling provisioning job");
            handle.cancel();
        }
    }

    /// Cancel every scheduled job and wait briefly for each to wind down.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let handles: Vec<(String, ProvisioningJobHandle)> =
            self.jobs.write().await.drain().collect();
        info!("stopping {} provisioning jobs", handles.len());

        for (batch_id, handle) in handles {
            handle.cancel();
            match tokio::time::timeout(Duration::from_secs(5), handle.join_handle).await {
                Ok(Ok(())) => debug!(batch_id = %batch_id, "provisioning job stopped"),
                Ok(Err(e)) => error!(batch_id = %batch_id, "provisioning job panicked: {:?}", e),
                Err(_) => warn!(batch_id = %batch_id, "provisioning job did not stop within timeout"),
            }
        }
    }

    async fn schedule_job(&self, batch_id: &str) {
        let token = self.shutdown_token.child_token();
        let reconciler = Arc::clone(&self.reconciler);
        let jobs = Arc::clone(&self.jobs);
        let retry_delay = self.config.retry_delay;
        let id = batch_id.to_string();
        let job_token = token.clone();

        // Hold the map lock across the spawn so the job's own terminal
        // cleanup cannot run before its handle is inserted.
        let mut jobs_guard = self.jobs.write().await;
        let join_handle = tokio::spawn(async move {
            run_provisioning_job(reconciler, &id, retry_delay, job_token).await;
            // Terminal batches no longer need a cancellable handle.
            jobs.write().await.remove(&id);
        });

        jobs_guard.insert(
            batch_id.to_string(),
            ProvisioningJobHandle {
                join_handle,
                cancellation_token: token,
            },
        );
    }
}

/// One batch's recurring job: tick immediately, then every `retry_delay`
/// until the batch reaches a terminal state or the job is cancelled.
#[instrument(skip(reconciler, token, retry_delay), fields(batch_id = %batch_id))]
async fn run_provisioning_job(
    reconciler: Arc<BatchReconciler>,
    batch_id: &str,
    retry_delay: Duration,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            debug!("provisioning job cancelled");
            break;
        }

        match reconciler.tick(batch_id).await {
            Ok(TickDisposition::Reschedule) => {
                debug!(delay = ?retry_delay, "batch still in progress, rescheduling");
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("provisioning job cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
            Ok(disposition) => {
                debug!(?disposition, "provisioning job finished");
                break;
            }
            Err(e) => {
                error!(error = %e, "reconciliation tick failed, stopping job");
                break;
            }
        }
    }
}
