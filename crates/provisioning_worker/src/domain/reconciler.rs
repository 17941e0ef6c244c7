use crate::domain::EntityCreator;
use chrono::Utc;
use std::sync::Arc;
use thingshare_domain::{BatchRepository, BatchState, DomainResult, GatewayRegistry};
use tracing::{debug, error, info, instrument, warn};

/// What the scheduled job should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDisposition {
    /// The batch is still in progress; run another tick after the delay.
    Reschedule,
    /// The batch converged; remove the job.
    Completed,
    /// Retries are exhausted with unresolved requests; remove the job.
    Failed,
    /// The batch was deleted externally; remove the job without error.
    Removed,
}

/// Drives one provisioning batch through one reconciliation pass.
///
/// The scheduler guarantees no two ticks of the same batch overlap, so the
/// batch document has a single writer and plain fetch-modify-save suffices.
pub struct BatchReconciler {
    repository: Arc<dyn BatchRepository>,
    registry: Arc<dyn GatewayRegistry>,
}

impl BatchReconciler {
    pub fn new(repository: Arc<dyn BatchRepository>, registry: Arc<dyn GatewayRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn tick(&self, batch_id: &str) -> DomainResult<TickDisposition> {
        let Some(mut batch) = self.repository.get_batch(batch_id).await? else {
            // The batch has been removed out from under the job; a legitimate
            // possibility, not an error.
            warn!("provisioning batch no longer exists, cancelling its job");
            return Ok(TickDisposition::Removed);
        };

        match batch.state {
            BatchState::Complete => return Ok(TickDisposition::Completed),
            BatchState::Failed => return Ok(TickDisposition::Failed),
            BatchState::InProgress => {}
        }

        batch.reset_unresolved_outcomes();
        let gateway = self.registry.gateway(&batch.target_url).await?;
        let creator = EntityCreator::new(gateway);
        let now = Utc::now();

        let indices = batch.unresolved_indices();
        let attempts = indices.iter().map(|&i| {
            let request = batch.requests[i].clone();
            let creator = &creator;
            async move { creator.attempt(&request, now).await }
        });
        let results = futures::future::join_all(attempts).await;

        let mut pass_failures = 0u32;
        for (i, result) in indices.into_iter().zip(results) {
            match result {
                Ok(outcome) => batch.requests[i].outcome = outcome,
                Err(e) => {
                    error!(error = %e, "could not create entity '{}'", batch.requests[i]);
                    pass_failures += 1;
                }
            }
        }

        batch.finish_pass(pass_failures, now);
        debug!(
            created = batch.created,
            existing = batch.existing,
            failed = batch.failed,
            retries_remaining = batch.retries_remaining,
            "reconciliation pass finished"
        );

        let state = batch.state;
        self.repository.update_batch(batch).await?;

        match state {
            BatchState::InProgress => Ok(TickDisposition::Reschedule),
            BatchState::Complete => {
                info!("provisioning batch complete");
                Ok(TickDisposition::Completed)
            }
            BatchState::Failed => {
                warn!("provisioning batch failed, retries exhausted");
                Ok(TickDisposition::Failed)
            }
        }
    }
}
