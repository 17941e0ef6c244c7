use crate::agreement::{CreateAgreementInput, DatastreamMetric, SharingAgreement};
use crate::batch::{CreateBatchInput, ProvisioningBatch};
use crate::error::DomainResult;
use crate::options::PageOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Repository trait for provisioning batch storage.
/// Infrastructure layer (thingshare-store) implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Persist a new batch with a minted id.
    async fn create_batch(&self, input: CreateBatchInput) -> DomainResult<ProvisioningBatch>;

    /// Fetch a batch by id; `None` when it has been removed.
    async fn get_batch(&self, batch_id: &str) -> DomainResult<Option<ProvisioningBatch>>;

    /// Replace the stored batch document wholesale.
    ///
    /// The reconciliation discipline guarantees a single writer per batch, so
    /// no version check is needed.
    async fn update_batch(&self, batch: ProvisioningBatch) -> DomainResult<()>;

    /// Remove a batch; removing an unknown id is a no-op.
    async fn delete_batch(&self, batch_id: &str) -> DomainResult<()>;

    /// List batches ordered by creation time.
    async fn list_batches(&self, options: PageOptions) -> DomainResult<Vec<ProvisioningBatch>>;
}

/// Repository trait for sharing agreement storage.
///
/// Metric mutation goes through `record_observation`, a single atomic
/// fetch-apply-save, so concurrent handlers for different datastreams never
/// lose updates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AgreementRepository: Send + Sync {
    async fn create_agreement(
        &self,
        input: CreateAgreementInput,
    ) -> DomainResult<SharingAgreement>;

    async fn get_agreement(&self, agreement_id: &str) -> DomainResult<Option<SharingAgreement>>;

    /// Agreements that should have a running observation router.
    async fn list_active_agreements(&self) -> DomainResult<Vec<SharingAgreement>>;

    async fn deactivate_agreement(&self, agreement_id: &str) -> DomainResult<()>;

    /// Record one delivered observation against a datastream metric and
    /// return the updated metric.
    async fn record_observation(
        &self,
        agreement_id: &str,
        datastream: &str,
        phenomenon_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<DatastreamMetric>;
}

/// Narrow interface to the excluded organization domain: resolves an
/// organization reference to the entity files it has registered for loading.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn data_load_files(&self, organization: &str) -> DomainResult<Vec<PathBuf>>;
}

/// Delivers one observation payload to an agreement's consumer(s).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObservationForwarder: Send + Sync {
    async fn forward(&self, agreement_id: &str, payload: &[u8]) -> DomainResult<()>;
}
