use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thingshare_domain::{
    AgreementRepository, AgreementState, CreateAgreementInput, DatastreamMetric, DomainError,
    DomainResult, SharingAgreement,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of AgreementRepository using HashMap.
///
/// `record_observation` applies the metric delta under a single write lock,
/// which is the store-level equivalent of an atomic fetch-modify-save: two
/// handlers updating the same datastream can never lose an increment.
pub struct InMemoryAgreementRepository {
    agreements: Arc<RwLock<HashMap<String, SharingAgreement>>>,
}

impl InMemoryAgreementRepository {
    pub fn new() -> Self {
        Self {
            agreements: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryAgreementRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgreementRepository for InMemoryAgreementRepository {
    async fn create_agreement(
        &self,
        input: CreateAgreementInput,
    ) -> DomainResult<SharingAgreement> {
        let agreement = SharingAgreement {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            producer_mqtt_url: input.producer_mqtt_url,
            consumers: input.consumers,
            datastreams: input
                .datastream_names
                .into_iter()
                .map(DatastreamMetric::new)
                .collect(),
            state: AgreementState::Active,
            created_at: Some(Utc::now()),
            updated_at: None,
        };

        let mut agreements = self.agreements.write().await;
        agreements.insert(agreement.id.clone(), agreement.clone());
        Ok(agreement)
    }

    async fn get_agreement(&self, agreement_id: &str) -> DomainResult<Option<SharingAgreement>> {
        let agreements = self.agreements.read().await;
        Ok(agreements.get(agreement_id).cloned())
    }

    async fn list_active_agreements(&self) -> DomainResult<Vec<SharingAgreement>> {
        let agreements = self.agreements.read().await;
        let mut active: Vec<SharingAgreement> = agreements
            .values()
            .filter(|a| a.state == AgreementState::Active)
            .cloned()
            .collect();
        active.sort_by_key(|a| a.created_at);
        Ok(active)
    }

    async fn deactivate_agreement(&self, agreement_id: &str) -> DomainResult<()> {
        let mut agreements = self.agreements.write().await;
        let agreement = agreements
            .get_mut(agreement_id)
            .ok_or_else(|| DomainError::AgreementNotFound(agreement_id.to_string()))?;
        agreement.state = AgreementState::Inactive;
        agreement.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn record_observation(
        &self,
        agreement_id: &str,
        datastream: &str,
        phenomenon_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<DatastreamMetric> {
        let mut agreements = self.agreements.write().await;
        let agreement = agreements
            .get_mut(agreement_id)
            .ok_or_else(|| DomainError::AgreementNotFound(agreement_id.to_string()))?;

        let metric = agreement
            .datastreams
            .iter_mut()
            .find(|m| m.name == datastream)
            .ok_or_else(|| DomainError::DatastreamNotFound {
                agreement_id: agreement_id.to_string(),
                datastream: datastream.to_string(),
            })?;

        metric.record(phenomenon_time, now);
        let updated = metric.clone();
        agreement.updated_at = Some(now);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input() -> CreateAgreementInput {
        CreateAgreementInput {
            name: "wx-share".to_string(),
            producer_mqtt_url: "mqtt://producer:1883".to_string(),
            consumers: vec!["acme".to_string()],
            datastream_names: vec!["DS-1".to_string(), "DS-2".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_seeds_zeroed_metrics() {
        let repo = InMemoryAgreementRepository::new();
        let agreement = repo.create_agreement(input()).await.unwrap();

        assert_eq!(agreement.state, AgreementState::Active);
        assert_eq!(agreement.datastreams.len(), 2);
        for metric in &agreement.datastreams {
            assert_eq!(metric.observation_count, 0);
            assert_eq!(metric.last_phenomenon_time, None);
        }
    }

    #[tokio::test]
    async fn test_record_observation_updates_metric() {
        let repo = InMemoryAgreementRepository::new();
        let agreement = repo.create_agreement(input()).await.unwrap();

        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let now = Utc::now();
        let metric = repo
            .record_observation(&agreement.id, "DS-1", Some(t1), now)
            .await
            .unwrap();

        assert_eq!(metric.observation_count, 1);
        assert_eq!(metric.last_phenomenon_time, Some(t1));
        assert_eq!(metric.last_delivery_time, Some(now));

        // The other metric is untouched
        let fetched = repo.get_agreement(&agreement.id).await.unwrap().unwrap();
        assert_eq!(fetched.datastreams[1].observation_count, 0);
    }

    #[tokio::test]
    async fn test_record_observation_unknown_datastream() {
        let repo = InMemoryAgreementRepository::new();
        let agreement = repo.create_agreement(input()).await.unwrap();

        let result = repo
            .record_observation(&agreement.id, "DS-9", None, Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(DomainError::DatastreamNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_observation_unknown_agreement() {
        let repo = InMemoryAgreementRepository::new();
        let result = repo
            .record_observation("missing", "DS-1", None, Utc::now())
            .await;
        assert!(matches!(result, Err(DomainError::AgreementNotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivate_removes_from_active_listing() {
        let repo = InMemoryAgreementRepository::new();
        let agreement = repo.create_agreement(input()).await.unwrap();
        assert_eq!(repo.list_active_agreements().await.unwrap().len(), 1);

        repo.deactivate_agreement(&agreement.id).await.unwrap();
        assert!(repo.list_active_agreements().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_never_lose_updates() {
        let repo = Arc::new(InMemoryAgreementRepository::new());
        let agreement = repo.create_agreement(input()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = Arc::clone(&repo);
            let id = agreement.id.clone();
            handles.push(tokio::spawn(async move {
                repo.record_observation(&id, "DS-1", None, Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fetched = repo.get_agreement(&agreement.id).await.unwrap().unwrap();
        assert_eq!(fetched.datastreams[0].observation_count, 20);
    }
}
