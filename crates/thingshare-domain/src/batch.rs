use crate::entity::{CreationOutcome, EntityCreationRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    InProgress,
    Complete,
    Failed,
}

/// One persisted "create all these entities against this endpoint" batch.
///
/// Counts and state are recomputed once per reconciliation pass:
/// `Complete` iff every request resolved, `Failed` iff unresolved requests
/// remain with no retries left, `InProgress` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningBatch {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub source_files: Vec<String>,
    pub state: BatchState,
    pub created: u32,
    pub existing: u32,
    pub failed: u32,
    pub retries_remaining: u32,
    pub requests: Vec<EntityCreationRequest>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// External input for creating a batch (no ID)
#[derive(Debug, Clone)]
pub struct CreateBatchInput {
    pub name: String,
    pub target_url: String,
    pub source_files: Vec<String>,
    pub retries: u32,
    pub requests: Vec<EntityCreationRequest>,
}

impl ProvisioningBatch {
    /// True once every request has resolved to Created or AlreadyExists.
    pub fn is_settled(&self) -> bool {
        (self.created + self.existing) as usize == self.requests.len()
    }

    /// Indices of requests still needing an attempt this pass.
    pub fn unresolved_indices(&self) -> Vec<usize> {
        self.requests
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.outcome.is_resolved())
            .map(|(i, _)| i)
            .collect()
    }

    /// Reset recoverable outcomes to Pending ahead of a pass.
    pub fn reset_unresolved_outcomes(&mut self) {
        for request in &mut self.requests {
            if !request.outcome.is_resolved() {
                request.outcome = CreationOutcome::Pending;
            }
        }
    }

    /// Recompute counts from request outcomes plus this pass's failure tally,
    /// then apply the state invariants.
    pub fn finish_pass(&mut self, pass_failures: u32, now: DateTime<Utc>) {
        self.created = self
            .requests
            .iter()
            .filter(|r| r.outcome == CreationOutcome::Created)
            .count() as u32;
        self.existing = self
            .requests
            .iter()
            .filter(|r| r.outcome == CreationOutcome::AlreadyExists)
            .count() as u32;
        self.failed = pass_failures;
        self.retries_remaining = self.retries_remaining.saturating_sub(1);

        self.state = if self.is_settled() {
            BatchState::Complete
        } else if self.retries_remaining > 0 {
            BatchState::InProgress
        } else {
            BatchState::Failed
        };
        if self.state == BatchState::Failed {
            // Terminal accounting: every request that never resolved counts as
            // failed, whether it erred or stayed deferred to the end.
            self.failed = self.requests.len() as u32 - self.created - self.existing;
        }
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    fn request(outcome: CreationOutcome) -> EntityCreationRequest {
        let mut r = EntityCreationRequest::new(
            ResourceType::Sensors,
            serde_json::json!({"name": "S1"}),
            None,
            Utc::now(),
        );
        r.outcome = outcome;
        r
    }

    fn batch(requests: Vec<EntityCreationRequest>, retries: u32) -> ProvisioningBatch {
        ProvisioningBatch {
            id: "batch-1".to_string(),
            name: "test".to_string(),
            target_url: "http://sensor-things:8080/v1.0".to_string(),
            source_files: vec![],
            state: BatchState::InProgress,
            created: 0,
            existing: 0,
            failed: 0,
            retries_remaining: retries,
            requests,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    #[test]
    fn test_finish_pass_complete_when_all_resolved() {
        let mut batch = batch(
            vec![
                request(CreationOutcome::Created),
                request(CreationOutcome::AlreadyExists),
            ],
            5,
        );
        batch.finish_pass(0, Utc::now());
        assert_eq!(batch.state, BatchState::Complete);
        assert_eq!(batch.created, 1);
        assert_eq!(batch.existing, 1);
        assert_eq!(batch.retries_remaining, 4);
    }

    #[test]
    fn test_finish_pass_in_progress_with_retries_left() {
        let mut batch = batch(
            vec![
                request(CreationOutcome::Created),
                request(CreationOutcome::Deferred),
            ],
            5,
        );
        batch.finish_pass(0, Utc::now());
        assert_eq!(batch.state, BatchState::InProgress);
        assert_eq!(batch.retries_remaining, 4);
    }

    #[test]
    fn test_finish_pass_failed_on_exhaustion() {
        let mut batch = batch(
            vec![
                request(CreationOutcome::Created),
                request(CreationOutcome::Deferred),
            ],
            1,
        );
        batch.finish_pass(0, Utc::now());
        assert_eq!(batch.state, BatchState::Failed);
        assert_eq!(batch.retries_remaining, 0);
        assert_eq!(batch.failed, 1);
    }

    #[test]
    fn test_reset_unresolved_outcomes() {
        let mut batch = batch(
            vec![
                request(CreationOutcome::Created),
                request(CreationOutcome::Deferred),
                request(CreationOutcome::TooEarly),
            ],
            5,
        );
        batch.reset_unresolved_outcomes();
        assert_eq!(batch.requests[0].outcome, CreationOutcome::Created);
        assert_eq!(batch.requests[1].outcome, CreationOutcome::Pending);
        assert_eq!(batch.requests[2].outcome, CreationOutcome::Pending);
        assert_eq!(batch.unresolved_indices(), vec![1, 2]);
    }
}
