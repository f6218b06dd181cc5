use std::collections::HashMap;
use std::sync::Arc;

use broker_core::{BrokerConfig, Job, SubmissionRecord};
use broker_store::Store;
use chrono::Utc;

pub const SUBMISSION_QUEUE_KEY: &str = "submissions";
pub const AVG_PROCESSING_TIME_KEY: &str = "avg_processing_time";
const JOB_PREFIX: &str = "job:";

/// The store-backed view of the job registry: the hash at `job:{uuid}` for
/// each job, the submission queue list, and the `avg_processing_time`
/// global counter. This is the only component that knows the registry's
/// on-wire key layout (§6 of the specification).
pub struct JobRegistry {
    store: Arc<dyn Store>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        JobRegistry { store }
    }

    /// Push a submission from the HTTP layer onto the queue the dispatch
    /// loop drains.
    pub async fn enqueue_submission(&self, sub: &SubmissionRecord) -> Result<(), broker_store::StoreError> {
        let json = serde_json::to_string(sub).expect("SubmissionRecord always serializes");
        self.store.list_push_left(SUBMISSION_QUEUE_KEY, &json).await
    }

    /// Pop every currently-queued submission, oldest push first (FIFO).
    pub async fn drain_submissions(&self) -> Result<Vec<SubmissionRecord>, broker_store::StoreError> {
        let mut out = Vec::new();
        while let Some(raw) = self.store.list_pop_right(SUBMISSION_QUEUE_KEY).await? {
            match serde_json::from_str::<SubmissionRecord>(&raw) {
                Ok(sub) => out.push(sub),
                Err(e) => tracing::warn!("dropping malformed submission record: {e}"),
            }
        }
        Ok(out)
    }

    pub async fn pending_submission_count(&self) -> Result<i64, broker_store::StoreError> {
        self.store.list_len(SUBMISSION_QUEUE_KEY).await
    }

    /// Write a fresh job hash for a just-drained submission.
    pub async fn create_job(&self, sub: &SubmissionRecord) -> Result<Job, broker_store::StoreError> {
        let job = Job::new_queued(sub, Utc::now());
        self.store
            .hash_set(&Job::store_key(&job.request_id), &job.to_fields())
            .await?;
        Ok(job)
    }

    pub async fn get_job(&self, request_id: &str) -> Result<Option<Job>, broker_store::StoreError> {
        let fields = self.store.hash_get_all(&Job::store_key(request_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Job::from_fields(&fields))
    }

    /// Merge `fields` into the job hash. Never touches fields not present
    /// in the map, matching the store's single-key-atomic write contract.
    pub async fn write_fields(
        &self,
        request_id: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), broker_store::StoreError> {
        self.store.hash_set(&Job::store_key(request_id), &fields).await
    }

    /// All `job:*` keys currently in the registry.
    pub async fn scan_job_ids(&self) -> Result<Vec<String>, broker_store::StoreError> {
        let keys = self.store.scan_by_prefix(JOB_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(JOB_PREFIX).map(str::to_string))
            .collect())
    }

    /// `avg_processing_time`, falling back to `default_secs` if never written.
    pub async fn avg_processing_time(&self, default_secs: f64) -> Result<f64, broker_store::StoreError> {
        Ok(self
            .store
            .string_get(AVG_PROCESSING_TIME_KEY)
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_secs))
    }

    /// Update the moving average: `avg <- 0.8*avg + 0.2*duration`, seeded by
    /// the first observed duration when no value has ever been written.
    pub async fn record_processing_duration(&self, duration_secs: f64) -> Result<(), broker_store::StoreError> {
        let existing = self.store.string_get(AVG_PROCESSING_TIME_KEY).await?;
        let new_avg = match existing.and_then(|s| s.parse::<f64>().ok()) {
            Some(prev) => broker_core::AVG_SMOOTHING_ALPHA.mul_add(duration_secs, (1.0 - broker_core::AVG_SMOOTHING_ALPHA) * prev),
            None => duration_secs,
        };
        self.store
            .string_set(AVG_PROCESSING_TIME_KEY, &new_avg.to_string())
            .await
    }

    /// Estimated wait time for a submission landing at the back of the
    /// queue right now: `queue_length * avg_processing_time`.
    pub async fn estimated_wait_seconds(&self, cfg: &BrokerConfig) -> Result<f64, broker_store::StoreError> {
        let len = self.pending_submission_count().await? as f64;
        let avg = self.avg_processing_time(cfg.default_proc_time_secs).await?;
        Ok(len * avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_store::testing::MemoryStore;

    fn registry() -> JobRegistry {
        JobRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn drain_submissions_is_fifo_and_empties_the_queue() {
        let reg = registry();
        reg.enqueue_submission(&SubmissionRecord {
            id: "1".into(),
            input: "in/1".into(),
            workflow_path: None,
        })
        .await
        .unwrap();
        reg.enqueue_submission(&SubmissionRecord {
            id: "2".into(),
            input: "in/2".into(),
            workflow_path: None,
        })
        .await
        .unwrap();
        let drained = reg.drain_submissions().await.unwrap();
        assert_eq!(drained.iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(reg.pending_submission_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_job_round_trips_through_get_job() {
        let reg = registry();
        let sub = SubmissionRecord {
            id: "abc".into(),
            input: "in/abc".into(),
            workflow_path: None,
        };
        let created = reg.create_job(&sub).await.unwrap();
        let fetched = reg.get_job(&created.request_id).await.unwrap().unwrap();
        assert_eq!(fetched.request_id, created.request_id);
        assert_eq!(fetched.status, broker_core::JobStatus::Queued);
        assert_eq!(fetched.attempt, 1);
    }

    #[tokio::test]
    async fn avg_processing_time_defaults_until_first_write() {
        let reg = registry();
        assert_eq!(reg.avg_processing_time(80.0).await.unwrap(), 80.0);
        reg.record_processing_duration(100.0).await.unwrap();
        assert_eq!(reg.avg_processing_time(80.0).await.unwrap(), 100.0);
        reg.record_processing_duration(50.0).await.unwrap();
        // 0.8*100 + 0.2*50 = 90
        let avg = reg.avg_processing_time(80.0).await.unwrap();
        assert!((avg - 90.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_job_returns_none() {
        let reg = registry();
        assert!(reg.get_job("missing").await.unwrap().is_none());
    }
}
