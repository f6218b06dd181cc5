use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use broker_core::JobStatus;
use broker_fleet::FleetView;
use broker_objectstore::ObjectStore;
use broker_sms::SmsClient;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::job_task::run_job;
use crate::policy::DispatchPolicy;
use crate::registry::JobRegistry;

/// The scheduler proper. Owns `queued_jobs` and `servers_in_use` exclusively
/// — no other task ever reads or writes them — and runs the
/// drain/reconcile/activate tick described in the specification.
pub struct DispatchLoop {
    registry: Arc<JobRegistry>,
    fleet: Arc<FleetView>,
    objectstore: Arc<dyn ObjectStore>,
    sms: Option<Arc<SmsClient>>,
    policy: DispatchPolicy,
    queued_jobs: HashMap<String, DateTime<Utc>>,
}

impl DispatchLoop {
    pub fn new(
        registry: Arc<JobRegistry>,
        fleet: Arc<FleetView>,
        objectstore: Arc<dyn ObjectStore>,
        sms: Option<Arc<SmsClient>>,
        policy: DispatchPolicy,
    ) -> Self {
        policy.validate().expect("invalid dispatch policy");
        DispatchLoop {
            registry,
            fleet,
            objectstore,
            sms,
            policy,
            queued_jobs: HashMap::new(),
        }
    }

    /// Run forever: `sleep(tick_interval)`, `drain`, `reconcile`, `activate`.
    pub async fn run(mut self) -> ! {
        let mut interval = tokio::time::interval(self.policy.tick_interval);
        loop {
            interval.tick().await;
            let _handles = self.tick(Utc::now()).await;
        }
    }

    /// One tick: drain the submission queue, reconcile the registry against
    /// the current time, then activate as many oldest-eligible jobs as there
    /// are idle servers. Returns the join handles of newly spawned per-job
    /// tasks so tests can await them deterministically; production callers
    /// may discard them — dropping a `JoinHandle` does not cancel the task.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        if let Err(e) = self.drain_submission_queue().await {
            tracing::error!("drain_submission_queue failed, abandoning tick: {e}");
            return Vec::new();
        }
        let servers_in_use = match self.reconcile_registry(now).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("reconcile_registry failed, abandoning tick: {e}");
                return Vec::new();
            }
        };
        match self.activate_oldest_eligible(&servers_in_use).await {
            Ok(handles) => handles,
            Err(e) => {
                tracing::error!("activate_oldest_eligible failed, abandoning tick: {e}");
                Vec::new()
            }
        }
    }

    /// The HTTP layer already writes `job:{id}` with `status=queued` when it
    /// accepts a submission, so draining here only needs to learn each
    /// job's `enqueued_at` for scheduling order. A submission whose job
    /// hash is missing (defensive: it should always exist by now) is
    /// created fresh rather than dropped.
    async fn drain_submission_queue(&mut self) -> Result<(), broker_store::StoreError> {
        for sub in self.registry.drain_submissions().await? {
            let job = match self.registry.get_job(&sub.id).await? {
                Some(job) => job,
                None => self.registry.create_job(&sub).await?,
            };
            self.queued_jobs.insert(job.request_id.clone(), job.enqueued_at);
        }
        Ok(())
    }

    async fn reconcile_registry(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>, broker_store::StoreError> {
        let mut servers_in_use = HashSet::new();
        for request_id in self.registry.scan_job_ids().await? {
            let Some(job) = self.registry.get_job(&request_id).await? else {
                continue;
            };
            match job.status {
                JobStatus::Queued => {
                    self.queued_jobs.entry(request_id).or_insert(job.enqueued_at);
                }
                JobStatus::Failed => {
                    let next_attempt = job.attempt + 1;
                    let mut fields = HashMap::new();
                    fields.insert("attempt".into(), next_attempt.to_string());
                    if next_attempt <= self.policy.max_attempts {
                        fields.insert("status".into(), "queued".into());
                        tracing::info!("retrying job {request_id} (attempt {next_attempt})");
                    } else {
                        fields.insert("status".into(), "error".into());
                        tracing::info!("job {request_id} exhausted retries at attempt {next_attempt}");
                    }
                    self.registry.write_fields(&request_id, fields).await?;
                }
                JobStatus::Processing => {
                    if let Some(server) = &job.server {
                        servers_in_use.insert(server.clone());
                    }
                    if let Some(started) = job.proc_start_at {
                        let age = now - started;
                        if age.num_seconds() > self.policy.watchdog_timeout.as_secs() as i64 {
                            tracing::warn!("watchdog reaping job {request_id} (running since {started})");
                            let mut fields = HashMap::new();
                            fields.insert("status".into(), "failed".into());
                            fields.insert("error".into(), "Timeout while processing".into());
                            self.registry.write_fields(&request_id, fields).await?;
                        }
                    }
                }
                JobStatus::Done | JobStatus::Error => {}
            }
        }
        Ok(servers_in_use)
    }

    async fn activate_oldest_eligible(
        &mut self,
        servers_in_use: &HashSet<String>,
    ) -> Result<Vec<JoinHandle<()>>, broker_store::StoreError> {
        let mut handles = Vec::new();
        let idle = self.fleet.idle_servers().await;
        for server in idle {
            if servers_in_use.contains(&server) {
                continue;
            }
            let Some(request_id) = oldest_of(&self.queued_jobs) else {
                break;
            };
            self.queued_jobs.remove(&request_id);
            let Some(job) = self.registry.get_job(&request_id).await? else {
                continue;
            };
            if job.input.trim().is_empty() {
                let mut fields = HashMap::new();
                fields.insert("status".into(), "error".into());
                fields.insert("error".into(), "No input path".into());
                self.registry.write_fields(&request_id, fields).await?;
                continue;
            }
            let Some(backend) = self.fleet.client_for(&server) else {
                continue;
            };
            let registry = self.registry.clone();
            let objectstore = self.objectstore.clone();
            let sms = self.sms.clone();
            tracing::info!("activating job {request_id} on {server}");
            handles.push(tokio::spawn(run_job(
                server, job, registry, backend, objectstore, sms,
            )));
        }
        Ok(handles)
    }
}

/// The queued job with the lexicographically smallest `enqueued_at`
/// (ISO-8601 ordering is chronological ordering); ties broken by
/// `request_id` for a deterministic activation order.
fn oldest_of(queued: &HashMap<String, DateTime<Utc>>) -> Option<String> {
    queued
        .iter()
        .min_by(|(id_a, at_a), (id_b, at_b)| at_a.cmp(at_b).then_with(|| id_a.cmp(id_b)))
        .map(|(id, _)| id.clone())
}
