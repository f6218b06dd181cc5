//! End-to-end scenario tests for the dispatch loop, run entirely against
//! in-memory fakes (no Redis, no real backend, no real object store).

use std::sync::Arc;
use std::time::Duration;

use broker_core::{JobStatus, SubmissionRecord};
use broker_fleet::testing::MockBackend;
use broker_fleet::{BackendClient, FleetView};
use broker_objectstore::testing::MemoryObjectStore;
use broker_objectstore::ObjectStore;
use broker_store::testing::MemoryStore;
use chrono::Utc;

use crate::{DispatchLoop, DispatchPolicy, JobRegistry};

fn make_loop(backends: Vec<Arc<dyn BackendClient>>) -> (DispatchLoop, Arc<JobRegistry>, Arc<MemoryObjectStore>) {
    let registry = Arc::new(JobRegistry::new(Arc::new(MemoryStore::new())));
    let fleet = Arc::new(FleetView::new(backends));
    let objectstore = Arc::new(MemoryObjectStore::new());
    let dispatch = DispatchLoop::new(
        registry.clone(),
        fleet,
        objectstore.clone(),
        None,
        DispatchPolicy::default(),
    );
    (dispatch, registry, objectstore)
}

#[tokio::test]
async fn happy_path_one_job_one_server() {
    let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::new("s1").with_capacity(0));
    let (mut dispatch, registry, objectstore) = make_loop(vec![backend]);
    objectstore.seed("in/abc", vec![0x01]);
    registry
        .enqueue_submission(&SubmissionRecord {
            id: "abc".into(),
            input: "in/abc".into(),
            workflow_path: None,
        })
        .await
        .unwrap();

    let handles = dispatch.tick(Utc::now()).await;
    for h in handles {
        h.await.unwrap();
    }

    let job = registry.get_job("abc").await.unwrap().expect("job exists");
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.output.is_some());
    assert_eq!(job.attempt, 1);
    assert_eq!(job.percent, 100.0);
    assert!(registry.avg_processing_time(80.0).await.is_ok());
}

#[tokio::test]
async fn retry_then_success() {
    let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::fail_then_succeed().with_capacity(0));
    let (mut dispatch, registry, objectstore) = make_loop(vec![backend]);
    objectstore.seed("in/abc", vec![0x01]);
    registry
        .enqueue_submission(&SubmissionRecord {
            id: "abc".into(),
            input: "in/abc".into(),
            workflow_path: None,
        })
        .await
        .unwrap();

    // tick 1: activate attempt 1, backend fails it.
    for h in dispatch.tick(Utc::now()).await {
        h.await.unwrap();
    }
    assert_eq!(
        registry.get_job("abc").await.unwrap().unwrap().status,
        JobStatus::Failed
    );

    // tick 2: reconcile turns failed -> queued, attempt 2 (not yet re-activated).
    for h in dispatch.tick(Utc::now()).await {
        h.await.unwrap();
    }
    let job = registry.get_job("abc").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt, 2);

    // tick 3: reconcile notices it's queued, activate retries it, backend succeeds.
    for h in dispatch.tick(Utc::now()).await {
        h.await.unwrap();
    }
    let job = registry.get_job("abc").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempt, 2);
}

#[tokio::test]
async fn attempt_exhaustion_after_three_failures() {
    let backend: Arc<dyn BackendClient> = Arc::new(MockBackend::always_fail().with_capacity(0));
    let (mut dispatch, registry, objectstore) = make_loop(vec![backend]);
    objectstore.seed("in/abc", vec![0x01]);
    registry
        .enqueue_submission(&SubmissionRecord {
            id: "abc".into(),
            input: "in/abc".into(),
            workflow_path: None,
        })
        .await
        .unwrap();

    // attempt 1 fails, then 5 more ticks alternate reconcile/activate until exhausted.
    for _ in 0..6 {
        for h in dispatch.tick(Utc::now()).await {
            h.await.unwrap();
        }
    }

    let job = registry.get_job("abc").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.attempt, 4);
}

#[tokio::test]
async fn watchdog_reaps_stale_processing_job() {
    let (mut dispatch, registry, _objectstore) = make_loop(vec![]);
    let sub = SubmissionRecord {
        id: "stuck".into(),
        input: "in/stuck".into(),
        workflow_path: None,
    };
    registry.create_job(&sub).await.unwrap();
    let mut fields = std::collections::HashMap::new();
    fields.insert("status".into(), "processing".into());
    fields.insert("server".into(), "dead-server".into());
    fields.insert(
        "proc_start_at".into(),
        (Utc::now() - chrono::Duration::seconds(400)).to_rfc3339(),
    );
    registry.write_fields("stuck", fields).await.unwrap();

    dispatch.tick(Utc::now()).await;
    let job = registry.get_job("stuck").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Timeout while processing"));

    dispatch.tick(Utc::now()).await;
    let job = registry.get_job("stuck").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempt, 2);
}

#[tokio::test]
async fn fifo_activation_across_two_servers() {
    let s1: Arc<dyn BackendClient> = Arc::new(MockBackend::new("s1").with_capacity(0));
    let s2: Arc<dyn BackendClient> = Arc::new(MockBackend::new("s2").with_capacity(0));
    let (mut dispatch, registry, objectstore) = make_loop(vec![s1, s2]);
    for id in ["j1", "j2", "j3"] {
        objectstore.seed(&format!("in/{id}"), vec![0x01]);
        registry
            .enqueue_submission(&SubmissionRecord {
                id: id.into(),
                input: format!("in/{id}"),
                workflow_path: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let handles = dispatch.tick(Utc::now()).await;
    assert_eq!(handles.len(), 2, "only two idle servers, two activations expected");
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(
        registry.get_job("j1").await.unwrap().unwrap().status,
        JobStatus::Done
    );
    assert_eq!(
        registry.get_job("j2").await.unwrap().unwrap().status,
        JobStatus::Done
    );
    assert_eq!(
        registry.get_job("j3").await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    let handles = dispatch.tick(Utc::now()).await;
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(
        registry.get_job("j3").await.unwrap().unwrap().status,
        JobStatus::Done
    );
}

#[tokio::test]
async fn invalid_input_is_terminal_without_contacting_a_backend() {
    let backend = Arc::new(MockBackend::new("s1").with_capacity(0));
    let backend_dyn: Arc<dyn BackendClient> = backend.clone();
    let (mut dispatch, registry, _objectstore) = make_loop(vec![backend_dyn]);
    registry
        .enqueue_submission(&SubmissionRecord {
            id: "bad".into(),
            input: "".into(),
            workflow_path: None,
        })
        .await
        .unwrap();

    let handles = dispatch.tick(Utc::now()).await;
    assert!(handles.is_empty(), "an invalid-input job must not be activated");

    let job = registry.get_job("bad").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.as_deref(), Some("No input path"));
    assert_eq!(backend.call_count(), 0);
}
