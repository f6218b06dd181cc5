use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use broker_core::ProgressEvent;
use tokio::sync::mpsc;

use crate::registry::JobRegistry;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Consumes [`ProgressEvent`]s for one running job and writes the
/// `percent, step, max, node, queue_remaining` fields to its registry hash.
///
/// Write-idempotent and safe to drop events: only the latest state is ever
/// kept, there is no event log, and a dropped event is simply superseded by
/// the next one. Debounces bursts to one write per [`DEBOUNCE`] window so a
/// chatty backend cannot starve the store with hash writes, mirroring the
/// write-behind pattern used elsewhere in this codebase for progress
/// bookkeeping.
pub struct ProgressRelay {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressRelay {
    /// Spawn the background writer task for `request_id` and return a
    /// handle that forwards events to it.
    pub fn spawn(registry: Arc<JobRegistry>, request_id: String) -> Self {
        let (tx, mut rx) = mpsc::channel::<ProgressEvent>(256);

        tokio::spawn(async move {
            let mut last_write = Instant::now() - DEBOUNCE;
            let mut pending: Option<HashMap<String, String>> = None;

            while let Some(event) = rx.recv().await {
                let done = matches!(event, ProgressEvent::Completed);
                if let Some(fields) = fields_for(event) {
                    pending = Some(fields);
                }
                let due = last_write.elapsed() >= DEBOUNCE;
                if (due || done) && pending.is_some() {
                    if let Some(fields) = pending.take() {
                        if let Err(e) = registry.write_fields(&request_id, fields).await {
                            tracing::warn!("progress write failed for {request_id}: {e}");
                        }
                        last_write = Instant::now();
                    }
                }
                if done {
                    break;
                }
            }
        });

        ProgressRelay { tx }
    }

    pub fn sender(&self) -> mpsc::Sender<ProgressEvent> {
        self.tx.clone()
    }
}

fn fields_for(event: ProgressEvent) -> Option<HashMap<String, String>> {
    let mut m = HashMap::new();
    match event {
        ProgressEvent::Started => return None,
        ProgressEvent::Tick {
            percent,
            step,
            max,
            node,
        } => {
            m.insert("percent".into(), percent.to_string());
            m.insert("step".into(), step.to_string());
            m.insert("max".into(), max.to_string());
            m.insert("node".into(), node);
        }
        ProgressEvent::QueueDepth { n } => {
            m.insert("queue_remaining".into(), n.to_string());
        }
        ProgressEvent::Completed => {
            m.insert("percent".into(), "100".into());
        }
    }
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_store::testing::MemoryStore;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn writes_latest_progress_to_the_registry() {
        let registry = Arc::new(JobRegistry::new(Arc::new(MemoryStore::new())));
        registry
            .create_job(&broker_core::SubmissionRecord {
                id: "job-1".into(),
                input: "in/1".into(),
                workflow_path: None,
            })
            .await
            .unwrap();

        let relay = ProgressRelay::spawn(registry.clone(), "job-1".into());
        let tx = relay.sender();
        tx.send(ProgressEvent::Tick {
            percent: 42.0,
            step: 3,
            max: 10,
            node: "sampler".into(),
        })
        .await
        .unwrap();
        tx.send(ProgressEvent::Completed).await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let job = registry.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(job.percent, 100.0);
    }
}
