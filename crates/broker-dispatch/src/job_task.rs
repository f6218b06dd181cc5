use std::collections::HashMap;
use std::sync::Arc;

use broker_core::Job;
use broker_fleet::{BackendClient, BackendError};
use broker_objectstore::ObjectStore;
use broker_sms::SmsClient;
use chrono::Utc;

use crate::registry::JobRegistry;
use crate::relay::ProgressRelay;

/// Drives one activated job from `processing` to a terminal-for-this-attempt
/// state (`done` or `failed`). Any failure in steps 2-7 below is caught and
/// recorded as `status=failed`; `error` is reserved for attempt exhaustion,
/// which is decided by `reconcile_registry`, not here.
#[tracing::instrument(skip(registry, backend, objectstore, sms), fields(request_id = %job.request_id, server = %server))]
pub async fn run_job(
    server: String,
    job: Job,
    registry: Arc<JobRegistry>,
    backend: Arc<dyn BackendClient>,
    objectstore: Arc<dyn ObjectStore>,
    sms: Option<Arc<SmsClient>>,
) {
    let request_id = job.request_id.clone();
    let proc_start_at = Utc::now();

    let mut fields = HashMap::new();
    fields.insert("status".into(), "processing".into());
    fields.insert("server".into(), server.clone());
    fields.insert("proc_start_at".into(), proc_start_at.to_rfc3339());
    fields.insert("percent".into(), "0".into());
    fields.insert("step".into(), "0".into());
    fields.insert("max".into(), "0".into());
    fields.insert("node".into(), String::new());
    fields.insert("queue_remaining".into(), "-1".into());
    if let Err(e) = registry.write_fields(&request_id, fields).await {
        tracing::error!("failed to write processing state for {request_id}: {e}");
        return;
    }

    let input_bytes = match objectstore.download(&job.input).await {
        Ok(bytes) => bytes,
        Err(e) => {
            fail(&registry, &request_id, format!("download_input_failed: {e}")).await;
            return;
        }
    };

    let relay = ProgressRelay::spawn(registry.clone(), request_id.clone());
    let generate_result = backend
        .generate(input_bytes, job.workflow_path.as_deref(), relay.sender())
        .await;

    let output_bytes = match generate_result {
        Ok(bytes) => bytes,
        Err(BackendError::Timeout(_, _)) => {
            fail(&registry, &request_id, "comfyui_timeout_while_generating".into()).await;
            return;
        }
        Err(e) => {
            fail(&registry, &request_id, format!("generate_error: {e}")).await;
            return;
        }
    };

    let key_prefix = format!("output/{request_id}");
    let url = match objectstore.upload(&output_bytes, &key_prefix).await {
        Ok(key) => match objectstore.presigned_url(&key, 3600).await {
            Ok(url) => url,
            Err(e) => {
                fail(&registry, &request_id, format!("presign_failed: {e}")).await;
                return;
            }
        },
        Err(e) => {
            fail(&registry, &request_id, format!("upload_output_failed: {e}")).await;
            return;
        }
    };

    let duration_secs = (Utc::now() - proc_start_at).num_milliseconds() as f64 / 1000.0;
    if let Err(e) = registry.record_processing_duration(duration_secs.max(0.0)).await {
        tracing::warn!("failed to record processing duration for {request_id}: {e}");
    }

    let mut fields = HashMap::new();
    fields.insert("status".into(), "done".into());
    fields.insert("output".into(), url);
    fields.insert("percent".into(), "100".into());
    if let Err(e) = registry.write_fields(&request_id, fields).await {
        tracing::error!("failed to write done state for {request_id}: {e}");
        return;
    }
    tracing::info!("job {request_id} done on {server} in {duration_secs:.1}s");

    if let Some(phone) = job.phone.as_deref() {
        let status = match &sms {
            Some(client) => match client.send(phone, "Your image is ready").await {
                Ok(()) => "sent",
                Err(e) => {
                    tracing::warn!("sms send failed for {request_id}: {e}");
                    "failed"
                }
            },
            None => "failed",
        };
        let mut fields = HashMap::new();
        fields.insert("sms_status".into(), status.into());
        if let Err(e) = registry.write_fields(&request_id, fields).await {
            tracing::warn!("failed to record sms_status for {request_id}: {e}");
        }
    }
}

async fn fail(registry: &JobRegistry, request_id: &str, error: String) {
    tracing::warn!("job {request_id} failed: {error}");
    let mut fields = HashMap::new();
    fields.insert("status".into(), "failed".into());
    fields.insert("error".into(), error);
    if let Err(e) = registry.write_fields(request_id, fields).await {
        tracing::error!("failed to record failure for {request_id}: {e}");
    }
}
