use axum::extract::{Multipart, Query, State};
use axum::Json;
use broker_core::SubmissionRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    request_id: String,
    position_in_queue: i64,
    estimated_wait_seconds: f64,
}

/// `POST /api/upload`: stores the input blob, creates `job:{id}` with
/// `status=queued`, pushes a submission, and reports the caller's place in
/// line.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut input_bytes: Option<Vec<u8>> = None;
    let mut workflow_path: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "input" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                input_bytes = Some(data.to_vec());
            }
            "workflow_path" => {
                workflow_path = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let input_bytes = input_bytes.ok_or_else(|| ApiError::BadRequest("missing input file".into()))?;
    let request_id = Uuid::new_v4().to_string();
    let key = state
        .objectstore
        .upload(&input_bytes, &format!("input/{request_id}"))
        .await?;

    let sub = SubmissionRecord {
        id: request_id.clone(),
        input: key,
        workflow_path,
    };
    // Create the job hash before queuing the submission: a client polling
    // `/api/result` or `/api/jobs/{id}/progress` right after this response
    // must see `status=queued`, not a 404, while it waits for the next
    // dispatch tick to drain the submission.
    state.registry.create_job(&sub).await?;
    state.registry.enqueue_submission(&sub).await?;

    let position_in_queue = state.registry.pending_submission_count().await?;
    let estimated_wait_seconds = state.registry.estimated_wait_seconds(&state.config).await?;

    Ok(Json(UploadResponse {
        request_id,
        position_in_queue,
        estimated_wait_seconds,
    }))
}

#[derive(Deserialize)]
pub struct ResultQuery {
    request_id: String,
}

#[derive(Serialize)]
pub struct ResultResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `GET /api/result?request_id=...`
pub async fn result(
    State(state): State<AppState>,
    Query(q): Query<ResultQuery>,
) -> Result<Json<ResultResponse>, ApiError> {
    let job = state
        .registry
        .get_job(&q.request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(q.request_id.clone()))?;

    Ok(Json(ResultResponse {
        status: job.status.to_string(),
        image_url: job.output,
        error: job.error,
    }))
}

#[derive(Deserialize)]
pub struct NotifyForm {
    request_id: String,
    phone: String,
}

/// `POST /api/notify` form `{request_id, phone}`: validates E.164 and
/// records the phone number on the job. The HTTP layer is the sole mutator
/// of `phone`.
pub async fn notify(
    State(state): State<AppState>,
    axum::Form(form): axum::Form<NotifyForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !is_e164(&form.phone) {
        return Err(ApiError::BadRequest(format!(
            "not a valid E.164 number: {}",
            form.phone
        )));
    }
    state
        .registry
        .get_job(&form.request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(form.request_id.clone()))?;

    let mut fields = std::collections::HashMap::new();
    fields.insert("phone".into(), form.phone);
    state.registry.write_fields(&form.request_id, fields).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Serialize)]
pub struct ProgressResponse {
    percent: f64,
    step: i64,
    max: i64,
    node: String,
    queue_remaining: i64,
}

/// `GET /api/jobs/{id}/progress`
pub async fn progress(
    State(state): State<AppState>,
    axum::extract::Path(request_id): axum::extract::Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let job = state
        .registry
        .get_job(&request_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(request_id))?;

    Ok(Json(ProgressResponse {
        percent: job.percent,
        step: job.step,
        max: job.max,
        node: job.node,
        queue_remaining: job.queue_remaining,
    }))
}

/// `GET /healthz`: liveness probe for the process itself.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Minimal E.164 check: a leading `+` followed by 8-15 digits.
fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e164_validation() {
        assert!(is_e164("+14155552671"));
        assert!(!is_e164("14155552671"));
        assert!(!is_e164("+1"));
        assert!(!is_e164("+abc15552671"));
    }
}
