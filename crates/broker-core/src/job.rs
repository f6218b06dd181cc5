use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Job`].
///
/// Transitions are monotone except `Failed -> Queued` (retry) and
/// `Processing -> Failed` (a generation attempt errored out). `Done` and
/// `Error` are terminal and never re-entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// An ephemeral submission queue element, destroyed once the dispatch loop
/// promotes it into a [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_path: Option<String>,
}

/// The in-store representation of one user submission.
///
/// This struct is the typed view; the store itself holds it as a flat
/// string-to-string hash at key `job:{request_id}` (see
/// [`Job::to_fields`]/[`Job::from_fields`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub request_id: String,
    pub status: JobStatus,
    pub input: String,
    pub output: Option<String>,
    pub workflow_path: Option<String>,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub proc_start_at: Option<DateTime<Utc>>,
    pub server: Option<String>,
    pub percent: f64,
    pub step: i64,
    pub max: i64,
    pub node: String,
    pub queue_remaining: i64,
    pub error: Option<String>,
    pub phone: Option<String>,
    pub sms_status: Option<String>,
}

impl Job {
    /// Construct a freshly-queued job from a drained submission record.
    pub fn new_queued(sub: &SubmissionRecord, now: DateTime<Utc>) -> Self {
        Job {
            request_id: sub.id.clone(),
            status: JobStatus::Queued,
            input: sub.input.clone(),
            output: None,
            workflow_path: sub.workflow_path.clone(),
            attempt: 1,
            enqueued_at: now,
            proc_start_at: None,
            server: None,
            percent: 0.0,
            step: 0,
            max: 0,
            node: String::new(),
            queue_remaining: -1,
            error: None,
            phone: None,
            sms_status: None,
        }
    }

    /// Key under which this job's hash is stored.
    pub fn store_key(request_id: &str) -> String {
        format!("job:{request_id}")
    }

    /// Flatten to the string-valued field map the store adapter persists.
    /// Absent optional fields are omitted entirely rather than written as
    /// the literal string `"none"`.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("request_id".into(), self.request_id.clone());
        m.insert("status".into(), self.status.to_string());
        m.insert("input".into(), self.input.clone());
        if let Some(v) = &self.output {
            m.insert("output".into(), v.clone());
        }
        if let Some(v) = &self.workflow_path {
            m.insert("workflow_path".into(), v.clone());
        }
        m.insert("attempt".into(), self.attempt.to_string());
        m.insert("enqueued_at".into(), self.enqueued_at.to_rfc3339());
        if let Some(v) = &self.proc_start_at {
            m.insert("proc_start_at".into(), v.to_rfc3339());
        }
        if let Some(v) = &self.server {
            m.insert("server".into(), v.clone());
        }
        m.insert("percent".into(), self.percent.to_string());
        m.insert("step".into(), self.step.to_string());
        m.insert("max".into(), self.max.to_string());
        m.insert("node".into(), self.node.clone());
        m.insert("queue_remaining".into(), self.queue_remaining.to_string());
        if let Some(v) = &self.error {
            m.insert("error".into(), v.clone());
        }
        if let Some(v) = &self.phone {
            m.insert("phone".into(), v.clone());
        }
        if let Some(v) = &self.sms_status {
            m.insert("sms_status".into(), v.clone());
        }
        m
    }

    /// Reconstruct a typed `Job` from the flat field map. Returns `None` if
    /// required fields are missing or malformed.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Job> {
        let request_id = fields.get("request_id")?.clone();
        let status = fields.get("status")?.parse::<JobStatus>().ok()?;
        let input = fields.get("input").cloned().unwrap_or_default();
        let enqueued_at = fields
            .get("enqueued_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;
        let proc_start_at = fields
            .get("proc_start_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(Job {
            request_id,
            status,
            input,
            output: fields.get("output").cloned(),
            workflow_path: fields.get("workflow_path").cloned(),
            attempt: fields
                .get("attempt")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            enqueued_at,
            proc_start_at,
            server: fields.get("server").cloned(),
            percent: fields
                .get("percent")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
            step: fields.get("step").and_then(|s| s.parse().ok()).unwrap_or(0),
            max: fields.get("max").and_then(|s| s.parse().ok()).unwrap_or(0),
            node: fields.get("node").cloned().unwrap_or_default(),
            queue_remaining: fields
                .get("queue_remaining")
                .and_then(|s| s.parse().ok())
                .unwrap_or(-1),
            error: fields.get("error").cloned(),
            phone: fields.get("phone").cloned(),
            sms_status: fields.get("sms_status").cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for s in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Error,
        ] {
            let rendered = s.to_string();
            assert_eq!(rendered.parse::<JobStatus>().unwrap(), s);
        }
    }

    #[test]
    fn omitted_optional_fields_never_become_the_string_none() {
        let sub = SubmissionRecord {
            id: "abc".into(),
            input: "input/abc".into(),
            workflow_path: None,
        };
        let job = Job::new_queued(&sub, Utc::now());
        let fields = job.to_fields();
        assert!(!fields.contains_key("workflow_path"));
        assert!(!fields.values().any(|v| v == "none"));
    }

    #[test]
    fn round_trips_through_fields() {
        let sub = SubmissionRecord {
            id: "abc".into(),
            input: "input/abc".into(),
            workflow_path: Some("wf.json".into()),
        };
        let job = Job::new_queued(&sub, Utc::now());
        let fields = job.to_fields();
        let restored = Job::from_fields(&fields).expect("round trip");
        assert_eq!(restored.request_id, job.request_id);
        assert_eq!(restored.status, job.status);
        assert_eq!(restored.workflow_path, job.workflow_path);
    }
}
