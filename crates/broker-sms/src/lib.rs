//! Client for the SMS gateway used to notify users when their job completes.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("sms gateway not configured")]
    NotConfigured,

    #[error("sms gateway request failed: {0}")]
    Request(String),
}

/// A configured SMS provider. Constructed once at startup from
/// `BROKER_SMS_URL`/`BROKER_SMS_KEY`; `None` disables sending entirely.
pub struct SmsClient {
    http: reqwest::Client,
    url: String,
    key: String,
}

impl SmsClient {
    /// `None` if the gateway is not configured — the caller should record
    /// `sms_status=failed` without attempting a request in that case.
    pub fn new(url: Option<String>, key: Option<String>) -> Option<Self> {
        Some(SmsClient {
            http: reqwest::Client::new(),
            url: url?,
            key: key?,
        })
    }

    pub async fn send(&self, phone: &str, message: &str) -> Result<(), SmsError> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&json!({ "to": phone, "message": message }))
            .send()
            .await
            .map_err(|e| SmsError::Request(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SmsError::Request(format!(
                "gateway returned {}",
                resp.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_gateway_yields_none() {
        assert!(SmsClient::new(None, Some("key".into())).is_none());
        assert!(SmsClient::new(Some("url".into()), None).is_none());
    }
}
