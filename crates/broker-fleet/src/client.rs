use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use broker_core::{BrokerConfig, ProgressEvent, GENERATION_TIMEOUT_SECS, PROBE_TIMEOUT_SECS};
use futures_util::StreamExt;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BackendError;

/// The recipe-side knobs a backend client needs to mutate a workflow
/// template per job: where to find the default template, and which node
/// ids play the image-load, sampler, and text roles.
#[derive(Debug, Clone)]
pub struct RecipeConfig {
    pub default_recipe_path: String,
    pub node_sampler: String,
    pub node_image: String,
    pub node_text: String,
}

impl From<&BrokerConfig> for RecipeConfig {
    fn from(config: &BrokerConfig) -> Self {
        RecipeConfig {
            default_recipe_path: config.default_recipe_path.clone(),
            node_sampler: config.node_sampler.clone(),
            node_image: config.node_image.clone(),
            node_text: config.node_text.clone(),
        }
    }
}

/// Reachability of one backend as reported by [`BackendClient::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ok,
    Unreachable,
}

/// One inference server. Implementations talk to exactly one backend
/// address; the [`crate::FleetView`] fans this out across the configured
/// fleet.
#[async_trait]
pub trait BackendClient: Send + Sync {
    fn address(&self) -> &str;

    /// Open a control channel and await the server's initial status frame
    /// within [`broker_core::PROBE_TIMEOUT_SECS`].
    async fn probe(&self) -> Probe;

    /// Current server-side queue length; 0 means idle.
    async fn available_capacity(&self) -> Result<i64, BackendError>;

    /// Submit `input_bytes` under `workflow_path` (or the server's default
    /// recipe) and drive it to completion, forwarding every progress event
    /// to `progress_tx` as it arrives. Returns the final output bytes.
    ///
    /// Enforces an overall wall-clock timeout of
    /// [`broker_core::GENERATION_TIMEOUT_SECS`]; on expiry returns
    /// [`BackendError::Timeout`].
    async fn generate(
        &self,
        input_bytes: Vec<u8>,
        workflow_path: Option<&str>,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<Vec<u8>, BackendError>;
}

/// An HTTP [`BackendClient`] talking to one ComfyUI-shaped inference
/// server: `GET /status` (control channel), `POST /prompt` (submit),
/// `GET /progress/{id}` (server-sent-events stream), `GET /view/{id}`
/// (output fetch).
pub struct HttpBackendClient {
    address: String,
    http: Client,
    recipe: RecipeConfig,
    templates: Mutex<HashMap<String, Value>>,
}

impl HttpBackendClient {
    pub fn new(address: impl Into<String>, recipe: RecipeConfig) -> Self {
        HttpBackendClient {
            address: address.into(),
            http: Client::new(),
            recipe,
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// Parse `path` once and cache the result; every subsequent job
    /// mutates its own clone of the cached tree rather than the template
    /// itself.
    async fn load_template(&self, path: &str) -> Result<Value, BackendError> {
        if let Some(cached) = self.templates.lock().unwrap().get(path) {
            return Ok(cached.clone());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BackendError::Recipe(path.to_string(), e.to_string()))?;
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| BackendError::Recipe(path.to_string(), e.to_string()))?;
        self.templates
            .lock()
            .unwrap()
            .insert(path.to_string(), parsed.clone());
        Ok(parsed)
    }

    /// Substitute the uploaded input into the image-load node and draw a
    /// fresh random seed for the sampler node. The text node's value is
    /// left as the recipe already has it: neither a submission nor a job
    /// carries per-job prompt text, so "as dictated by the recipe" is the
    /// recipe's own node-id mapping, not a value this client supplies.
    fn mutate_for_job(&self, mut template: Value, input_bytes: &[u8]) -> Value {
        let seed: u64 = rand::rng().random();
        if let Some(image_node) = template.get_mut(&self.recipe.node_image) {
            image_node["inputs"]["image"] = Value::String(BASE64.encode(input_bytes));
        }
        if let Some(sampler_node) = template.get_mut(&self.recipe.node_sampler) {
            sampler_node["inputs"]["seed"] = Value::from(seed);
        }
        if template.get(&self.recipe.node_text).is_none() {
            tracing::warn!(node = %self.recipe.node_text, "recipe has no text node at configured id");
        }
        template
    }

    async fn generate_inner(
        &self,
        input_bytes: Vec<u8>,
        workflow_path: Option<&str>,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<Vec<u8>, BackendError> {
        let recipe_path = workflow_path.unwrap_or(&self.recipe.default_recipe_path);
        let template = self.load_template(recipe_path).await?;
        let body = self.mutate_for_job(template, &input_bytes);

        let submit_url = format!("{}/prompt", self.address);
        let resp = self
            .http
            .post(&submit_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        let submitted: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        let prompt_id = submitted
            .get("prompt_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let _ = progress_tx.try_send(ProgressEvent::Started);

        let progress_url = format!("{}/progress/{}", self.address, prompt_id);
        let resp = self
            .http
            .get(&progress_url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_start_matches("data: ").trim().to_string();
                buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if let Ok(event) = serde_json::from_str::<ProgressEvent>(&line) {
                    let done = matches!(event, ProgressEvent::Completed);
                    let _ = progress_tx.try_send(event);
                    if done {
                        break;
                    }
                }
            }
        }

        let view_url = format!("{}/view/{}", self.address, prompt_id);
        let resp = self
            .http
            .get(&view_url)
            .send()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn probe(&self) -> Probe {
        let url = format!("{}/status", self.address);
        let result = tokio::time::timeout(
            Duration::from_secs(PROBE_TIMEOUT_SECS),
            self.http.get(&url).send(),
        )
        .await;
        match result {
            Ok(Ok(resp)) if resp.status().is_success() => Probe::Ok,
            _ => Probe::Unreachable,
        }
    }

    async fn available_capacity(&self) -> Result<i64, BackendError> {
        let url = format!("{}/status", self.address);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(self.address.clone(), e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Transport(self.address.clone(), e.to_string()))?;
        Ok(body.get("queue_len").and_then(|v| v.as_i64()).unwrap_or(0))
    }

    async fn generate(
        &self,
        input_bytes: Vec<u8>,
        workflow_path: Option<&str>,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<Vec<u8>, BackendError> {
        let fut = self.generate_inner(input_bytes, workflow_path, progress_tx);
        tokio::time::timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS), fut)
            .await
            .map_err(|_| BackendError::Timeout(self.address.clone(), GENERATION_TIMEOUT_SECS))?
    }
}
