//! Scriptable [`BackendClient`] fake for dispatch-loop tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use broker_core::ProgressEvent;
use tokio::sync::mpsc;

use crate::client::{BackendClient, Probe};
use crate::error::BackendError;

enum Script {
    Succeed { output: Vec<u8> },
    Fail(String),
}

/// A backend whose `probe`/`available_capacity`/`generate` behavior is
/// entirely scripted, so dispatch-loop tests can exercise retry, attempt
/// exhaustion, and watchdog reap without a real server.
pub struct MockBackend {
    address: String,
    capacity: AtomicUsize,
    reachable: std::sync::atomic::AtomicBool,
    script: Mutex<Vec<Script>>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(address: impl Into<String>) -> Self {
        MockBackend {
            address: address.into(),
            capacity: AtomicUsize::new(0),
            reachable: std::sync::atomic::AtomicBool::new(true),
            script: Mutex::new(vec![Script::Succeed {
                output: vec![0xFF],
            }]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_capacity(self, n: usize) -> Self {
        self.capacity.store(n, Ordering::SeqCst);
        self
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    /// Replace the scripted sequence of outcomes for successive `generate`
    /// calls. The last entry repeats once exhausted.
    pub fn with_script(self, script: Vec<Script>) -> Self {
        *self.script.lock().unwrap() = script;
        self
    }

    pub fn fail_then_succeed() -> Self {
        MockBackend::new("mock").with_script(vec![
            Script::Fail("stubbed failure".into()),
            Script::Succeed { output: vec![1] },
        ])
    }

    pub fn always_fail() -> Self {
        MockBackend::new("mock").with_script(vec![Script::Fail("stubbed failure".into())])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    fn address(&self) -> &str {
        &self.address
    }

    async fn probe(&self) -> Probe {
        if self.reachable.load(Ordering::SeqCst) {
            Probe::Ok
        } else {
            Probe::Unreachable
        }
    }

    async fn available_capacity(&self) -> Result<i64, BackendError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable(
                self.address.clone(),
                "down".into(),
            ));
        }
        Ok(self.capacity.load(Ordering::SeqCst) as i64)
    }

    async fn generate(
        &self,
        _input_bytes: Vec<u8>,
        _workflow_path: Option<&str>,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<Vec<u8>, BackendError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let chosen = script.get(idx).unwrap_or_else(|| script.last().unwrap());
        let _ = progress_tx.try_send(ProgressEvent::Started);
        match chosen {
            Script::Succeed { output } => {
                let _ = progress_tx.try_send(ProgressEvent::Tick {
                    percent: 50.0,
                    step: 1,
                    max: 2,
                    node: "sampler".into(),
                });
                let _ = progress_tx.try_send(ProgressEvent::Completed);
                Ok(output.clone())
            }
            Script::Fail(msg) => Err(BackendError::Transport(self.address.clone(), msg.clone())),
        }
    }
}

pub use Script as MockScript;
