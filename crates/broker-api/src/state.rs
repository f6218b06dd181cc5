use std::sync::Arc;

use broker_core::BrokerConfig;
use broker_dispatch::JobRegistry;
use broker_objectstore::ObjectStore;

/// Shared application state handed to every axum handler. Holds no
/// scheduling logic — the HTTP layer creates the initial `queued` job
/// record and enqueues its submission, then only reads job state as the
/// dispatch loop mutates it.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub objectstore: Arc<dyn ObjectStore>,
    pub config: Arc<BrokerConfig>,
}
