//! Job broker entry point.
//!
//! Loads configuration from the environment, wires up the store, fleet,
//! object store, and SMS collaborators, spawns the dispatch loop in the
//! background, and serves the HTTP surface in the foreground.

use std::sync::Arc;

use broker_api::{build_router, AppState};
use broker_core::BrokerConfig;
use broker_dispatch::{DispatchLoop, DispatchPolicy, JobRegistry};
use broker_fleet::{FleetView, HttpBackendClient, RecipeConfig};
use broker_objectstore::ObjectStore;
use broker_sms::SmsClient;
use broker_store::{RedisStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BrokerConfig::from_env();
    tracing::info!(bind_addr = %config.bind_addr, backends = config.backend_addrs.len(), "starting job broker");

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store_url).await?);
    let registry = Arc::new(JobRegistry::new(store));

    let recipe = RecipeConfig::from(&config);
    let clients = config
        .backend_addrs
        .iter()
        .map(|addr| {
            Arc::new(HttpBackendClient::new(addr.clone(), recipe.clone()))
                as Arc<dyn broker_fleet::BackendClient>
        })
        .collect();
    let fleet = Arc::new(FleetView::new(clients));

    let objectstore: Arc<dyn ObjectStore> = if config.s3_enabled() {
        let region = config.s3_region.clone().expect("checked by s3_enabled");
        let bucket = config.s3_bucket.clone().expect("checked by s3_enabled");
        Arc::new(broker_objectstore::S3ObjectStore::new(&region, &bucket).await)
    } else {
        Arc::new(broker_objectstore::FsObjectStore::new(
            config.static_dir.clone(),
            format!("http://{}", config.bind_addr),
        ))
    };

    let sms = SmsClient::new(config.sms_url.clone(), config.sms_key.clone()).map(Arc::new);

    let dispatch_loop = DispatchLoop::new(
        registry.clone(),
        fleet,
        objectstore.clone(),
        sms,
        DispatchPolicy::default(),
    );
    tokio::spawn(dispatch_loop.run());

    let state = AppState {
        registry,
        objectstore,
        config: Arc::new(config.clone()),
    };
    let app = build_router(state);

    tracing::info!("listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
