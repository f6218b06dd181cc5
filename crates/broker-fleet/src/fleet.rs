use std::sync::Arc;

use futures_util::future::join_all;

use crate::client::{BackendClient, Probe};

/// Holds the configured addresses of up to four backends (the fleet size is
/// static per process) and answers "which servers can accept a job now?"
///
/// Grounded on the registry-plus-liveness-probe shape of a fleet manager,
/// but deliberately stateless between calls: a server may finish a job
/// between dispatch ticks, so readiness is never cached.
pub struct FleetView {
    clients: Vec<Arc<dyn BackendClient>>,
}

impl FleetView {
    pub fn new(clients: Vec<Arc<dyn BackendClient>>) -> Self {
        FleetView { clients }
    }

    /// Addresses currently reporting `ok` AND idle (`available_capacity() == 0`).
    pub async fn idle_servers(&self) -> Vec<String> {
        let checks = self.clients.iter().map(|c| async move {
            if c.probe().await != Probe::Ok {
                return None;
            }
            match c.available_capacity().await {
                Ok(0) => Some(c.address().to_string()),
                _ => None,
            }
        });
        join_all(checks).await.into_iter().flatten().collect()
    }

    pub fn client_for(&self, address: &str) -> Option<Arc<dyn BackendClient>> {
        self.clients.iter().find(|c| c.address() == address).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[tokio::test]
    async fn idle_servers_excludes_unreachable_and_busy() {
        let idle = Arc::new(MockBackend::new("idle").with_capacity(0));
        let busy = Arc::new(MockBackend::new("busy").with_capacity(3));
        let down = Arc::new(MockBackend::new("down").unreachable());
        let fleet = FleetView::new(vec![idle.clone(), busy.clone(), down.clone()]);
        let idle_now = fleet.idle_servers().await;
        assert_eq!(idle_now, vec!["idle".to_string()]);
    }

    #[tokio::test]
    async fn client_for_returns_matching_address() {
        let a = Arc::new(MockBackend::new("a"));
        let fleet = FleetView::new(vec![a.clone()]);
        assert!(fleet.client_for("a").is_some());
        assert!(fleet.client_for("missing").is_none());
    }
}
