use crate::actor::{NodeClient, WeakNodeClient};
use crate::cluster::Endpoint;
use crate::transport::{PeerMessage, Transport};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// InMemoryNetwork connects nodes running in one process. Links can be cut to simulate network
/// partitions. Messages on a cut link are dropped.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    inner: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<Endpoint, WeakNodeClient>,
    // Directed links (from, to).
    cut_links: HashSet<(Endpoint, Endpoint)>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        InMemoryNetwork::default()
    }

    pub fn register(&self, endpoint: Endpoint, client: &NodeClient) {
        self.state().nodes.insert(endpoint, client.weak());
    }

    pub fn transport_for(&self, endpoint: Endpoint) -> InMemoryTransport {
        InMemoryTransport {
            from: endpoint,
            network: self.clone(),
        }
    }

    /// Cuts both directions between `a` and `b`.
    pub fn partition(&self, a: Endpoint, b: Endpoint) {
        let mut state = self.state();
        state.cut_links.insert((a, b));
        state.cut_links.insert((b, a));
    }

    /// Cuts every link to and from `endpoint`.
    pub fn isolate(&self, endpoint: Endpoint) {
        let mut state = self.state();
        let others: Vec<Endpoint> = state.nodes.keys().filter(|e| **e != endpoint).cloned().collect();
        for other in others {
            state.cut_links.insert((endpoint, other));
            state.cut_links.insert((other, endpoint));
        }
    }

    pub fn heal_all(&self) {
        self.state().cut_links.clear();
    }

    fn route(&self, from: Endpoint, to: Endpoint) -> Option<WeakNodeClient> {
        let state = self.state();
        if state.cut_links.contains(&(from, to)) {
            return None;
        }
        state.nodes.get(&to).cloned()
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InMemoryTransport {
    from: Endpoint,
    network: InMemoryNetwork,
}

impl Transport for InMemoryTransport {
    fn send(&self, to: Endpoint, message: PeerMessage) {
        if let Some(client) = self.network.route(self.from, to) {
            tokio::spawn(async move {
                let _ = client.deliver_peer_message(message).await;
            });
        }
    }
}
