use crate::cluster::InstanceId;
use crate::node_state::VNodeState;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeStateSnapshot {
    pub state: VNodeState,
    pub leader: Option<InstanceId>,
}

pub(super) fn new(initial_state: NodeStateSnapshot) -> (NodeStateChangeNotifier, NodeStateChangeListener) {
    let (snd, rcv) = watch::channel(initial_state);

    (NodeStateChangeNotifier { snd }, NodeStateChangeListener { rcv })
}

pub(super) struct NodeStateChangeNotifier {
    snd: watch::Sender<NodeStateSnapshot>,
}

impl NodeStateChangeNotifier {
    pub(super) fn notify_new_state(&self, new_state: NodeStateSnapshot) {
        let _ = self.snd.send(new_state);
    }
}

/// Observes the node's role. Only the latest state is kept, intermediate states may be skipped.
#[derive(Clone)]
pub struct NodeStateChangeListener {
    rcv: watch::Receiver<NodeStateSnapshot>,
}

impl NodeStateChangeListener {
    pub fn current(&self) -> NodeStateSnapshot {
        self.rcv.borrow().clone()
    }

    /// Waits for the next state change. `None` once the node is gone.
    pub async fn next(&mut self) -> Option<NodeStateSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    /// Waits until a snapshot matches `predicate`, including the current one.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<NodeStateSnapshot>
    where
        F: Fn(&NodeStateSnapshot) -> bool,
    {
        let current = self.current();
        if predicate(&current) {
            return Some(current);
        }

        while let Some(snapshot) = self.next().await {
            if predicate(&snapshot) {
                return Some(snapshot);
            }
        }
        None
    }
}
