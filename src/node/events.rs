use crate::cluster::LogPosition;
use crate::election::ElectionsDone;
use crate::epoch::EpochRecord;
use crate::node_state::NodeCommand;
use tokio::sync::mpsc;

/// Something the clustering core decided or observed. Consumers see every event, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    Command(NodeCommand),
    ElectionsDone(ElectionsDone),
    EpochWritten(EpochRecord),
    /// Quorum durable position advanced. Writes up to here survive any minority failure.
    ReplicatedTo(LogPosition),
    /// Replicated and indexed. Writes up to here may be acknowledged to clients.
    CommittedTo(LogPosition),
    QuorumLost,
    QuorumRestored,
    /// This node failed to persist its own epoch and gave up leadership.
    ProcessFatal { reason: String },
    NodePriorityUpdated(i32),
    LeaderResignationInitiated,
}

pub(super) fn new() -> (NodeEventPublisher, NodeEventListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NodeEventPublisher { tx }, NodeEventListener { rx })
}

pub(crate) struct NodeEventPublisher {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeEventPublisher {
    pub(crate) fn publish(&self, event: NodeEvent) {
        // Nobody listening is fine.
        let _ = self.tx.send(event);
    }
}

/// Receiving end of a node's events. Buffers without limit, so a listener that stops reading grows
/// memory. Dropping it discards further events.
pub struct NodeEventListener {
    rx: mpsc::UnboundedReceiver<NodeEvent>,
}

impl NodeEventListener {
    /// `next_event()` returns the next event this node published, or `None` once the node is gone.
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<NodeEvent> {
        self.rx.try_recv().ok()
    }
}
