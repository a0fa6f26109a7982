use crate::actor::{Callback, Event, TimerEvent};
use crate::cluster::{ClusterInfo, LogPosition, MemberInfo};
use crate::epoch::EpochRecord;
use crate::node::NodeStatus;
use crate::node_state::CorrelationId;
use crate::replication::{
    ReplicaWriteAck, SubscribeReplicaError, SubscribeReplicaInput, SubscribeReplicaOutput, SubscriptionId,
};
use crate::transport::PeerMessage;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, thiserror::Error)]
pub enum NodeClientError {
    #[error("Node actor is dead RIP")]
    ActorExited,
}

/// NodeClient is the handle for talking to a node. The node's event loop runs as long as at least
/// one NodeClient exists.
#[derive(Clone)]
pub struct NodeClient {
    sender: mpsc::Sender<Event>,
}

/// WeakNodeClient doesn't keep the node alive. Timers and the transport hold these.
#[derive(Clone)]
pub struct WeakNodeClient {
    sender: mpsc::WeakSender<Event>,
}

impl NodeClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (NodeClient { sender: tx }, rx)
    }

    pub fn weak(&self) -> WeakNodeClient {
        WeakNodeClient {
            sender: self.sender.downgrade(),
        }
    }

    pub async fn system_start(&self) -> Result<(), NodeClientError> {
        self.send(Event::SystemStart).await
    }

    pub async fn request_shutdown(&self) -> Result<(), NodeClientError> {
        self.send(Event::RequestShutdown).await
    }

    pub async fn deliver_peer_message(&self, message: PeerMessage) -> Result<(), NodeClientError> {
        self.send(Event::Peer(message)).await
    }

    pub async fn gossip_updated(&self, cluster_info: ClusterInfo) -> Result<(), NodeClientError> {
        self.send(Event::GossipUpdated(cluster_info)).await
    }

    pub async fn leader_found(&self, leader: MemberInfo) -> Result<(), NodeClientError> {
        self.send(Event::LeaderFound(leader)).await
    }

    pub async fn set_node_priority(&self, node_priority: i32) -> Result<(), NodeClientError> {
        self.send(Event::SetNodePriority(node_priority)).await
    }

    pub async fn resign_node(&self) -> Result<(), NodeClientError> {
        self.send(Event::ResignNode).await
    }

    pub async fn writer_checkpoint_flushed(&self, position: LogPosition) -> Result<(), NodeClientError> {
        self.send(Event::WriterCheckpointFlushed(position)).await
    }

    pub async fn chaser_checkpoint(&self, position: LogPosition) -> Result<(), NodeClientError> {
        self.send(Event::ChaserCheckpoint(position)).await
    }

    pub async fn chaser_caught_up(&self, correlation_id: CorrelationId) -> Result<(), NodeClientError> {
        self.send(Event::ChaserCaughtUp(correlation_id)).await
    }

    pub async fn indexed_to(&self, position: LogPosition) -> Result<(), NodeClientError> {
        self.send(Event::IndexedTo(position)).await
    }

    pub async fn replicated_epoch(&self, epoch: EpochRecord) -> Result<(), NodeClientError> {
        self.send(Event::ReplicatedEpoch(epoch)).await
    }

    /// The local log was cut back to `position`, e.g. after a leader answered a subscription with
    /// `truncate_to`. Checkpoints and epochs past it are forgotten before the node votes again.
    pub async fn log_truncated(&self, position: LogPosition) -> Result<(), NodeClientError> {
        self.send(Event::LogTruncated(position)).await
    }

    pub async fn subscribe_replica(
        &self,
        input: SubscribeReplicaInput,
    ) -> Result<SubscribeReplicaOutput, SubscribeReplicaError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::SubscribeReplica(input, Callback(tx)))
            .await
            .map_err(|_| SubscribeReplicaError::ActorExited)?;

        rx.await.unwrap_or(Err(SubscribeReplicaError::ActorExited))
    }

    pub async fn replica_ack(&self, ack: ReplicaWriteAck) -> Result<(), NodeClientError> {
        self.send(Event::ReplicaAck(ack)).await
    }

    pub async fn replica_disconnected(&self, subscription_id: SubscriptionId) -> Result<(), NodeClientError> {
        self.send(Event::ReplicaDisconnected(subscription_id)).await
    }

    /// Most recent `n` epochs, newest first.
    pub async fn get_last_epochs(&self, n: usize) -> Result<Vec<EpochRecord>, NodeClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::GetLastEpochs(n, Callback(tx))).await?;

        rx.await.unwrap_or(Err(NodeClientError::ActorExited))
    }

    pub async fn status(&self) -> Result<NodeStatus, NodeClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::GetStatus(Callback(tx))).await?;

        rx.await.unwrap_or(Err(NodeClientError::ActorExited))
    }

    pub(crate) async fn timer_event(&self, event: TimerEvent) -> Result<(), NodeClientError> {
        self.send(Event::Timer(event)).await
    }

    async fn send(&self, event: Event) -> Result<(), NodeClientError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| NodeClientError::ActorExited)
    }
}

impl WeakNodeClient {
    pub fn upgrade(&self) -> Option<NodeClient> {
        self.sender.upgrade().map(|sender| NodeClient { sender })
    }

    pub(crate) async fn timer_event(&self, event: TimerEvent) -> Result<(), NodeClientError> {
        match self.upgrade() {
            Some(client) => client.timer_event(event).await,
            None => Err(NodeClientError::ActorExited),
        }
    }

    pub async fn deliver_peer_message(&self, message: PeerMessage) -> Result<(), NodeClientError> {
        match self.upgrade() {
            Some(client) => client.deliver_peer_message(message).await,
            None => Err(NodeClientError::ActorExited),
        }
    }
}
