use crate::cluster::{ClusterInfo, LogPosition, MemberInfo, View};
use crate::epoch::EpochRecord;
use crate::node_state::CorrelationId;
use crate::replication::{
    ReplicaWriteAck, SubscribeReplicaError, SubscribeReplicaInput, SubscribeReplicaOutput, SubscriptionId,
};
use crate::actor::NodeClientError;
use crate::node::NodeStatus;
use crate::transport::PeerMessage;
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::oneshot;

// Handlers are synchronous. Anything long running posts its result back as another event.
#[derive(Debug)]
pub(crate) enum Event {
    SystemStart,
    RequestShutdown,

    // Election and replica assignment traffic from peers.
    Peer(PeerMessage),
    Timer(TimerEvent),

    // Gossip.
    GossipUpdated(ClusterInfo),
    LeaderFound(MemberInfo),

    // Operator requests.
    SetNodePriority(i32),
    ResignNode,

    // Local storage collaborators.
    WriterCheckpointFlushed(LogPosition),
    ChaserCheckpoint(LogPosition),
    ChaserCaughtUp(CorrelationId),
    IndexedTo(LogPosition),
    ReplicatedEpoch(EpochRecord),
    LogTruncated(LogPosition),

    // Leader side of replication.
    SubscribeReplica(
        SubscribeReplicaInput,
        Callback<SubscribeReplicaOutput, SubscribeReplicaError>,
    ),
    ReplicaAck(ReplicaWriteAck),
    ReplicaDisconnected(SubscriptionId),

    GetLastEpochs(usize, Callback<Vec<EpochRecord>, NodeClientError>),
    GetStatus(Callback<NodeStatus, NodeClientError>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TimerEvent {
    ElectionsTimedOut(View),
    SendViewChangeProof,
    LeaderDiscoveryTimedOut,
    ReplicationTick,
}

/// Reply slot for a single request. At most one reply is ever sent.
#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(pub(super) oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        // Requester gave up waiting. Nothing to do.
        let _ = self.0.send(message);
    }
}
