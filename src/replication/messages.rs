use crate::cluster::{Endpoint, InstanceId, LogPosition};
use crate::epoch::{EpochError, EpochSummary};
use std::fmt;
use uuid::Uuid;

/// SubscriptionId identifies one replica subscription to the leader. A replica picks a fresh one
/// every time it (re)subscribes.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new_random() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeReplicaInput {
    pub log_position: LogPosition,
    /// Chunk the replica is positioned in. Informational only.
    pub chunk_id: Option<Uuid>,
    /// Newest first.
    pub last_epochs: Vec<EpochSummary>,
    pub replica_endpoint: Endpoint,
    pub replica_id: InstanceId,
    pub leader_id: InstanceId,
    pub subscription_id: SubscriptionId,
    /// False for read-only replicas. Only promotable replicas count towards the quorum.
    pub is_promotable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeReplicaOutput {
    pub subscription_id: SubscriptionId,
    /// Position the replica must resume replication from.
    pub subscription_position: LogPosition,
    pub common_epoch: Option<EpochSummary>,
    /// Set when the replica holds data past `subscription_position` that it must discard first.
    pub truncate_to: Option<LogPosition>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubscribeReplicaError {
    #[error("This node is not the active leader")]
    NotLeader,
    #[error("Leader is resigning and not accepting new replicas")]
    LeaderResigning,
    #[error("Subscription is for leader {requested:?}, but this node is {actual:?}")]
    LeaderMismatch { requested: InstanceId, actual: InstanceId },
    #[error("Replica epochs can't be validated: {0}")]
    InvalidReplicaEpochs(#[source] EpochError),
    #[error("Node actor is dead RIP")]
    ActorExited,
}

/// Replica acknowledging it durably wrote everything up to `replication_log_position`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaWriteAck {
    pub subscription_id: SubscriptionId,
    pub replication_log_position: LogPosition,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReplicaRole {
    Follower,
    Clone,
    ReadOnly,
}

/// Sent by the leader to a replica once it has caught up, and again when a clone is promoted.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaAssignment {
    pub leader_id: InstanceId,
    pub subscription_id: SubscriptionId,
    pub role: ReplicaRole,
}
