mod messages;
mod replica_ack;
mod tracker;

pub use messages::ReplicaAssignment;
pub use messages::ReplicaRole;
pub use messages::ReplicaWriteAck;
pub use messages::SubscribeReplicaError;
pub use messages::SubscribeReplicaInput;
pub use messages::SubscribeReplicaOutput;
pub use messages::SubscriptionId;
pub(crate) use tracker::ReplicationOutput;
pub(crate) use tracker::ReplicationTracker;
pub(crate) use tracker::ReplicationTrackerConfig;
