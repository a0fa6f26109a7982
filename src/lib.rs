mod actor;
mod cluster;
mod election;
mod epoch;
mod logging;
mod node;
mod node_state;
mod replication;
mod timers;
mod transport;

pub use actor::NodeClient;
pub use actor::NodeClientError;
pub use actor::WeakNodeClient;
pub use cluster::ClusterInfo;
pub use cluster::Endpoint;
pub use cluster::EpochNumber;
pub use cluster::InstanceId;
pub use cluster::LogPosition;
pub use cluster::MemberInfo;
pub use cluster::View;
pub use election::Accept;
pub use election::ElectionMessage;
pub use election::ElectionsDone;
pub use election::ElectionsState;
pub use election::InMemoryProposalStore;
pub use election::LeaderIsResigning;
pub use election::LeaderIsResigningOk;
pub use election::Prepare;
pub use election::PrepareOk;
pub use election::Proposal;
pub use election::ProposalStore;
pub use election::ViewChange;
pub use election::ViewChangeProof;
pub use epoch::EpochError;
pub use epoch::EpochId;
pub use epoch::EpochRecord;
pub use epoch::EpochStore;
pub use epoch::EpochStoreFailureSwitch;
pub use epoch::EpochSummary;
pub use epoch::EpochValidation;
pub use epoch::InMemoryEpochStore;
pub use logging::create_root_logger_for_stdout;
pub use node::create_node;
pub use node::ClusterNode;
pub use node::NodeConfig;
pub use node::NodeCreationError;
pub use node::NodeEvent;
pub use node::NodeEventListener;
pub use node::NodeOptions;
pub use node::NodeStatus;
pub use node_state::CorrelationId;
pub use node_state::NodeCommand;
pub use node_state::NodeStateChangeListener;
pub use node_state::NodeStateSnapshot;
pub use node_state::VNodeState;
pub use replication::ReplicaAssignment;
pub use replication::ReplicaRole;
pub use replication::ReplicaWriteAck;
pub use replication::SubscribeReplicaError;
pub use replication::SubscribeReplicaInput;
pub use replication::SubscribeReplicaOutput;
pub use replication::SubscriptionId;
pub use transport::InMemoryNetwork;
pub use transport::InMemoryTransport;
pub use transport::PeerMessage;
pub use transport::Transport;
