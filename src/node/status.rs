use crate::cluster::{InstanceId, LogPosition, View};
use crate::election::ElectionsState;
use crate::node_state::VNodeState;

/// Point in time summary of a node, for operators and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeStatus {
    pub state: VNodeState,
    pub leader: Option<InstanceId>,
    pub elections_state: ElectionsState,
    pub last_attempted_view: Option<View>,
    pub last_installed_view: Option<View>,
    pub resigning_leader: Option<InstanceId>,
    pub node_priority: i32,
    pub writer_checkpoint: LogPosition,
    /// Zero unless this node is leader.
    pub replicated_to: LogPosition,
    pub committed_to: LogPosition,
}
