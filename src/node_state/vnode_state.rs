/// Role of a node in the cluster, as seen by the rest of the system.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VNodeState {
    Initializing,
    DiscoverLeader,
    Unknown,
    PreReplica,
    CatchingUp,
    Clone,
    Follower,
    PreLeader,
    Leader,
    ResigningLeader,
    ReadOnlyLeaderless,
    PreReadOnlyReplica,
    ReadOnlyReplica,
    ShuttingDown,
    Shutdown,
}

impl VNodeState {
    pub fn is_replica(&self) -> bool {
        matches!(
            self,
            VNodeState::PreReplica
                | VNodeState::CatchingUp
                | VNodeState::Clone
                | VNodeState::Follower
                | VNodeState::PreReadOnlyReplica
                | VNodeState::ReadOnlyReplica
        )
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, VNodeState::PreLeader | VNodeState::Leader | VNodeState::ResigningLeader)
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(self, VNodeState::ShuttingDown | VNodeState::Shutdown)
    }
}
