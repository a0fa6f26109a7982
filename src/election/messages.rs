use crate::cluster::{ClusterInfo, Endpoint, EpochNumber, InstanceId, LogPosition, MemberInfo, View};
use crate::epoch::EpochSummary;

/// Every message nodes exchange while electing a leader.
#[derive(Clone, Debug, PartialEq)]
pub enum ElectionMessage {
    ViewChange(ViewChange),
    ViewChangeProof(ViewChangeProof),
    Prepare(Prepare),
    PrepareOk(PrepareOk),
    Proposal(Proposal),
    Accept(Accept),
    LeaderIsResigning(LeaderIsResigning),
    LeaderIsResigningOk(LeaderIsResigningOk),
}

impl ElectionMessage {
    /// Instance id of the node that sent this message.
    pub fn sender(&self) -> InstanceId {
        match self {
            ElectionMessage::ViewChange(m) => m.server_id,
            ElectionMessage::ViewChangeProof(m) => m.server_id,
            ElectionMessage::Prepare(m) => m.server_id,
            ElectionMessage::PrepareOk(m) => m.server_id,
            ElectionMessage::Proposal(m) => m.server_id,
            ElectionMessage::Accept(m) => m.server_id,
            ElectionMessage::LeaderIsResigning(m) => m.leader_id,
            ElectionMessage::LeaderIsResigningOk(m) => m.server_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewChange {
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub attempted_view: View,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewChangeProof {
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub installed_view: View,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prepare {
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub view: View,
}

/// A vote: the sender's full candidacy for the view being prepared.
#[derive(Clone, Debug, PartialEq)]
pub struct PrepareOk {
    pub view: View,
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub epoch: Option<EpochSummary>,
    pub last_commit_position: LogPosition,
    pub writer_checkpoint: LogPosition,
    pub chaser_checkpoint: LogPosition,
    pub node_priority: i32,
    pub is_read_only_replica: bool,
    pub cluster_info: ClusterInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub leader_id: InstanceId,
    pub leader_endpoint: Endpoint,
    pub view: View,
    pub proposal_number: EpochNumber,
    pub epoch: Option<EpochSummary>,
    pub last_commit_position: LogPosition,
    pub writer_checkpoint: LogPosition,
    pub chaser_checkpoint: LogPosition,
    pub node_priority: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Accept {
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
    pub leader_id: InstanceId,
    pub leader_endpoint: Endpoint,
    pub view: View,
}

impl Accept {
    /// The accept a node sends for `proposal`.
    pub fn of_proposal(proposal: &Proposal, server_id: InstanceId, server_endpoint: Endpoint) -> Self {
        Accept {
            server_id,
            server_endpoint,
            leader_id: proposal.leader_id,
            leader_endpoint: proposal.leader_endpoint,
            view: proposal.view,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaderIsResigning {
    pub leader_id: InstanceId,
    pub leader_endpoint: Endpoint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaderIsResigningOk {
    pub leader_id: InstanceId,
    pub leader_endpoint: Endpoint,
    pub server_id: InstanceId,
    pub server_endpoint: Endpoint,
}

impl LeaderIsResigning {
    pub fn acknowledged_by(&self, server_id: InstanceId, server_endpoint: Endpoint) -> LeaderIsResigningOk {
        LeaderIsResigningOk {
            leader_id: self.leader_id,
            leader_endpoint: self.leader_endpoint,
            server_id,
            server_endpoint,
        }
    }
}

/// Outcome of a completed election round. Published once per installed view.
#[derive(Clone, Debug, PartialEq)]
pub struct ElectionsDone {
    pub installed_view: View,
    pub proposal_number: EpochNumber,
    pub leader: MemberInfo,
}
