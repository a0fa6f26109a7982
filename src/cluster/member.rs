use crate::cluster::LogPosition;
use crate::epoch::EpochSummary;
use crate::node_state::VNodeState;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Address a node is reachable at for internal cluster traffic.
pub type Endpoint = SocketAddr;

/// InstanceId identifies a single run of a node. It is regenerated on every process start.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new_random() -> Self {
        InstanceId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        InstanceId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gossip's view of a single cluster member.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberInfo {
    pub instance_id: InstanceId,
    pub endpoint: Endpoint,
    pub state: VNodeState,
    pub is_alive: bool,
    pub is_read_only_replica: bool,
    pub last_commit_position: LogPosition,
    pub writer_checkpoint: LogPosition,
    pub chaser_checkpoint: LogPosition,
    pub epoch: Option<EpochSummary>,
    pub node_priority: i32,
}

impl MemberInfo {
    /// A freshly started member which has not written or replicated anything yet.
    pub fn initial(instance_id: InstanceId, endpoint: Endpoint, is_read_only_replica: bool) -> Self {
        MemberInfo {
            instance_id,
            endpoint,
            state: VNodeState::Initializing,
            is_alive: true,
            is_read_only_replica,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::start(),
            chaser_checkpoint: LogPosition::start(),
            epoch: None,
            node_priority: 0,
        }
    }

    pub fn with_state(&self, state: VNodeState) -> Self {
        MemberInfo { state, ..self.clone() }
    }
}

/// ClusterInfo is a snapshot of cluster membership, keyed by instance id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterInfo {
    members: Vec<MemberInfo>,
}

impl ClusterInfo {
    /// Later entries win when the same instance id appears more than once.
    pub fn new(members: Vec<MemberInfo>) -> Self {
        let mut position_by_id: HashMap<InstanceId, usize> = HashMap::with_capacity(members.len());
        let mut deduped: Vec<MemberInfo> = Vec::with_capacity(members.len());
        for member in members {
            match position_by_id.get(&member.instance_id) {
                Some(&i) => deduped[i] = member,
                None => {
                    position_by_id.insert(member.instance_id, deduped.len());
                    deduped.push(member);
                }
            }
        }

        ClusterInfo { members: deduped }
    }

    pub fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    pub fn member(&self, instance_id: &InstanceId) -> Option<&MemberInfo> {
        self.members.iter().find(|m| &m.instance_id == instance_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn alive_members(&self) -> impl Iterator<Item = &MemberInfo> {
        self.members.iter().filter(|m| m.is_alive)
    }

    /// Alive members ordered by endpoint, highest first. Every node derives the same ordering from
    /// the same gossip, which is what makes leader-of-view deterministic.
    pub(crate) fn election_servers(&self) -> Vec<MemberInfo> {
        let mut servers: Vec<MemberInfo> = self.alive_members().cloned().collect();
        servers.sort_by_key(|m| Reverse(m.endpoint));
        servers
    }
}
