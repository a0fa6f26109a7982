use crate::cluster::{ClusterInfo, EpochNumber, InstanceId, MemberInfo};
use crate::election::ElectionsDone;
use crate::epoch::EpochRecord;
use crate::node_state::state_change_listener::{self, NodeStateChangeListener, NodeStateChangeNotifier};
use crate::node_state::{NodeStateSnapshot, VNodeState};
use crate::replication::{ReplicaAssignment, ReplicaRole, SubscriptionId};
use std::fmt;
use uuid::Uuid;

/// Correlates a `WaitForChaserToCatchUp` command with the `ChaserCaughtUp` answer. Answers for
/// anything but the latest request are stale.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    fn new_random() -> Self {
        CorrelationId(Uuid::new_v4())
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands for the services surrounding the clustering core.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeCommand {
    BecomeDiscoverLeader,
    BecomeUnknown,
    BecomeReadOnlyLeaderless,
    BecomePreLeader,
    BecomeLeader { epoch: EpochRecord },
    BecomeResigningLeader,
    BecomePreReplica { leader: MemberInfo },
    BecomePreReadOnlyReplica { leader: MemberInfo },
    BecomeCatchingUp { leader: MemberInfo },
    BecomeClone { leader: MemberInfo },
    BecomeFollower { leader: MemberInfo },
    BecomeReadOnlyReplica { leader: MemberInfo },
    BecomeShuttingDown,
    BecomeShutdown,
    /// The chaser must answer with `ChaserCaughtUp(correlation_id)` once it has processed
    /// everything the writer flushed.
    WaitForChaserToCatchUp { correlation_id: CorrelationId },
    /// The replication service must subscribe to `leader` with this subscription id.
    SubscribeToLeader {
        leader: MemberInfo,
        subscription_id: SubscriptionId,
        is_promotable: bool,
    },
}

/// Work the node has to do on behalf of the driver, besides publishing commands.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DriverAction {
    Command(NodeCommand),
    StartLeaderDiscovery,
    StartElections,
    AdoptLeader(MemberInfo),
    WriteEpoch(EpochNumber),
    ActivateReplication,
    DeactivateReplication,
    StartReplicationResignation,
    /// This node can't lead. Hand leadership over so the next election excludes it.
    Abdicate,
    StopElections,
}

/// StateTransitionDriver maps election outcomes, resignation progress and collaborator answers
/// onto node roles:
///
/// ```text
/// Initializing -> DiscoverLeader -> Unknown -> PreLeader -> Leader -> ResigningLeader -> Unknown
///                                           \-> PreReplica -> CatchingUp -> Clone <-> Follower
/// Initializing -> ReadOnlyLeaderless -> PreReadOnlyReplica -> ReadOnlyReplica
/// * -> ShuttingDown -> Shutdown
/// ```
pub(crate) struct StateTransitionDriver {
    logger: slog::Logger,
    me: InstanceId,
    is_read_only_replica: bool,

    state: VNodeState,
    leader: Option<MemberInfo>,
    pending_chaser: Option<CorrelationId>,
    pending_epoch_number: Option<EpochNumber>,
    subscription: Option<SubscriptionId>,

    notifier: NodeStateChangeNotifier,
    listener: NodeStateChangeListener,
}

impl StateTransitionDriver {
    pub(crate) fn new(logger: slog::Logger, me: InstanceId, is_read_only_replica: bool) -> Self {
        let (notifier, listener) = state_change_listener::new(NodeStateSnapshot {
            state: VNodeState::Initializing,
            leader: None,
        });

        StateTransitionDriver {
            logger,
            me,
            is_read_only_replica,
            state: VNodeState::Initializing,
            leader: None,
            pending_chaser: None,
            pending_epoch_number: None,
            subscription: None,
            notifier,
            listener,
        }
    }

    pub(crate) fn state(&self) -> VNodeState {
        self.state
    }

    pub(crate) fn leader(&self) -> Option<&MemberInfo> {
        self.leader.as_ref()
    }

    pub(crate) fn state_change_listener(&self) -> NodeStateChangeListener {
        self.listener.clone()
    }

    fn transition(&mut self, state: VNodeState, leader: Option<MemberInfo>) {
        slog::info!(
            self.logger,
            "{:?} -> {:?}. Leader: {:?}",
            self.state,
            state,
            leader.as_ref().map(|l| l.instance_id)
        );

        self.state = state;
        self.leader = leader;
        self.notifier.notify_new_state(NodeStateSnapshot {
            state,
            leader: self.leader.as_ref().map(|l| l.instance_id),
        });
    }

    fn wait_for_chaser(&mut self, out: &mut Vec<DriverAction>) {
        let correlation_id = CorrelationId::new_random();
        self.pending_chaser = Some(correlation_id);
        out.push(DriverAction::Command(NodeCommand::WaitForChaserToCatchUp { correlation_id }));
    }

    fn is_leader_alive(&self, cluster_info: &ClusterInfo) -> bool {
        self.leader
            .as_ref()
            .and_then(|l| cluster_info.member(&l.instance_id))
            .map(|m| m.is_alive)
            .unwrap_or(false)
    }

    fn leave_leadership(&mut self, out: &mut Vec<DriverAction>) {
        if self.state.is_leader() {
            out.push(DriverAction::DeactivateReplication);
        }
        self.pending_epoch_number = None;
    }

    fn become_unknown_and_elect(&mut self, out: &mut Vec<DriverAction>) {
        self.leave_leadership(out);
        self.pending_chaser = None;
        self.subscription = None;
        self.transition(VNodeState::Unknown, None);
        out.push(DriverAction::Command(NodeCommand::BecomeUnknown));
        out.push(DriverAction::StartElections);
    }

    fn become_pre_replica(&mut self, leader: MemberInfo, out: &mut Vec<DriverAction>) {
        self.leave_leadership(out);
        self.subscription = None;
        if self.is_read_only_replica {
            self.transition(VNodeState::PreReadOnlyReplica, Some(leader.clone()));
            out.push(DriverAction::Command(NodeCommand::BecomePreReadOnlyReplica { leader }));
        } else {
            self.transition(VNodeState::PreReplica, Some(leader.clone()));
            out.push(DriverAction::Command(NodeCommand::BecomePreReplica { leader }));
        }
        self.wait_for_chaser(out);
    }

    pub(crate) fn system_start(&mut self) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state != VNodeState::Initializing {
            return out;
        }

        if self.is_read_only_replica {
            self.transition(VNodeState::ReadOnlyLeaderless, None);
            out.push(DriverAction::Command(NodeCommand::BecomeReadOnlyLeaderless));
        } else {
            self.transition(VNodeState::DiscoverLeader, None);
            out.push(DriverAction::Command(NodeCommand::BecomeDiscoverLeader));
            out.push(DriverAction::StartLeaderDiscovery);
        }
        out
    }

    pub(crate) fn leader_discovery_timed_out(&mut self) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state == VNodeState::DiscoverLeader {
            slog::info!(self.logger, "No existing leader discovered.");
            self.become_unknown_and_elect(&mut out);
        }
        out
    }

    pub(crate) fn leader_found(&mut self, leader: MemberInfo) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if !matches!(self.state, VNodeState::DiscoverLeader | VNodeState::ReadOnlyLeaderless) {
            return out;
        }
        if leader.instance_id == self.me {
            return out;
        }

        out.push(DriverAction::AdoptLeader(leader.clone()));
        self.become_pre_replica(leader, &mut out);
        out
    }

    /// Looks for an existing leader while discovering, and lets a read-only replica notice its
    /// leader is gone.
    pub(crate) fn gossip_updated(&mut self, cluster_info: &ClusterInfo) -> Vec<DriverAction> {
        match self.state {
            VNodeState::DiscoverLeader | VNodeState::ReadOnlyLeaderless => {
                let me = self.me;
                let leader = cluster_info
                    .members()
                    .iter()
                    .find(|m| m.is_alive && m.state == VNodeState::Leader && m.instance_id != me)
                    .cloned();
                match leader {
                    Some(leader) => self.leader_found(leader),
                    None => vec![],
                }
            }
            VNodeState::PreReadOnlyReplica | VNodeState::ReadOnlyReplica => {
                if self.is_leader_alive(cluster_info) {
                    return vec![];
                }

                slog::info!(self.logger, "Leader is gone from gossip.");
                self.pending_chaser = None;
                self.subscription = None;
                self.transition(VNodeState::ReadOnlyLeaderless, None);
                vec![DriverAction::Command(NodeCommand::BecomeReadOnlyLeaderless)]
            }
            VNodeState::PreReplica | VNodeState::CatchingUp | VNodeState::Clone | VNodeState::Follower => {
                if self.is_leader_alive(cluster_info) {
                    return vec![];
                }

                slog::info!(self.logger, "Leader is gone from gossip. Electing a new one.");
                let mut out = Vec::new();
                self.become_unknown_and_elect(&mut out);
                out
            }
            _ => vec![],
        }
    }

    pub(crate) fn elections_done(&mut self, done: &ElectionsDone) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state.is_shutting_down() || self.state == VNodeState::Initializing {
            return out;
        }

        let same_leader = self.leader.as_ref().map(|l| l.instance_id) == Some(done.leader.instance_id);
        if same_leader && !matches!(self.state, VNodeState::Unknown | VNodeState::DiscoverLeader) {
            slog::debug!(
                self.logger,
                "Elections done for view {:?} with unchanged leader {:?}",
                done.installed_view,
                done.leader.instance_id
            );
            return out;
        }

        if done.leader.instance_id == self.me {
            self.pending_epoch_number = Some(done.proposal_number);
            self.subscription = None;
            self.transition(VNodeState::PreLeader, Some(done.leader.clone()));
            out.push(DriverAction::Command(NodeCommand::BecomePreLeader));
            self.wait_for_chaser(&mut out);
        } else {
            self.become_pre_replica(done.leader.clone(), &mut out);
        }
        out
    }

    pub(crate) fn chaser_caught_up(&mut self, correlation_id: CorrelationId) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.pending_chaser != Some(correlation_id) {
            slog::trace!(self.logger, "Stale chaser caught up {:?}", correlation_id);
            return out;
        }
        self.pending_chaser = None;

        let leader = match self.leader.clone() {
            Some(l) => l,
            None => return out,
        };
        match self.state {
            VNodeState::PreLeader => {
                if let Some(epoch_number) = self.pending_epoch_number {
                    out.push(DriverAction::WriteEpoch(epoch_number));
                }
            }
            VNodeState::PreReplica => {
                let subscription_id = SubscriptionId::new_random();
                self.subscription = Some(subscription_id);
                self.transition(VNodeState::CatchingUp, Some(leader.clone()));
                out.push(DriverAction::Command(NodeCommand::BecomeCatchingUp { leader: leader.clone() }));
                out.push(DriverAction::Command(NodeCommand::SubscribeToLeader {
                    leader,
                    subscription_id,
                    is_promotable: true,
                }));
            }
            VNodeState::PreReadOnlyReplica => {
                let subscription_id = SubscriptionId::new_random();
                self.subscription = Some(subscription_id);
                out.push(DriverAction::Command(NodeCommand::SubscribeToLeader {
                    leader,
                    subscription_id,
                    is_promotable: false,
                }));
            }
            _ => {}
        }
        out
    }

    pub(crate) fn epoch_written(&mut self, epoch: EpochRecord) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state != VNodeState::PreLeader {
            return out;
        }

        self.pending_epoch_number = None;
        let leader = self.leader.clone();
        self.transition(VNodeState::Leader, leader);
        out.push(DriverAction::ActivateReplication);
        out.push(DriverAction::Command(NodeCommand::BecomeLeader { epoch }));
        out
    }

    pub(crate) fn epoch_write_failed(&mut self) -> Vec<DriverAction> {
        if self.state != VNodeState::PreLeader {
            return vec![];
        }

        slog::error!(self.logger, "Could not write epoch as leader. Abdicating.");
        self.pending_epoch_number = None;
        vec![DriverAction::Abdicate]
    }

    pub(crate) fn replica_assigned(&mut self, assignment: &ReplicaAssignment) -> Vec<DriverAction> {
        let mut out = Vec::new();
        let leader = match &self.leader {
            Some(l) if l.instance_id == assignment.leader_id => l.clone(),
            _ => {
                slog::debug!(self.logger, "Assignment from {:?} which is not our leader", assignment.leader_id);
                return out;
            }
        };
        if self.subscription != Some(assignment.subscription_id) {
            slog::debug!(self.logger, "Assignment for stale subscription {:?}", assignment.subscription_id);
            return out;
        }

        match (assignment.role, self.state) {
            (ReplicaRole::Follower, VNodeState::CatchingUp) | (ReplicaRole::Follower, VNodeState::Clone) => {
                self.transition(VNodeState::Follower, Some(leader.clone()));
                out.push(DriverAction::Command(NodeCommand::BecomeFollower { leader }));
            }
            (ReplicaRole::Clone, VNodeState::CatchingUp) | (ReplicaRole::Clone, VNodeState::Follower) => {
                self.transition(VNodeState::Clone, Some(leader.clone()));
                out.push(DriverAction::Command(NodeCommand::BecomeClone { leader }));
            }
            (ReplicaRole::ReadOnly, VNodeState::PreReadOnlyReplica) => {
                self.transition(VNodeState::ReadOnlyReplica, Some(leader.clone()));
                out.push(DriverAction::Command(NodeCommand::BecomeReadOnlyReplica { leader }));
            }
            (role, state) => {
                slog::debug!(self.logger, "Ignoring {:?} assignment while {:?}", role, state);
            }
        }
        out
    }

    /// A majority acknowledged this node's resignation.
    pub(crate) fn leader_resignation_initiated(&mut self) -> Vec<DriverAction> {
        let mut out = Vec::new();
        match self.state {
            VNodeState::Leader => {
                let leader = self.leader.clone();
                self.transition(VNodeState::ResigningLeader, leader);
                out.push(DriverAction::Command(NodeCommand::BecomeResigningLeader));
                out.push(DriverAction::StartReplicationResignation);
            }
            VNodeState::PreLeader => self.become_unknown_and_elect(&mut out),
            _ => {}
        }
        out
    }

    pub(crate) fn resignation_caught_up(&mut self) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state == VNodeState::ResigningLeader {
            self.become_unknown_and_elect(&mut out);
        }
        out
    }

    pub(crate) fn request_shutdown(&mut self) -> Vec<DriverAction> {
        let mut out = Vec::new();
        if self.state.is_shutting_down() {
            return out;
        }

        self.leave_leadership(&mut out);
        self.pending_chaser = None;
        self.subscription = None;
        self.transition(VNodeState::ShuttingDown, None);
        out.push(DriverAction::Command(NodeCommand::BecomeShuttingDown));
        out.push(DriverAction::StopElections);

        // The core holds nothing that needs draining.
        self.transition(VNodeState::Shutdown, None);
        out.push(DriverAction::Command(NodeCommand::BecomeShutdown));
        out
    }
}
