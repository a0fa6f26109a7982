use crate::cluster::{majority_of, ClusterInfo, Endpoint, EpochNumber, InstanceId, LogPosition, MemberInfo, View};
use crate::election::candidate::{self, LeaderCandidate, LegitimacyCheck};
use crate::election::{
    Accept, ElectionMessage, ElectionsDone, LeaderIsResigning, LeaderIsResigningOk, Prepare, PrepareOk, Proposal,
    ProposalStore, ViewChange, ViewChangeProof,
};
use crate::epoch::EpochSummary;
use std::collections::{HashMap, HashSet};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElectionsState {
    /// Not taking part in elections yet, e.g. still discovering an existing leader.
    Idle,
    ElectingLeader,
    /// Drives the installed view: collects votes and proposes the winner.
    Leader,
    /// Installed a view driven by another node, waiting for its proposal.
    Acceptor,
    Shutdown,
}

/// This node's candidacy data, sampled fresh by the node before every election input.
#[derive(Clone, Debug, Default)]
pub(crate) struct LocalCandidacy {
    pub(crate) last_epoch: Option<EpochSummary>,
    pub(crate) last_commit_position: LogPosition,
    pub(crate) writer_checkpoint: LogPosition,
    pub(crate) chaser_checkpoint: LogPosition,
}

/// Side effects requested by the coordinator. The node executes them in order.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ElectionAction {
    /// Send to every known alive server except ourselves.
    Broadcast(ElectionMessage),
    SendTo(Endpoint, ElectionMessage),
    /// Deliver `ElectionsTimedOut(view)` after the election timeout.
    ScheduleTimeout(View),
    ElectionsDone(ElectionsDone),
    InitiateLeaderResignation,
    NodePriorityUpdated(i32),
}

#[derive(Clone, Debug)]
pub(crate) struct ElectionConfig {
    pub(crate) me: InstanceId,
    pub(crate) my_endpoint: Endpoint,
    pub(crate) is_read_only_replica: bool,
    pub(crate) cluster_size: usize,
    pub(crate) node_priority: i32,
}

struct LeaderProposal {
    candidate: LeaderCandidate,
    proposal_number: EpochNumber,
}

/// ElectionCoordinator runs the view change, prepare, propose and accept rounds for one node.
/// It owns no I/O: each input returns the actions the node must carry out. Inputs referencing a
/// view other than the one the coordinator is working on are dropped.
pub(crate) struct ElectionCoordinator<P: ProposalStore> {
    logger: slog::Logger,
    config: ElectionConfig,
    proposal_store: P,

    state: ElectionsState,
    last_attempted_view: Option<View>,
    last_installed_view: Option<View>,

    // Alive servers ordered by endpoint descending. Read-only replicas included.
    servers: Vec<MemberInfo>,

    view_changes_received: HashSet<InstanceId>,
    prepare_oks_received: HashMap<InstanceId, PrepareOk>,
    // Accepts for the installed view, keyed by sender, valued by the leader they accept. Kept even
    // when they arrive before the proposal they refer to.
    accepts_received: HashMap<InstanceId, InstanceId>,
    resigning_oks_received: HashSet<InstanceId>,

    leader_proposal: Option<LeaderProposal>,
    leader: Option<InstanceId>,
    last_elected_leader: Option<InstanceId>,
    resigning_leader: Option<InstanceId>,
    done_for_view: Option<View>,
}

impl<P: ProposalStore> ElectionCoordinator<P> {
    pub(crate) fn new(logger: slog::Logger, config: ElectionConfig, proposal_store: P, cluster_info: &ClusterInfo) -> Self {
        ElectionCoordinator {
            logger,
            config,
            proposal_store,
            state: ElectionsState::Idle,
            last_attempted_view: None,
            last_installed_view: None,
            servers: cluster_info.election_servers(),
            view_changes_received: HashSet::new(),
            prepare_oks_received: HashMap::new(),
            accepts_received: HashMap::new(),
            resigning_oks_received: HashSet::new(),
            leader_proposal: None,
            leader: None,
            last_elected_leader: None,
            resigning_leader: None,
            done_for_view: None,
        }
    }

    pub(crate) fn state(&self) -> ElectionsState {
        self.state
    }

    pub(crate) fn last_attempted_view(&self) -> Option<View> {
        self.last_attempted_view
    }

    pub(crate) fn last_installed_view(&self) -> Option<View> {
        self.last_installed_view
    }

    pub(crate) fn leader(&self) -> Option<InstanceId> {
        self.leader
    }

    pub(crate) fn resigning_leader(&self) -> Option<InstanceId> {
        self.resigning_leader
    }

    pub(crate) fn node_priority(&self) -> i32 {
        self.config.node_priority
    }

    /// Servers a broadcast goes to.
    pub(crate) fn peers(&self) -> impl Iterator<Item = &MemberInfo> {
        let me = self.config.me;
        self.servers.iter().filter(move |m| m.instance_id != me)
    }

    fn quorum(&self) -> usize {
        majority_of(self.config.cluster_size)
    }

    fn is_known_server(&self, instance_id: &InstanceId) -> bool {
        self.servers.iter().any(|m| &m.instance_id == instance_id)
    }

    // ------- Local inputs -------

    pub(crate) fn start_elections(&mut self, local: &LocalCandidacy) -> Vec<ElectionAction> {
        let mut out = Vec::new();
        match self.state {
            ElectionsState::Shutdown | ElectionsState::ElectingLeader => {
                slog::debug!(self.logger, "Ignoring start elections while {:?}", self.state);
            }
            _ => {
                slog::info!(self.logger, "Starting elections.");
                self.shift_to_leader_election(View::after(self.last_attempted_view), local, &mut out);
            }
        }
        out
    }

    pub(crate) fn elections_timed_out(&mut self, view: View, local: &LocalCandidacy) -> Vec<ElectionAction> {
        let mut out = Vec::new();
        if self.state == ElectionsState::Shutdown || Some(view) != self.last_attempted_view {
            return out;
        }
        // Same view, but it already produced a leader.
        if self.state != ElectionsState::ElectingLeader && self.leader.is_some() {
            return out;
        }

        slog::info!(
            self.logger,
            "View {:?} timed out. State: {:?}, leader: {:?}",
            view,
            self.state,
            self.leader
        );
        self.shift_to_leader_election(view.next(), local, &mut out);
        out
    }

    /// Periodic tick. Tells slower peers which view we installed so they stop attempting older
    /// ones.
    pub(crate) fn send_view_change_proof(&self) -> Vec<ElectionAction> {
        match (self.state, self.last_installed_view) {
            (ElectionsState::Shutdown, _) | (_, None) => vec![],
            (_, Some(installed_view)) => vec![ElectionAction::Broadcast(ElectionMessage::ViewChangeProof(
                ViewChangeProof {
                    server_id: self.config.me,
                    server_endpoint: self.config.my_endpoint,
                    installed_view,
                },
            ))],
        }
    }

    pub(crate) fn gossip_updated(&mut self, cluster_info: &ClusterInfo) {
        self.servers = cluster_info.election_servers();
    }

    /// Adopt a leader that was discovered outside of an election, e.g. when joining a running
    /// cluster.
    pub(crate) fn leader_found(&mut self, leader: &MemberInfo) {
        if self.leader.is_some() || self.last_elected_leader.is_some() || self.state != ElectionsState::Idle {
            return;
        }

        slog::info!(self.logger, "Existing leader discovered: {:?}", leader.instance_id);
        self.leader = Some(leader.instance_id);
        self.last_elected_leader = Some(leader.instance_id);
        self.last_attempted_view = Some(View::initial());
        self.install_view(View::initial());
        self.state = ElectionsState::Acceptor;
    }

    pub(crate) fn set_node_priority(&mut self, node_priority: i32) -> Vec<ElectionAction> {
        slog::info!(self.logger, "Setting node priority to {}", node_priority);
        self.config.node_priority = node_priority;
        vec![ElectionAction::NodePriorityUpdated(node_priority)]
    }

    /// Starts handing over leadership. Only the current leader can resign.
    pub(crate) fn resign_node(&mut self) -> Vec<ElectionAction> {
        let mut out = Vec::new();
        if self.leader != Some(self.config.me) {
            slog::info!(self.logger, "Only the leader can resign. Ignoring resignation.");
            return out;
        }

        self.resigning_leader = Some(self.config.me);
        self.resigning_oks_received.clear();

        let resigning = LeaderIsResigning {
            leader_id: self.config.me,
            leader_endpoint: self.config.my_endpoint,
        };
        out.push(ElectionAction::Broadcast(ElectionMessage::LeaderIsResigning(
            resigning.clone(),
        )));
        let own_ok = resigning.acknowledged_by(self.config.me, self.config.my_endpoint);
        self.handle_leader_is_resigning_ok(own_ok, &mut out);
        out
    }

    pub(crate) fn shutdown(&mut self) {
        self.state = ElectionsState::Shutdown;
    }

    // ------- Peer messages -------

    pub(crate) fn handle_message(&mut self, message: ElectionMessage, local: &LocalCandidacy) -> Vec<ElectionAction> {
        let mut out = Vec::new();
        match message {
            ElectionMessage::ViewChange(m) => self.handle_view_change(m, local, &mut out),
            ElectionMessage::ViewChangeProof(m) => self.handle_view_change_proof(m, local, &mut out),
            ElectionMessage::Prepare(m) => self.handle_prepare(m, local, &mut out),
            ElectionMessage::PrepareOk(m) => self.handle_prepare_ok(m, local, &mut out),
            ElectionMessage::Proposal(m) => self.handle_proposal(m, local, &mut out),
            ElectionMessage::Accept(m) => self.handle_accept(m, &mut out),
            ElectionMessage::LeaderIsResigning(m) => self.handle_leader_is_resigning(m, &mut out),
            ElectionMessage::LeaderIsResigningOk(m) => self.handle_leader_is_resigning_ok(m, &mut out),
        }
        out
    }

    fn shift_to_leader_election(&mut self, view: View, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        slog::info!(self.logger, "Shifting to leader election for view {:?}", view);

        self.state = ElectionsState::ElectingLeader;
        self.last_attempted_view = Some(view);
        self.reset_round();

        let view_change = ViewChange {
            server_id: self.config.me,
            server_endpoint: self.config.my_endpoint,
            attempted_view: view,
        };
        out.push(ElectionAction::Broadcast(ElectionMessage::ViewChange(view_change.clone())));
        out.push(ElectionAction::ScheduleTimeout(view));
        self.handle_view_change(view_change, local, out);
    }

    fn reset_round(&mut self) {
        self.view_changes_received.clear();
        self.prepare_oks_received.clear();
        self.leader_proposal = None;
        self.leader = None;
    }

    fn install_view(&mut self, view: View) {
        if self.last_installed_view != Some(view) {
            self.accepts_received.clear();
        }
        self.last_installed_view = Some(view);
    }

    fn handle_view_change(&mut self, msg: ViewChange, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        if matches!(self.state, ElectionsState::Shutdown | ElectionsState::Idle) {
            return;
        }
        if Some(msg.attempted_view) <= self.last_installed_view {
            slog::trace!(self.logger, "Stale view change {:?} from {:?}", msg.attempted_view, msg.server_id);
            return;
        }

        if Some(msg.attempted_view) > self.last_attempted_view {
            self.shift_to_leader_election(msg.attempted_view, local, out);
        }
        if Some(msg.attempted_view) != self.last_attempted_view {
            slog::trace!(self.logger, "Stale view change {:?} from {:?}", msg.attempted_view, msg.server_id);
            return;
        }

        slog::info!(self.logger, "View change for view {:?} from {:?}", msg.attempted_view, msg.server_id);
        if self.view_changes_received.insert(msg.server_id) && self.view_changes_received.len() == self.quorum() {
            slog::info!(self.logger, "Majority of view changes for view {:?}", msg.attempted_view);
            if self.am_i_leader_of(msg.attempted_view) {
                self.shift_to_prepare_phase(local, out);
            }
        }
    }

    fn handle_view_change_proof(
        &mut self,
        msg: ViewChangeProof,
        local: &LocalCandidacy,
        out: &mut Vec<ElectionAction>,
    ) {
        if matches!(self.state, ElectionsState::Shutdown | ElectionsState::Idle) {
            return;
        }
        if Some(msg.installed_view) <= self.last_installed_view {
            return;
        }

        self.last_attempted_view = Some(msg.installed_view);
        self.reset_round();
        out.push(ElectionAction::ScheduleTimeout(msg.installed_view));

        if self.am_i_leader_of(msg.installed_view) {
            slog::info!(
                self.logger,
                "View change proof for view {:?} from {:?}. Jumping to leader state.",
                msg.installed_view,
                msg.server_id
            );
            self.state = ElectionsState::ElectingLeader;
            self.shift_to_prepare_phase(local, out);
        } else {
            slog::info!(
                self.logger,
                "View change proof for view {:?} from {:?}. Jumping to acceptor state.",
                msg.installed_view,
                msg.server_id
            );
            self.shift_to_acceptor();
        }
    }

    /// The leader of a view is picked round-robin from the servers that may lead.
    fn am_i_leader_of(&self, view: View) -> bool {
        let potential_leaders: Vec<&MemberInfo> = self.servers.iter().filter(|m| !m.is_read_only_replica).collect();
        if potential_leaders.is_empty() {
            return false;
        }

        let i = (view.as_u64() % potential_leaders.len() as u64) as usize;
        potential_leaders[i].instance_id == self.config.me
    }

    fn shift_to_prepare_phase(&mut self, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        let view = match self.last_attempted_view {
            Some(v) => v,
            None => return,
        };
        slog::info!(self.logger, "Shifting to prepare phase for view {:?}", view);

        self.install_view(view);
        self.prepare_oks_received.clear();

        out.push(ElectionAction::Broadcast(ElectionMessage::Prepare(Prepare {
            server_id: self.config.me,
            server_endpoint: self.config.my_endpoint,
            view,
        })));
        let own_vote = self.create_prepare_ok(view, local);
        self.handle_prepare_ok(own_vote, local, out);
    }

    fn handle_prepare(&mut self, msg: Prepare, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        if matches!(self.state, ElectionsState::Shutdown | ElectionsState::Idle) {
            return;
        }
        if msg.server_id == self.config.me {
            return;
        }
        if Some(msg.view) < self.last_attempted_view {
            slog::trace!(self.logger, "Stale prepare {:?} from {:?}", msg.view, msg.server_id);
            return;
        }
        if !self.is_known_server(&msg.server_id) {
            slog::debug!(self.logger, "Prepare from unknown server {:?}", msg.server_id);
            return;
        }

        // We missed the view changes for this view. Catch up before voting.
        if Some(msg.view) > self.last_attempted_view {
            self.state = ElectionsState::ElectingLeader;
            self.last_attempted_view = Some(msg.view);
            self.reset_round();
            out.push(ElectionAction::ScheduleTimeout(msg.view));
        }

        slog::info!(self.logger, "Prepare for view {:?} from {:?}", msg.view, msg.server_id);
        if self.state == ElectionsState::ElectingLeader {
            self.shift_to_acceptor();
        }

        let vote = self.create_prepare_ok(msg.view, local);
        out.push(ElectionAction::SendTo(msg.server_endpoint, ElectionMessage::PrepareOk(vote)));
    }

    fn create_prepare_ok(&self, view: View, local: &LocalCandidacy) -> PrepareOk {
        PrepareOk {
            view,
            server_id: self.config.me,
            server_endpoint: self.config.my_endpoint,
            epoch: local.last_epoch,
            last_commit_position: local.last_commit_position,
            writer_checkpoint: local.writer_checkpoint,
            chaser_checkpoint: local.chaser_checkpoint,
            node_priority: self.config.node_priority,
            is_read_only_replica: self.config.is_read_only_replica,
            cluster_info: ClusterInfo::new(self.servers.clone()),
        }
    }

    fn shift_to_acceptor(&mut self) {
        slog::info!(self.logger, "Shifting to acceptor for view {:?}", self.last_attempted_view);
        self.state = ElectionsState::Acceptor;
        if let Some(view) = self.last_attempted_view {
            self.install_view(view);
        }
    }

    fn handle_prepare_ok(&mut self, msg: PrepareOk, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        if self.state != ElectionsState::ElectingLeader {
            return;
        }
        if Some(msg.view) != self.last_attempted_view {
            slog::trace!(self.logger, "Stale prepare ok {:?} from {:?}", msg.view, msg.server_id);
            return;
        }

        slog::info!(
            self.logger,
            "Prepare ok for view {:?} from {:?}: epoch={:?} commit={:?} writer={:?} chaser={:?} priority={}",
            msg.view,
            msg.server_id,
            msg.epoch.map(|e| e.epoch_number),
            msg.last_commit_position,
            msg.writer_checkpoint,
            msg.chaser_checkpoint,
            msg.node_priority,
        );

        if self.prepare_oks_received.contains_key(&msg.server_id) {
            return;
        }
        self.prepare_oks_received.insert(msg.server_id, msg);
        if self.prepare_oks_received.len() == self.quorum() {
            self.shift_to_leader(local, out);
        }
    }

    fn shift_to_leader(&mut self, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        slog::info!(self.logger, "Shifting to leader of view {:?}", self.last_attempted_view);
        self.state = ElectionsState::Leader;
        self.send_proposal(local, out);
    }

    fn send_proposal(&mut self, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        self.leader_proposal = None;
        let view = match self.last_installed_view {
            Some(v) => v,
            None => return,
        };

        let candidates: Vec<LeaderCandidate> = self
            .prepare_oks_received
            .values()
            .map(LeaderCandidate::from_prepare_ok)
            .collect();
        let winner = match candidate::best_leader_candidate(&candidates, self.resigning_leader) {
            Some(c) => c,
            None => {
                slog::info!(self.logger, "No leader candidate for view {:?}", view);
                return;
            }
        };

        let last_epoch_number = local.last_epoch.map(|e| e.epoch_number);
        let proposal_number = EpochNumber::after(last_epoch_number.max(self.proposal_store.last_proposal_number()));
        match self.proposal_store.store_if_increased(proposal_number) {
            Ok(true) => {}
            Ok(false) => {
                slog::warn!(self.logger, "Proposal number {:?} was not increasing", proposal_number);
                return;
            }
            Err(e) => {
                // The round will time out and retry.
                slog::error!(self.logger, "Failed to persist proposal number {:?}: {:?}", proposal_number, e);
                return;
            }
        }

        slog::info!(
            self.logger,
            "Proposing {:?} as leader for view {:?} with proposal number {:?}",
            winner.instance_id,
            view,
            proposal_number
        );

        let proposal = Proposal {
            server_id: self.config.me,
            server_endpoint: self.config.my_endpoint,
            leader_id: winner.instance_id,
            leader_endpoint: winner.endpoint,
            view,
            proposal_number,
            epoch: winner.epoch,
            last_commit_position: winner.last_commit_position,
            writer_checkpoint: winner.writer_checkpoint,
            chaser_checkpoint: winner.chaser_checkpoint,
            node_priority: winner.node_priority,
        };
        let own_accept = Accept::of_proposal(&proposal, self.config.me, self.config.my_endpoint);
        self.leader_proposal = Some(LeaderProposal {
            candidate: winner,
            proposal_number,
        });

        out.push(ElectionAction::Broadcast(ElectionMessage::Proposal(proposal)));
        self.handle_accept(own_accept, out);
    }

    fn handle_proposal(&mut self, msg: Proposal, local: &LocalCandidacy, out: &mut Vec<ElectionAction>) {
        if self.state != ElectionsState::Acceptor {
            return;
        }
        if msg.server_id == self.config.me {
            return;
        }
        if Some(msg.view) != self.last_installed_view {
            slog::trace!(self.logger, "Stale proposal {:?} from {:?}", msg.view, msg.server_id);
            return;
        }
        if !self.is_known_server(&msg.server_id) || !self.is_known_server(&msg.leader_id) {
            slog::debug!(self.logger, "Proposal involving unknown servers from {:?}", msg.server_id);
            return;
        }

        match self.proposal_store.store_if_increased(msg.proposal_number) {
            Ok(true) => {}
            Ok(false) => {
                slog::info!(
                    self.logger,
                    "Outdated proposal {:?} from {:?}. Last known proposal: {:?}",
                    msg.proposal_number,
                    msg.server_id,
                    self.proposal_store.last_proposal_number()
                );
                return;
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to persist proposal number {:?}: {:?}", msg.proposal_number, e);
                return;
            }
        }

        let candidate = LeaderCandidate::from_proposal(&msg);
        let own = self.own_candidacy(local);
        let legitimacy = LegitimacyCheck {
            candidate: &candidate,
            own: &own,
            servers: &self.servers,
            last_elected_leader: self.last_elected_leader,
            resigning_leader: self.resigning_leader,
        }
        .is_legitimate();
        if let Err(reason) = legitimacy {
            slog::info!(
                self.logger,
                "Not accepting proposal of {:?} from {:?} for view {:?}: {}",
                msg.leader_id,
                msg.server_id,
                msg.view,
                reason
            );
            return;
        }

        slog::info!(
            self.logger,
            "Proposal of {:?} from {:?} for view {:?} with proposal number {:?}",
            msg.leader_id,
            msg.server_id,
            msg.view,
            msg.proposal_number
        );

        if self.leader_proposal.is_none() {
            self.leader_proposal = Some(LeaderProposal {
                candidate,
                proposal_number: msg.proposal_number,
            });
        }

        let proposed = self.leader_proposal.as_ref().map(|p| p.candidate.instance_id);
        if proposed == Some(msg.leader_id) {
            // A proposal is also the proposer's accept.
            let proposer_accept = Accept::of_proposal(&msg, msg.server_id, msg.server_endpoint);
            let own_accept = Accept::of_proposal(&msg, self.config.me, self.config.my_endpoint);
            out.push(ElectionAction::Broadcast(ElectionMessage::Accept(own_accept.clone())));
            self.handle_accept(proposer_accept, out);
            self.handle_accept(own_accept, out);
        }
    }

    fn own_candidacy(&self, local: &LocalCandidacy) -> LeaderCandidate {
        LeaderCandidate {
            instance_id: self.config.me,
            endpoint: self.config.my_endpoint,
            epoch: local.last_epoch,
            last_commit_position: local.last_commit_position,
            writer_checkpoint: local.writer_checkpoint,
            chaser_checkpoint: local.chaser_checkpoint,
            node_priority: self.config.node_priority,
            is_read_only_replica: self.config.is_read_only_replica,
        }
    }

    fn handle_accept(&mut self, msg: Accept, out: &mut Vec<ElectionAction>) {
        if self.state == ElectionsState::Shutdown {
            return;
        }
        if Some(msg.view) != self.last_installed_view {
            slog::trace!(self.logger, "Stale accept {:?} from {:?}", msg.view, msg.server_id);
            return;
        }
        if self.done_for_view == Some(msg.view) {
            return;
        }

        if self.accepts_received.insert(msg.server_id, msg.leader_id) == Some(msg.leader_id) {
            // Duplicate.
            return;
        }

        let proposal = match &self.leader_proposal {
            Some(p) => p,
            None => return,
        };
        if proposal.candidate.instance_id != msg.leader_id {
            return;
        }

        slog::info!(
            self.logger,
            "Accept of {:?} for view {:?} from {:?}",
            msg.leader_id,
            msg.view,
            msg.server_id
        );

        let accepts = self.accepts_received.values().filter(|l| **l == msg.leader_id).count();
        if accepts < self.quorum() {
            return;
        }

        let leader = match self.servers.iter().find(|m| m.instance_id == msg.leader_id) {
            Some(m) => m.clone(),
            None => return,
        };
        let proposal_number = proposal.proposal_number;

        slog::info!(
            self.logger,
            "Elections done for view {:?}. Elected leader {:?}, proposal number {:?}",
            msg.view,
            leader.instance_id,
            proposal_number
        );
        self.done_for_view = Some(msg.view);
        self.leader = Some(leader.instance_id);
        self.last_elected_leader = Some(leader.instance_id);
        self.resigning_leader = None;
        out.push(ElectionAction::ElectionsDone(ElectionsDone {
            installed_view: msg.view,
            proposal_number,
            leader,
        }));
    }

    fn handle_leader_is_resigning(&mut self, msg: LeaderIsResigning, out: &mut Vec<ElectionAction>) {
        if self.state == ElectionsState::Shutdown {
            return;
        }

        slog::info!(self.logger, "Leader {:?} is resigning", msg.leader_id);
        self.resigning_leader = Some(msg.leader_id);
        let ok = msg.acknowledged_by(self.config.me, self.config.my_endpoint);
        out.push(ElectionAction::SendTo(
            msg.leader_endpoint,
            ElectionMessage::LeaderIsResigningOk(ok),
        ));
    }

    fn handle_leader_is_resigning_ok(&mut self, msg: LeaderIsResigningOk, out: &mut Vec<ElectionAction>) {
        if msg.leader_id != self.config.me || self.resigning_leader != Some(self.config.me) {
            return;
        }

        slog::info!(self.logger, "Resignation acknowledged by {:?}", msg.server_id);
        if self.resigning_oks_received.insert(msg.server_id) && self.resigning_oks_received.len() == self.quorum() {
            slog::info!(self.logger, "Majority acknowledged resignation. Initiating leader resignation.");
            out.push(ElectionAction::InitiateLeaderResignation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::InMemoryProposalStore;
    use crate::epoch::EpochId;
    use crate::node_state::VNodeState;
    use std::net::SocketAddr;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn member(port: u16) -> MemberInfo {
        MemberInfo::initial(InstanceId::new_random(), SocketAddr::from(([127, 0, 0, 1], port)), false)
    }

    /// Members of a cluster, ordered the way the coordinator orders them (endpoint descending),
    /// so `members[v % n]` is leader of view `v`.
    fn cluster(n: u16) -> (ClusterInfo, Vec<MemberInfo>) {
        let members: Vec<MemberInfo> = (0..n).map(|i| member(2000 - i)).collect();
        (ClusterInfo::new(members.clone()), members)
    }

    fn coordinator(me: &MemberInfo, cluster: &ClusterInfo) -> ElectionCoordinator<InMemoryProposalStore> {
        ElectionCoordinator::new(
            logger(),
            ElectionConfig {
                me: me.instance_id,
                my_endpoint: me.endpoint,
                is_read_only_replica: false,
                cluster_size: cluster.len(),
                node_priority: 0,
            },
            InMemoryProposalStore::new(),
            cluster,
        )
    }

    fn view_change(from: &MemberInfo, view: u64) -> ElectionMessage {
        ElectionMessage::ViewChange(ViewChange {
            server_id: from.instance_id,
            server_endpoint: from.endpoint,
            attempted_view: View::new(view),
        })
    }

    fn prepare_ok(from: &MemberInfo, view: u64, writer: u64) -> ElectionMessage {
        ElectionMessage::PrepareOk(PrepareOk {
            view: View::new(view),
            server_id: from.instance_id,
            server_endpoint: from.endpoint,
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::new(writer),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
            is_read_only_replica: false,
            cluster_info: ClusterInfo::default(),
        })
    }

    fn done(actions: &[ElectionAction]) -> Vec<&ElectionsDone> {
        actions
            .iter()
            .filter_map(|a| match a {
                ElectionAction::ElectionsDone(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    fn find_broadcast<F: Fn(&ElectionMessage) -> bool>(actions: &[ElectionAction], f: F) -> Option<ElectionMessage> {
        actions.iter().find_map(|a| match a {
            ElectionAction::Broadcast(m) if f(m) => Some(m.clone()),
            _ => None,
        })
    }

    #[test]
    fn single_node_cluster_elects_itself() {
        let (cluster, members) = cluster(1);
        let mut c = coordinator(&members[0], &cluster);

        let actions = c.start_elections(&LocalCandidacy::default());

        let done = done(&actions);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].leader.instance_id, members[0].instance_id);
        assert_eq!(done[0].installed_view, View::initial());
        assert_eq!(done[0].proposal_number, EpochNumber::first());
        assert_eq!(c.leader(), Some(members[0].instance_id));
        assert!(actions.contains(&ElectionAction::ScheduleTimeout(View::initial())));
    }

    #[test]
    fn idle_coordinator_ignores_election_traffic() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);

        let actions = c.handle_message(view_change(&members[0], 4), &LocalCandidacy::default());
        assert!(actions.is_empty());
        assert_eq!(c.last_attempted_view(), None);
    }

    #[test]
    fn higher_view_change_supersedes_current_round() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy::default();

        c.start_elections(&local);
        assert_eq!(c.last_attempted_view(), Some(View::new(0)));

        let actions = c.handle_message(view_change(&members[2], 5), &local);
        assert_eq!(c.last_attempted_view(), Some(View::new(5)));
        assert!(actions.contains(&ElectionAction::ScheduleTimeout(View::new(5))));
        assert!(find_broadcast(&actions, |m| m == &view_change(&members[1], 5)).is_some());

        // Lower views are now stale.
        let actions = c.handle_message(view_change(&members[0], 3), &local);
        assert!(actions.is_empty());
        assert_eq!(c.last_attempted_view(), Some(View::new(5)));
    }

    #[test]
    fn leader_of_view_runs_full_round() {
        let (cluster, members) = cluster(3);
        // members[0] leads view 0.
        let mut c = coordinator(&members[0], &cluster);
        let local = LocalCandidacy::default();

        c.start_elections(&local);
        let actions = c.handle_message(view_change(&members[1], 0), &local);
        assert!(find_broadcast(&actions, |m| matches!(m, ElectionMessage::Prepare(_))).is_some());
        assert_eq!(c.last_installed_view(), Some(View::new(0)));

        // Second vote makes quorum; members[2] has most data and wins.
        let actions = c.handle_message(prepare_ok(&members[2], 0, 100), &local);
        assert_eq!(c.state(), ElectionsState::Leader);
        let proposal = match find_broadcast(&actions, |m| matches!(m, ElectionMessage::Proposal(_))) {
            Some(ElectionMessage::Proposal(p)) => p,
            other => panic!("Expected proposal, got {:?}", other),
        };
        assert_eq!(proposal.leader_id, members[2].instance_id);
        assert!(done(&actions).is_empty());

        // Accept from the winner completes the round.
        let accept = Accept::of_proposal(&proposal, members[2].instance_id, members[2].endpoint);
        let actions = c.handle_message(ElectionMessage::Accept(accept.clone()), &local);
        assert_eq!(done(&actions).len(), 1);
        assert_eq!(c.leader(), Some(members[2].instance_id));

        // Re-delivery changes nothing.
        let actions = c.handle_message(ElectionMessage::Accept(accept), &local);
        assert!(actions.is_empty());
        let actions = c.handle_message(prepare_ok(&members[1], 0, 0), &local);
        assert!(actions.is_empty());
    }

    #[test]
    fn acceptor_votes_and_accepts_proposal() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy::default();
        c.start_elections(&local);

        let actions = c.handle_message(
            ElectionMessage::Prepare(Prepare {
                server_id: members[0].instance_id,
                server_endpoint: members[0].endpoint,
                view: View::new(0),
            }),
            &local,
        );
        assert_eq!(c.state(), ElectionsState::Acceptor);
        assert!(matches!(
            actions.as_slice(),
            [ElectionAction::SendTo(endpoint, ElectionMessage::PrepareOk(_))] if *endpoint == members[0].endpoint
        ));

        let proposal = Proposal {
            server_id: members[0].instance_id,
            server_endpoint: members[0].endpoint,
            leader_id: members[0].instance_id,
            leader_endpoint: members[0].endpoint,
            view: View::new(0),
            proposal_number: EpochNumber::first(),
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::start(),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
        };
        let actions = c.handle_message(ElectionMessage::Proposal(proposal.clone()), &local);

        // Proposer's implicit accept plus our own make a quorum of 2.
        assert_eq!(done(&actions).len(), 1);
        assert!(find_broadcast(&actions, |m| matches!(m, ElectionMessage::Accept(_))).is_some());

        // Same proposal again is outdated.
        let actions = c.handle_message(ElectionMessage::Proposal(proposal), &local);
        assert!(actions.is_empty());
    }

    #[test]
    fn acceptor_rejects_candidate_behind_itself() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy {
            writer_checkpoint: LogPosition::new(500),
            ..LocalCandidacy::default()
        };
        c.start_elections(&local);
        c.handle_message(
            ElectionMessage::Prepare(Prepare {
                server_id: members[0].instance_id,
                server_endpoint: members[0].endpoint,
                view: View::new(0),
            }),
            &local,
        );

        let proposal = Proposal {
            server_id: members[0].instance_id,
            server_endpoint: members[0].endpoint,
            leader_id: members[2].instance_id,
            leader_endpoint: members[2].endpoint,
            view: View::new(0),
            proposal_number: EpochNumber::first(),
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::new(100),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
        };
        let actions = c.handle_message(ElectionMessage::Proposal(proposal), &local);
        assert!(actions.is_empty());
    }

    #[test]
    fn accepts_arriving_before_proposal_still_count() {
        let (cluster, members) = cluster(5);
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy::default();
        c.start_elections(&local);
        c.handle_message(
            ElectionMessage::Prepare(Prepare {
                server_id: members[0].instance_id,
                server_endpoint: members[0].endpoint,
                view: View::new(0),
            }),
            &local,
        );

        let proposal = Proposal {
            server_id: members[0].instance_id,
            server_endpoint: members[0].endpoint,
            leader_id: members[0].instance_id,
            leader_endpoint: members[0].endpoint,
            view: View::new(0),
            proposal_number: EpochNumber::first(),
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::start(),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
        };
        let early = Accept::of_proposal(&proposal, members[3].instance_id, members[3].endpoint);
        assert!(c.handle_message(ElectionMessage::Accept(early), &local).is_empty());

        // Proposer + early accept + our own = 3 = quorum of 5.
        let actions = c.handle_message(ElectionMessage::Proposal(proposal), &local);
        assert_eq!(done(&actions).len(), 1);
    }

    #[test]
    fn timeout_moves_to_next_view_only_while_electing() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy::default();
        c.start_elections(&local);

        // Timeout for a view we're not on.
        assert!(c.elections_timed_out(View::new(7), &local).is_empty());

        let actions = c.elections_timed_out(View::new(0), &local);
        assert_eq!(c.last_attempted_view(), Some(View::new(1)));
        assert!(actions.contains(&ElectionAction::ScheduleTimeout(View::new(1))));
    }

    #[test]
    fn view_change_proof_jumps_to_installed_view() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[2], &cluster);
        let local = LocalCandidacy::default();
        c.start_elections(&local);

        let actions = c.handle_message(
            ElectionMessage::ViewChangeProof(ViewChangeProof {
                server_id: members[0].instance_id,
                server_endpoint: members[0].endpoint,
                installed_view: View::new(3),
            }),
            &local,
        );

        // members[0] leads view 3 in a three node cluster, so we become an acceptor.
        assert_eq!(c.state(), ElectionsState::Acceptor);
        assert_eq!(c.last_installed_view(), Some(View::new(3)));
        assert!(actions.contains(&ElectionAction::ScheduleTimeout(View::new(3))));

        // Once installed, we advertise it.
        let proof = c.send_view_change_proof();
        assert!(matches!(
            proof.as_slice(),
            [ElectionAction::Broadcast(ElectionMessage::ViewChangeProof(p))] if p.installed_view == View::new(3)
        ));
    }

    #[test]
    fn resignation_needs_majority_of_acks() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[0], &cluster);
        let local = LocalCandidacy::default();

        // Not leader yet.
        assert!(c.resign_node().is_empty());

        c.leader_found(&members[0]);
        let actions = c.resign_node();
        assert!(find_broadcast(&actions, |m| matches!(m, ElectionMessage::LeaderIsResigning(_))).is_some());
        assert!(!actions.contains(&ElectionAction::InitiateLeaderResignation));
        assert_eq!(c.resigning_leader(), Some(members[0].instance_id));

        let ok = LeaderIsResigningOk {
            leader_id: members[0].instance_id,
            leader_endpoint: members[0].endpoint,
            server_id: members[1].instance_id,
            server_endpoint: members[1].endpoint,
        };
        let actions = c.handle_message(ElectionMessage::LeaderIsResigningOk(ok.clone()), &local);
        assert_eq!(actions, vec![ElectionAction::InitiateLeaderResignation]);

        // Exactly once.
        let actions = c.handle_message(ElectionMessage::LeaderIsResigningOk(ok), &local);
        assert!(actions.is_empty());
    }

    #[test]
    fn idle_node_acknowledges_resigning_leader() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[1], &cluster);
        assert_eq!(c.state(), ElectionsState::Idle);

        let resigning = LeaderIsResigning {
            leader_id: members[0].instance_id,
            leader_endpoint: members[0].endpoint,
        };
        let actions = c.handle_message(ElectionMessage::LeaderIsResigning(resigning), &LocalCandidacy::default());

        assert_eq!(
            actions,
            vec![ElectionAction::SendTo(
                members[0].endpoint,
                ElectionMessage::LeaderIsResigningOk(LeaderIsResigningOk {
                    leader_id: members[0].instance_id,
                    leader_endpoint: members[0].endpoint,
                    server_id: members[1].instance_id,
                    server_endpoint: members[1].endpoint,
                }),
            )]
        );
        assert_eq!(c.resigning_leader(), Some(members[0].instance_id));
    }

    #[test]
    fn resigning_leader_is_excluded_from_next_proposal() {
        let (cluster, members) = cluster(3);
        let mut c = coordinator(&members[0], &cluster);
        let richest = LocalCandidacy {
            writer_checkpoint: LogPosition::new(1000),
            ..LocalCandidacy::default()
        };
        c.leader_found(&members[0]);
        c.resign_node();

        c.start_elections(&richest);
        c.elections_timed_out(View::new(1), &richest);
        c.elections_timed_out(View::new(2), &richest);
        // View 3 is led by members[0] again.
        assert_eq!(c.last_attempted_view(), Some(View::new(3)));
        c.handle_message(view_change(&members[1], 3), &richest);
        let actions = c.handle_message(prepare_ok(&members[1], 3, 10), &richest);

        match find_broadcast(&actions, |m| matches!(m, ElectionMessage::Proposal(_))) {
            Some(ElectionMessage::Proposal(p)) => assert_eq!(p.leader_id, members[1].instance_id),
            other => panic!("Expected proposal, got {:?}", other),
        }
    }

    #[test]
    fn proposal_number_follows_last_epoch() {
        let (cluster, members) = cluster(1);
        let mut c = coordinator(&members[0], &cluster);
        let local = LocalCandidacy {
            last_epoch: Some(EpochSummary {
                epoch_number: EpochNumber::new(6),
                epoch_position: LogPosition::new(10),
                epoch_id: EpochId::new_random(),
                leader_instance_id: members[0].instance_id,
            }),
            ..LocalCandidacy::default()
        };

        let actions = c.start_elections(&local);
        assert_eq!(done(&actions)[0].proposal_number, EpochNumber::new(7));
    }

    #[test]
    fn live_leader_in_gossip_blocks_worse_proposals() {
        let (_, mut members) = cluster(3);
        members[2].state = VNodeState::Leader;
        let cluster = ClusterInfo::new(members.clone());
        let mut c = coordinator(&members[1], &cluster);
        let local = LocalCandidacy::default();
        c.leader_found(&members[2]);

        // members[0] leads view 3.
        c.handle_message(
            ElectionMessage::Prepare(Prepare {
                server_id: members[0].instance_id,
                server_endpoint: members[0].endpoint,
                view: View::new(3),
            }),
            &local,
        );
        assert_eq!(c.state(), ElectionsState::Acceptor);
        assert_eq!(c.last_installed_view(), Some(View::new(3)));

        let proposal = Proposal {
            server_id: members[0].instance_id,
            server_endpoint: members[0].endpoint,
            leader_id: members[0].instance_id,
            leader_endpoint: members[0].endpoint,
            view: View::new(3),
            proposal_number: EpochNumber::first(),
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::start(),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
        };
        let actions = c.handle_message(ElectionMessage::Proposal(proposal), &local);
        assert!(actions.is_empty());
    }
}
