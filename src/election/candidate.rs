use crate::cluster::{Endpoint, EpochNumber, InstanceId, LogPosition, MemberInfo};
use crate::election::{PrepareOk, Proposal};
use crate::epoch::EpochSummary;
use crate::node_state::VNodeState;
use std::cmp::Ordering;

/// LeaderCandidate is one node's claim to leadership, as reported in its vote.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LeaderCandidate {
    pub(crate) instance_id: InstanceId,
    pub(crate) endpoint: Endpoint,
    pub(crate) epoch: Option<EpochSummary>,
    pub(crate) last_commit_position: LogPosition,
    pub(crate) writer_checkpoint: LogPosition,
    pub(crate) chaser_checkpoint: LogPosition,
    pub(crate) node_priority: i32,
    pub(crate) is_read_only_replica: bool,
}

impl LeaderCandidate {
    pub(crate) fn from_prepare_ok(vote: &PrepareOk) -> Self {
        LeaderCandidate {
            instance_id: vote.server_id,
            endpoint: vote.server_endpoint,
            epoch: vote.epoch,
            last_commit_position: vote.last_commit_position,
            writer_checkpoint: vote.writer_checkpoint,
            chaser_checkpoint: vote.chaser_checkpoint,
            node_priority: vote.node_priority,
            is_read_only_replica: vote.is_read_only_replica,
        }
    }

    pub(crate) fn from_proposal(proposal: &Proposal) -> Self {
        LeaderCandidate {
            instance_id: proposal.leader_id,
            endpoint: proposal.leader_endpoint,
            epoch: proposal.epoch,
            last_commit_position: proposal.last_commit_position,
            writer_checkpoint: proposal.writer_checkpoint,
            chaser_checkpoint: proposal.chaser_checkpoint,
            node_priority: proposal.node_priority,
            is_read_only_replica: false,
        }
    }

    fn epoch_number(&self) -> Option<EpochNumber> {
        self.epoch.map(|e| e.epoch_number)
    }

    fn epoch_position(&self) -> Option<LogPosition> {
        self.epoch.map(|e| e.epoch_position)
    }

    /// Compares how much data each candidate holds, most significant first: epoch number, epoch
    /// position, last commit position, writer checkpoint, chaser checkpoint.
    fn cmp_data(&self, other: &Self) -> Ordering {
        self.epoch_number()
            .cmp(&other.epoch_number())
            .then_with(|| self.epoch_position().cmp(&other.epoch_position()))
            .then_with(|| self.last_commit_position.cmp(&other.last_commit_position))
            .then_with(|| self.writer_checkpoint.cmp(&other.writer_checkpoint))
            .then_with(|| self.chaser_checkpoint.cmp(&other.chaser_checkpoint))
    }

    /// Total order used to pick a winner. Data first, then node priority, then instance id so
    /// that every node picks the same winner from the same votes.
    fn cmp_for_leadership(&self, other: &Self) -> Ordering {
        self.cmp_data(other)
            .then_with(|| self.node_priority.cmp(&other.node_priority))
            .then_with(|| self.instance_id.cmp(&other.instance_id))
    }
}

/// Picks the winner among `candidates`. Read-only replicas and the resigning leader can't win.
pub(crate) fn best_leader_candidate<'a, I>(candidates: I, resigning_leader: Option<InstanceId>) -> Option<LeaderCandidate>
where
    I: IntoIterator<Item = &'a LeaderCandidate>,
{
    candidates
        .into_iter()
        .filter(|c| !c.is_read_only_replica)
        .filter(|c| Some(c.instance_id) != resigning_leader)
        .max_by(|a, b| a.cmp_for_leadership(b))
        .cloned()
}

/// An acceptor only backs a candidate holding at least as much data as itself.
pub(crate) fn is_candidate_good_enough(candidate: &LeaderCandidate, own: &LeaderCandidate) -> bool {
    candidate.cmp_data(own) != Ordering::Less
}

pub(crate) struct LegitimacyCheck<'a> {
    pub(crate) candidate: &'a LeaderCandidate,
    pub(crate) own: &'a LeaderCandidate,
    pub(crate) servers: &'a [MemberInfo],
    pub(crate) last_elected_leader: Option<InstanceId>,
    pub(crate) resigning_leader: Option<InstanceId>,
}

impl<'a> LegitimacyCheck<'a> {
    /// A leader that is still alive and serving may only be replaced by a candidate from a newer
    /// epoch. Otherwise, the candidate must be at least as up to date as we are.
    pub(crate) fn is_legitimate(&self) -> Result<(), &'static str> {
        if Some(self.candidate.instance_id) == self.resigning_leader {
            return Err("candidate is resigning");
        }

        let live_leader = self.servers.iter().find(|m| {
            m.is_alive && Some(m.instance_id) == self.last_elected_leader && m.state == VNodeState::Leader
        });
        if let Some(leader) = live_leader {
            if Some(leader.instance_id) != self.resigning_leader {
                let candidate_epoch = self.candidate.epoch;
                let leader_epoch = leader.epoch;
                let newer_epoch = candidate_epoch.map(|e| e.epoch_number) > leader_epoch.map(|e| e.epoch_number);
                let same_number_other_id = match (candidate_epoch, leader_epoch) {
                    (Some(c), Some(l)) => c.epoch_number == l.epoch_number && c.epoch_id != l.epoch_id,
                    _ => false,
                };

                return if self.candidate.instance_id == leader.instance_id || newer_epoch || same_number_other_id {
                    Ok(())
                } else {
                    Err("previous leader is still alive")
                };
            }
        }

        if self.candidate.instance_id == self.own.instance_id {
            return Ok(());
        }

        if is_candidate_good_enough(self.candidate, self.own) {
            Ok(())
        } else {
            Err("candidate is behind us")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochId;
    use std::net::SocketAddr;

    fn candidate(port: u16) -> LeaderCandidate {
        LeaderCandidate {
            instance_id: InstanceId::new_random(),
            endpoint: SocketAddr::from(([127, 0, 0, 1], port)),
            epoch: None,
            last_commit_position: LogPosition::start(),
            writer_checkpoint: LogPosition::start(),
            chaser_checkpoint: LogPosition::start(),
            node_priority: 0,
            is_read_only_replica: false,
        }
    }

    fn with_epoch(mut c: LeaderCandidate, number: u64, position: u64) -> LeaderCandidate {
        c.epoch = Some(EpochSummary {
            epoch_number: EpochNumber::new(number),
            epoch_position: LogPosition::new(position),
            epoch_id: EpochId::new_random(),
            leader_instance_id: c.instance_id,
        });
        c
    }

    fn best(candidates: &[LeaderCandidate]) -> InstanceId {
        best_leader_candidate(candidates, None).unwrap().instance_id
    }

    #[test]
    fn highest_epoch_number_wins_over_everything_else() {
        let a = with_epoch(candidate(1), 5, 100);
        let mut b = with_epoch(candidate(2), 4, 900);
        b.writer_checkpoint = LogPosition::new(5000);
        b.node_priority = 100;

        assert_eq!(best(&[b, a.clone()]), a.instance_id);
    }

    #[test]
    fn positions_break_epoch_ties_in_order() {
        let base = with_epoch(candidate(1), 3, 100);

        let mut higher_epoch_position = base.clone();
        higher_epoch_position.instance_id = InstanceId::new_random();
        higher_epoch_position.epoch.as_mut().unwrap().epoch_position = LogPosition::new(200);
        assert_eq!(best(&[base.clone(), higher_epoch_position.clone()]), higher_epoch_position.instance_id);

        let mut higher_commit = base.clone();
        higher_commit.instance_id = InstanceId::new_random();
        higher_commit.last_commit_position = LogPosition::new(50);
        let mut higher_writer = base.clone();
        higher_writer.instance_id = InstanceId::new_random();
        higher_writer.writer_checkpoint = LogPosition::new(5000);
        assert_eq!(best(&[higher_writer, higher_commit.clone()]), higher_commit.instance_id);

        let mut higher_chaser = base.clone();
        higher_chaser.instance_id = InstanceId::new_random();
        higher_chaser.chaser_checkpoint = LogPosition::new(10);
        assert_eq!(best(&[base, higher_chaser.clone()]), higher_chaser.instance_id);
    }

    #[test]
    fn priority_then_identity_break_full_data_ties() {
        let a = candidate(1);
        let mut b = a.clone();
        b.instance_id = InstanceId::new_random();
        b.node_priority = 1;
        assert_eq!(best(&[a.clone(), b.clone()]), b.instance_id);

        let mut c = a.clone();
        c.instance_id = InstanceId::new_random();
        let expected = a.instance_id.max(c.instance_id);
        assert_eq!(best(&[a.clone(), c.clone()]), expected);
        assert_eq!(best(&[c, a]), expected);
    }

    #[test]
    fn resigning_leader_and_read_only_replicas_never_win() {
        let leader = with_epoch(candidate(1), 9, 900);
        let mut read_only = with_epoch(candidate(2), 9, 900);
        read_only.is_read_only_replica = true;
        let follower = with_epoch(candidate(3), 8, 800);

        let all = vec![leader.clone(), read_only, follower.clone()];
        let winner = best_leader_candidate(&all, Some(leader.instance_id)).unwrap();
        assert_eq!(winner.instance_id, follower.instance_id);

        assert_eq!(best_leader_candidate(&all[..1], Some(leader.instance_id)), None);
    }

    #[test]
    fn acceptor_rejects_candidates_behind_itself() {
        let own = with_epoch(candidate(1), 2, 100);
        let mut behind = own.clone();
        behind.instance_id = InstanceId::new_random();
        behind.writer_checkpoint = LogPosition::start();
        let mut own_ahead = own.clone();
        own_ahead.writer_checkpoint = LogPosition::new(10);

        let servers = vec![];
        let check = LegitimacyCheck {
            candidate: &behind,
            own: &own_ahead,
            servers: &servers,
            last_elected_leader: None,
            resigning_leader: None,
        };
        assert!(check.is_legitimate().is_err());

        let check = LegitimacyCheck { own: &own, ..check };
        assert!(check.is_legitimate().is_ok());
    }

    #[test]
    fn live_previous_leader_can_only_be_replaced_by_newer_epoch() {
        let own = with_epoch(candidate(1), 2, 100);
        let leader_candidate = with_epoch(candidate(2), 2, 100);
        let mut leader_member = MemberInfo::initial(leader_candidate.instance_id, leader_candidate.endpoint, false);
        leader_member.state = VNodeState::Leader;
        leader_member.epoch = leader_candidate.epoch;
        let servers = vec![leader_member];

        let mut challenger = own.clone();
        challenger.instance_id = InstanceId::new_random();
        challenger.epoch = leader_candidate.epoch;
        challenger.writer_checkpoint = LogPosition::new(1000);

        let check = LegitimacyCheck {
            candidate: &challenger,
            own: &own,
            servers: &servers,
            last_elected_leader: Some(leader_candidate.instance_id),
            resigning_leader: None,
        };
        assert_eq!(check.is_legitimate(), Err("previous leader is still alive"));

        // Once that leader is resigning, normal rules apply.
        let check = LegitimacyCheck {
            resigning_leader: Some(leader_candidate.instance_id),
            ..check
        };
        assert!(check.is_legitimate().is_ok());

        let newer = with_epoch(challenger.clone(), 3, 100);
        let check = LegitimacyCheck {
            candidate: &newer,
            resigning_leader: None,
            ..check
        };
        assert!(check.is_legitimate().is_ok());
    }
}
