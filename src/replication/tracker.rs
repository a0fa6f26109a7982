use crate::cluster::{majority_of, Endpoint, InstanceId, LogPosition};
use crate::epoch::{EpochManager, EpochStore};
use crate::replication::replica_ack::{self, ReplicaAckEntry};
use crate::replication::{
    ReplicaAssignment, ReplicaRole, ReplicaWriteAck, SubscribeReplicaError, SubscribeReplicaInput,
    SubscribeReplicaOutput, SubscriptionId,
};
use std::cmp;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub(crate) struct ReplicationTrackerConfig {
    pub(crate) me: InstanceId,
    pub(crate) cluster_size: usize,
    pub(crate) replica_ack_timeout: Duration,
    pub(crate) no_quorum_timeout: Duration,
    pub(crate) clone_promotion_threshold: u64,
}

/// What the tracker wants the rest of the node to know or do.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ReplicationOutput {
    ReplicatedTo(LogPosition),
    CommittedTo(LogPosition),
    QuorumLost,
    QuorumRestored,
    Assign {
        replica_endpoint: Endpoint,
        assignment: ReplicaAssignment,
    },
    /// The index caught up with everything written before resignation started.
    ResignationCaughtUp,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum TrackerState {
    Inactive,
    Active,
    Resigning { target: LogPosition },
}

/// ReplicationTracker is the leader's bookkeeping of replica acknowledgements. It derives the
/// quorum durable position (ReplicatedTo) and, together with the indexer's progress,
/// CommittedTo. It only tracks while this node is leader.
///
/// Invariant: `committed_to <= replicated_to <= writer_checkpoint`.
pub(crate) struct ReplicationTracker {
    logger: slog::Logger,
    config: ReplicationTrackerConfig,
    state: TrackerState,
    replicas: HashMap<SubscriptionId, ReplicaAckEntry>,

    writer_checkpoint: LogPosition,
    replicated_to: LogPosition,
    indexed_to: LogPosition,
    committed_to: LogPosition,

    no_quorum_since: Option<Instant>,
    quorum_lost_reported: bool,
}

impl ReplicationTracker {
    pub(crate) fn new(logger: slog::Logger, config: ReplicationTrackerConfig) -> Self {
        ReplicationTracker {
            logger,
            config,
            state: TrackerState::Inactive,
            replicas: HashMap::new(),
            writer_checkpoint: LogPosition::start(),
            replicated_to: LogPosition::start(),
            indexed_to: LogPosition::start(),
            committed_to: LogPosition::start(),
            no_quorum_since: None,
            quorum_lost_reported: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.state == TrackerState::Active
    }

    #[cfg(test)]
    pub(crate) fn is_resigning(&self) -> bool {
        matches!(self.state, TrackerState::Resigning { .. })
    }

    pub(crate) fn replicated_to(&self) -> LogPosition {
        self.replicated_to
    }

    pub(crate) fn committed_to(&self) -> LogPosition {
        self.committed_to
    }

    pub(crate) fn writer_checkpoint(&self) -> LogPosition {
        self.writer_checkpoint
    }

    fn quorum(&self) -> usize {
        majority_of(self.config.cluster_size)
    }

    /// Starts tracking as leader. Replicas subscribed to a previous leader re-subscribe, so
    /// tracking starts from scratch.
    pub(crate) fn activate(&mut self, now: Instant) -> Vec<ReplicationOutput> {
        slog::info!(self.logger, "Activating replication tracking at writer checkpoint {:?}", self.writer_checkpoint);
        self.state = TrackerState::Active;
        self.replicas.clear();
        self.no_quorum_since = None;
        self.quorum_lost_reported = false;

        let mut out = Vec::new();
        self.recompute(&mut out);
        self.check_quorum_liveness(now, &mut out);
        out
    }

    pub(crate) fn deactivate(&mut self) {
        if self.state != TrackerState::Inactive {
            slog::info!(self.logger, "Deactivating replication tracking");
        }
        self.state = TrackerState::Inactive;
        self.replicas.clear();
        self.no_quorum_since = None;
        self.quorum_lost_reported = false;
    }

    pub(crate) fn subscribe<S: EpochStore>(
        &mut self,
        input: SubscribeReplicaInput,
        epoch_manager: &EpochManager<S>,
        now: Instant,
    ) -> Result<(SubscribeReplicaOutput, Vec<ReplicationOutput>), SubscribeReplicaError> {
        match self.state {
            TrackerState::Inactive => return Err(SubscribeReplicaError::NotLeader),
            TrackerState::Resigning { .. } => return Err(SubscribeReplicaError::LeaderResigning),
            TrackerState::Active => {}
        }
        if input.leader_id != self.config.me {
            return Err(SubscribeReplicaError::LeaderMismatch {
                requested: input.leader_id,
                actual: self.config.me,
            });
        }

        let validation = epoch_manager
            .validate_against(input.log_position, &input.last_epochs, self.writer_checkpoint)
            .map_err(SubscribeReplicaError::InvalidReplicaEpochs)?;

        let truncate_to = if input.log_position > validation.subscription_position {
            slog::warn!(
                self.logger,
                "Replica {:?} at {:?} diverged from our log. It must truncate to {:?}. Common epoch: {:?}",
                input.replica_id,
                input.log_position,
                validation.subscription_position,
                validation.common_epoch
            );
            Some(validation.subscription_position)
        } else {
            None
        };

        slog::info!(
            self.logger,
            "Subscribed replica {:?} ({:?}) at {:?}. Promotable: {}",
            input.replica_id,
            input.subscription_id,
            validation.subscription_position,
            input.is_promotable
        );

        // Counts nothing until the replica acks what it actually holds.
        let entry = ReplicaAckEntry::new(
            input.subscription_id,
            input.replica_id,
            input.replica_endpoint,
            input.is_promotable,
            now,
        );
        if let Some(old) = self.replicas.insert(input.subscription_id, entry) {
            slog::debug!(self.logger, "Replaced existing subscription {:?}", old.subscription_id);
        }

        let mut out = Vec::new();
        self.maybe_assign_role(input.subscription_id, &mut out);
        self.recompute(&mut out);
        self.check_quorum_liveness(now, &mut out);

        let output = SubscribeReplicaOutput {
            subscription_id: input.subscription_id,
            subscription_position: validation.subscription_position,
            common_epoch: validation.common_epoch,
            truncate_to,
        };
        Ok((output, out))
    }

    pub(crate) fn replica_ack(&mut self, ack: ReplicaWriteAck, now: Instant) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if self.state == TrackerState::Inactive {
            return out;
        }

        let entry = match self.replicas.get_mut(&ack.subscription_id) {
            Some(e) => e,
            None => {
                slog::debug!(self.logger, "Ack for unknown subscription {:?}", ack.subscription_id);
                return out;
            }
        };
        if !entry.ratchet_fwd_ack(ack.replication_log_position, now) {
            slog::trace!(
                self.logger,
                "Stale ack {:?} from {:?}",
                ack.replication_log_position,
                ack.subscription_id
            );
            return out;
        }

        self.maybe_assign_role(ack.subscription_id, &mut out);
        self.recompute(&mut out);
        out
    }

    pub(crate) fn replica_disconnected(&mut self, subscription_id: SubscriptionId) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if let Some(entry) = self.replicas.remove(&subscription_id) {
            slog::info!(self.logger, "Replica {:?} ({:?}) disconnected", entry.replica_id, subscription_id);
            self.after_removal(&entry, &mut out);
        }
        out
    }

    pub(crate) fn writer_checkpoint_flushed(&mut self, position: LogPosition) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if position <= self.writer_checkpoint {
            return out;
        }

        self.writer_checkpoint = position;
        self.recompute(&mut out);
        out
    }

    /// Forgets positions past a truncation point. Only replicas truncate, so tracking is inactive.
    pub(crate) fn log_truncated(&mut self, position: LogPosition) {
        if self.state != TrackerState::Inactive {
            slog::error!(self.logger, "Log truncated to {:?} while tracking replicas", position);
        }
        self.writer_checkpoint = cmp::min(self.writer_checkpoint, position);
        self.replicated_to = cmp::min(self.replicated_to, position);
        self.indexed_to = cmp::min(self.indexed_to, position);
        self.committed_to = cmp::min(self.committed_to, position);
    }

    /// The indexer absorbed everything up to `position`.
    pub(crate) fn indexed_to(&mut self, position: LogPosition) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if position <= self.indexed_to {
            return out;
        }

        self.indexed_to = position;
        self.advance_committed(&mut out);
        self.check_resignation(&mut out);
        out
    }

    /// Stop admitting replicas and report once the index has caught up with everything written
    /// so far. Acked but unindexed writes would otherwise become invisible after handover.
    pub(crate) fn start_resignation(&mut self) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if self.state != TrackerState::Active {
            return out;
        }

        slog::info!(
            self.logger,
            "Resigning. Waiting for index to reach {:?}, currently at {:?}",
            self.writer_checkpoint,
            self.indexed_to
        );
        self.state = TrackerState::Resigning {
            target: self.writer_checkpoint,
        };
        self.check_resignation(&mut out);
        out
    }

    /// Periodic housekeeping: expire silent replicas and watch for lost quorum.
    pub(crate) fn tick(&mut self, now: Instant) -> Vec<ReplicationOutput> {
        let mut out = Vec::new();
        if self.state == TrackerState::Inactive {
            return out;
        }

        let timeout = self.config.replica_ack_timeout;
        let expired: Vec<SubscriptionId> = self
            .replicas
            .values()
            .filter(|e| e.is_expired(now, timeout))
            .map(|e| e.subscription_id)
            .collect();
        for subscription_id in expired {
            if let Some(entry) = self.replicas.remove(&subscription_id) {
                slog::warn!(
                    self.logger,
                    "Replica {:?} ({:?}) timed out without acks",
                    entry.replica_id,
                    subscription_id
                );
                self.after_removal(&entry, &mut out);
            }
        }

        self.check_quorum_liveness(now, &mut out);
        out
    }

    fn after_removal(&mut self, removed: &ReplicaAckEntry, out: &mut Vec<ReplicationOutput>) {
        if removed.role == Some(ReplicaRole::Follower) {
            self.promote_best_clone(out);
        }
        // Removing a voter can never raise the quorum position, and ReplicatedTo never moves
        // back, so there's nothing to recompute.
    }

    fn maybe_assign_role(&mut self, subscription_id: SubscriptionId, out: &mut Vec<ReplicationOutput>) {
        let followers = self.follower_count();
        let max_followers = self.config.cluster_size.saturating_sub(1);
        let threshold = self.config.clone_promotion_threshold;
        let writer_checkpoint = self.writer_checkpoint;
        let leader_id = self.config.me;

        let entry = match self.replicas.get_mut(&subscription_id) {
            Some(e) => e,
            None => return,
        };
        if entry.role.is_some() || writer_checkpoint.distance_from(entry.acked_position()) > threshold {
            return;
        }

        let role = if !entry.is_promotable {
            ReplicaRole::ReadOnly
        } else if followers < max_followers {
            ReplicaRole::Follower
        } else {
            ReplicaRole::Clone
        };
        entry.role = Some(role);

        slog::info!(self.logger, "Replica {:?} caught up. Assigning {:?}", entry.replica_id, role);
        out.push(ReplicationOutput::Assign {
            replica_endpoint: entry.replica_endpoint,
            assignment: ReplicaAssignment {
                leader_id,
                subscription_id,
                role,
            },
        });
    }

    fn promote_best_clone(&mut self, out: &mut Vec<ReplicationOutput>) {
        let leader_id = self.config.me;
        let best_clone = self
            .replicas
            .values_mut()
            .filter(|e| e.role == Some(ReplicaRole::Clone))
            .max_by_key(|e| e.acked_position());

        if let Some(clone) = best_clone {
            clone.role = Some(ReplicaRole::Follower);
            slog::info!(self.logger, "Promoting clone {:?} to follower", clone.replica_id);
            out.push(ReplicationOutput::Assign {
                replica_endpoint: clone.replica_endpoint,
                assignment: ReplicaAssignment {
                    leader_id,
                    subscription_id: clone.subscription_id,
                    role: ReplicaRole::Follower,
                },
            });
        }
    }

    fn follower_count(&self) -> usize {
        self.replicas
            .values()
            .filter(|e| e.role == Some(ReplicaRole::Follower))
            .count()
    }

    fn live_voters(&self) -> usize {
        1 + self.replicas.values().filter(|e| e.counts_towards_quorum()).count()
    }

    fn recompute(&mut self, out: &mut Vec<ReplicationOutput>) {
        if self.state == TrackerState::Inactive {
            return;
        }

        let positions = self
            .replicas
            .values()
            .filter(|e| e.counts_towards_quorum())
            .map(|e| e.acked_position());
        let candidate = replica_ack::quorum_position(self.writer_checkpoint, positions, self.quorum());

        match candidate {
            Some(position) if position > self.replicated_to => {
                slog::debug!(self.logger, "ReplicatedTo advanced to {:?}", position);
                self.replicated_to = position;
                out.push(ReplicationOutput::ReplicatedTo(position));
                self.advance_committed(out);
            }
            _ => {}
        }
    }

    fn advance_committed(&mut self, out: &mut Vec<ReplicationOutput>) {
        let committed = self.indexed_to.min(self.replicated_to);
        if committed > self.committed_to {
            self.committed_to = committed;
            out.push(ReplicationOutput::CommittedTo(committed));
        }
    }

    fn check_resignation(&mut self, out: &mut Vec<ReplicationOutput>) {
        if let TrackerState::Resigning { target } = self.state {
            if self.indexed_to >= target {
                slog::info!(self.logger, "Index caught up to {:?}. Resignation can complete.", target);
                self.deactivate();
                out.push(ReplicationOutput::ResignationCaughtUp);
            }
        }
    }

    fn check_quorum_liveness(&mut self, now: Instant, out: &mut Vec<ReplicationOutput>) {
        if self.live_voters() >= self.quorum() {
            self.no_quorum_since = None;
            if self.quorum_lost_reported {
                slog::info!(self.logger, "Quorum of replicas restored");
                self.quorum_lost_reported = false;
                out.push(ReplicationOutput::QuorumRestored);
            }
            return;
        }

        let since = *self.no_quorum_since.get_or_insert(now);
        if !self.quorum_lost_reported && now.saturating_duration_since(since) >= self.config.no_quorum_timeout {
            slog::warn!(
                self.logger,
                "No quorum of replicas for {:?}. Live voters: {}, needed: {}",
                now.saturating_duration_since(since),
                self.live_voters(),
                self.quorum()
            );
            self.quorum_lost_reported = true;
            out.push(ReplicationOutput::QuorumLost);
        }
    }
}
