use crate::cluster::{Endpoint, InstanceId, LogPosition};
use crate::replication::{ReplicaRole, SubscriptionId};
use tokio::time::Instant;

/// ReplicaAckEntry is the leader's view of one subscribed replica.
pub(crate) struct ReplicaAckEntry {
    pub(crate) subscription_id: SubscriptionId,
    pub(crate) replica_id: InstanceId,
    pub(crate) replica_endpoint: Endpoint,
    pub(crate) is_promotable: bool,
    // None while the replica is still catching up.
    pub(crate) role: Option<ReplicaRole>,
    acked_position: LogPosition,
    last_ack_time: Instant,
}

impl ReplicaAckEntry {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        replica_id: InstanceId,
        replica_endpoint: Endpoint,
        is_promotable: bool,
        now: Instant,
    ) -> Self {
        ReplicaAckEntry {
            subscription_id,
            replica_id,
            replica_endpoint,
            is_promotable,
            role: None,
            acked_position: LogPosition::start(),
            last_ack_time: now,
        }
    }

    pub(crate) fn acked_position(&self) -> LogPosition {
        self.acked_position
    }

    /// Any ack proves the replica is alive, but the position only ratchets forward. Returns true if
    /// the position moved.
    pub(crate) fn ratchet_fwd_ack(&mut self, position: LogPosition, now: Instant) -> bool {
        self.last_ack_time = now;
        if position <= self.acked_position {
            return false;
        }

        self.acked_position = position;
        true
    }

    pub(crate) fn is_expired(&self, now: Instant, ack_timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_ack_time) >= ack_timeout
    }

    pub(crate) fn counts_towards_quorum(&self) -> bool {
        self.is_promotable
    }
}

/// Position held by a quorum of voters, where the leader's own writer checkpoint is one vote.
/// `None` when fewer than `quorum` voters are live.
pub(crate) fn quorum_position(
    writer_checkpoint: LogPosition,
    replica_positions: impl IntoIterator<Item = LogPosition>,
    quorum: usize,
) -> Option<LogPosition> {
    let mut positions: Vec<LogPosition> = replica_positions.into_iter().collect();
    positions.push(writer_checkpoint);
    if quorum == 0 || positions.len() < quorum {
        return None;
    }

    positions.sort_by(|a, b| b.cmp(a));
    // A replica can't be ahead of its leader's durable log.
    Some(positions[quorum - 1].min(writer_checkpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    #[test]
    fn quorum_position_table() {
        fn run(expected: Option<u64>, writer: u64, acks: Vec<u64>, quorum: usize) {
            let acks = acks.into_iter().map(LogPosition::new);
            assert_eq!(
                expected.map(LogPosition::new),
                quorum_position(LogPosition::new(writer), acks, quorum)
            );
        }

        // 1-cluster
        run(Some(7), 7, vec![], 1);

        // 3-cluster
        run(Some(90), 100, vec![90, 80], 2);
        run(Some(100), 100, vec![100, 80], 2);
        run(Some(80), 100, vec![80], 2);
        run(None, 100, vec![], 2);

        // 5-cluster
        run(Some(50), 100, vec![10, 50, 60, 20], 3);
        run(Some(10), 100, vec![10, 5], 3);
        run(None, 100, vec![10], 3);

        // Replica reporting past the leader is clamped.
        run(Some(100), 100, vec![150], 2);
    }

    #[test]
    fn acks_ratchet_forward_but_always_refresh_liveness() {
        let start = Instant::now();
        let mut entry = ReplicaAckEntry::new(
            SubscriptionId::new_random(),
            InstanceId::new_random(),
            SocketAddr::from(([127, 0, 0, 1], 1000)),
            true,
            start,
        );
        let timeout = Duration::from_secs(10);
        assert_eq!(entry.acked_position(), LogPosition::start());

        assert!(entry.ratchet_fwd_ack(LogPosition::new(50), start));
        assert!(!entry.ratchet_fwd_ack(LogPosition::new(40), start + Duration::from_secs(8)));
        assert_eq!(entry.acked_position(), LogPosition::new(50));

        assert!(!entry.is_expired(start + Duration::from_secs(17), timeout));
        assert!(entry.is_expired(start + Duration::from_secs(18), timeout));
    }
}
