use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct NodeOptions {
    /// Number of nodes that can become leader. Drives the quorum size. Required.
    pub cluster_size: Option<usize>,
    pub is_read_only_replica: Option<bool>,
    pub node_priority: Option<i32>,
    pub election_timeout: Option<Duration>,
    pub view_change_proof_interval: Option<Duration>,
    pub gossip_interval: Option<Duration>,
    pub leader_discovery_timeout: Option<Duration>,
    pub replica_ack_timeout: Option<Duration>,
    pub no_quorum_timeout: Option<Duration>,
    pub replication_tick_interval: Option<Duration>,
    /// Bytes behind the leader a catching up replica may be to get a role.
    pub clone_promotion_threshold: Option<u64>,
    pub epoch_cache_size: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeOptionsValidated {
    pub(crate) cluster_size: usize,
    pub(crate) is_read_only_replica: bool,
    pub(crate) node_priority: i32,
    pub(crate) election_timeout: Duration,
    pub(crate) view_change_proof_interval: Duration,
    pub(crate) gossip_interval: Duration,
    pub(crate) leader_discovery_timeout: Duration,
    pub(crate) replica_ack_timeout: Duration,
    pub(crate) no_quorum_timeout: Duration,
    pub(crate) replication_tick_interval: Duration,
    pub(crate) clone_promotion_threshold: u64,
    pub(crate) epoch_cache_size: usize,
}

impl NodeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.cluster_size == 0 {
            return Err("Cluster size must be at least 1");
        }
        let durations = [
            self.election_timeout,
            self.view_change_proof_interval,
            self.gossip_interval,
            self.leader_discovery_timeout,
            self.replica_ack_timeout,
            self.no_quorum_timeout,
            self.replication_tick_interval,
        ];
        if durations.iter().any(|d| d.as_nanos() == 0) {
            return Err("Timeouts and intervals must be non-zero");
        }
        if self.view_change_proof_interval < self.election_timeout {
            return Err("View change proof interval must not be shorter than the election timeout");
        }
        if self.leader_discovery_timeout < self.gossip_interval {
            return Err("Leader discovery timeout must cover at least one gossip interval");
        }
        if self.replication_tick_interval >= self.replica_ack_timeout {
            return Err("Replication tick interval must be less than the replica ack timeout");
        }
        if self.epoch_cache_size == 0 {
            return Err("Epoch cache size must be at least 1");
        }

        Ok(())
    }
}

impl TryFrom<NodeOptions> for NodeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: NodeOptions) -> Result<Self, Self::Error> {
        let values = NodeOptionsValidated {
            cluster_size: options.cluster_size.ok_or("Cluster size is required")?,
            is_read_only_replica: options.is_read_only_replica.unwrap_or(false),
            node_priority: options.node_priority.unwrap_or(0),
            election_timeout: options.election_timeout.unwrap_or(Duration::from_millis(1000)),
            view_change_proof_interval: options
                .view_change_proof_interval
                .unwrap_or(Duration::from_millis(5000)),
            gossip_interval: options.gossip_interval.unwrap_or(Duration::from_millis(2000)),
            leader_discovery_timeout: options.leader_discovery_timeout.unwrap_or(Duration::from_millis(2000)),
            replica_ack_timeout: options.replica_ack_timeout.unwrap_or(Duration::from_secs(10)),
            no_quorum_timeout: options.no_quorum_timeout.unwrap_or(Duration::from_millis(3000)),
            replication_tick_interval: options.replication_tick_interval.unwrap_or(Duration::from_millis(500)),
            clone_promotion_threshold: options.clone_promotion_threshold.unwrap_or(1024),
            epoch_cache_size: options.epoch_cache_size.unwrap_or(10),
        };

        values.validate()?;
        Ok(values)
    }
}
