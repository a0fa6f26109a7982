use crate::actor::{NodeActor, NodeClient};
use crate::cluster::{ClusterInfo, MemberInfo};
use crate::election::ProposalStore;
use crate::epoch::{EpochError, EpochManager, EpochStore};
use crate::node::events::{self, NodeEventListener};
use crate::node::node::{Node, NodeParts};
use crate::node::options::{NodeOptions, NodeOptionsValidated};
use crate::node_state::NodeStateChangeListener;
use crate::transport::Transport;
use std::convert::TryFrom;

pub struct NodeConfig<S: EpochStore, P: ProposalStore, T: Transport> {
    pub logger: slog::Logger,
    pub me: MemberInfo,
    /// Initial membership. Gossip updates replace it later.
    pub cluster_info: ClusterInfo,
    pub options: NodeOptions,
    pub epoch_store: S,
    pub proposal_store: P,
    pub transport: T,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Failed to load epochs")]
    EpochInitialization(#[source] EpochError),
    #[error("Read-only flag of own member info disagrees with options")]
    ReadOnlyMismatch,
}

/// ClusterNode is everything an embedder gets back from `create_node()`.
pub struct ClusterNode {
    pub client: NodeClient,
    /// Must be drained continuously. See `create_node`.
    pub events: NodeEventListener,
    pub state: NodeStateChangeListener,
}

/// Creates a node and spawns its event loop. The node sits in `Initializing` until the embedder
/// calls `system_start()` on its client.
///
/// The returned event stream is unbounded, since the event loop never waits on the embedder. Events
/// pile up in memory until `ClusterNode::events` is drained, so keep reading it (or drop it) for as
/// long as the node runs.
pub fn create_node<S, P, T>(config: NodeConfig<S, P, T>) -> Result<ClusterNode, NodeCreationError>
where
    S: EpochStore,
    P: ProposalStore,
    T: Transport,
{
    let options = NodeOptionsValidated::try_from(config.options)
        .map_err(|e| NodeCreationError::IllegalOptions(e.to_string()))?;
    if config.me.is_read_only_replica != options.is_read_only_replica {
        return Err(NodeCreationError::ReadOnlyMismatch);
    }

    let logger = config
        .logger
        .new(slog::o!("Node" => config.me.instance_id.to_string()));

    let epoch_manager = EpochManager::init(
        logger.new(slog::o!("Component" => "Epochs")),
        config.epoch_store,
        options.epoch_cache_size,
    )
    .map_err(NodeCreationError::EpochInitialization)?;

    let (client, event_queue_rx) = NodeClient::new(64);
    let (events_publisher, events_listener) = events::new();

    let node = Node::new(NodeParts {
        logger: logger.clone(),
        me: config.me,
        cluster_info: config.cluster_info,
        options,
        epoch_manager,
        proposal_store: config.proposal_store,
        transport: config.transport,
        events: events_publisher,
        node_client: client.weak(),
    });
    let state = node.state_change_listener();

    let actor = NodeActor::new(logger, event_queue_rx, node);
    tokio::spawn(actor.run_event_loop());

    Ok(ClusterNode {
        client,
        events: events_listener,
        state,
    })
}
