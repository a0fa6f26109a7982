use crate::actor::Event;
use crate::election::ProposalStore;
use crate::epoch::EpochStore;
use crate::node::Node;
use crate::transport::Transport;
use tokio::sync::mpsc;

/// NodeActor is the node's logic in actor model. It is the only owner of node state, so events are
/// handled strictly one at a time.
pub(crate) struct NodeActor<S: EpochStore, P: ProposalStore, T: Transport> {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    node: Node<S, P, T>,
}

impl<S: EpochStore, P: ProposalStore, T: Transport> NodeActor<S, P, T> {
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, node: Node<S, P, T>) -> Self {
        NodeActor { logger, receiver, node }
    }

    pub(crate) async fn run_event_loop(mut self) {
        slog::info!(self.logger, "Node event loop started");
        while let Some(event) = self.receiver.recv().await {
            // This must NOT be async.
            self.node.handle_event(event);
        }
        slog::info!(self.logger, "Node event loop exited. All clients dropped.");
    }
}
