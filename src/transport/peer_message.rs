use crate::cluster::Endpoint;
use crate::election::ElectionMessage;
use crate::replication::ReplicaAssignment;

/// Everything one node sends another through the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerMessage {
    Election(ElectionMessage),
    Assignment(ReplicaAssignment),
}

/// Transport delivers peer messages. Sends are fire and forget: the transport may drop, duplicate
/// or reorder messages, and `send` must never block the caller.
pub trait Transport: Send + 'static {
    fn send(&self, to: Endpoint, message: PeerMessage);
}
