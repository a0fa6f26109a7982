mod in_memory;
mod peer_message;

pub use in_memory::InMemoryNetwork;
pub use in_memory::InMemoryTransport;
pub use peer_message::PeerMessage;
pub use peer_message::Transport;
