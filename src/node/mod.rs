mod events;
mod node;
mod options;
mod status;
mod wiring;

pub(crate) use node::Node;
pub use events::NodeEvent;
pub use events::NodeEventListener;
pub use options::NodeOptions;
pub use status::NodeStatus;
pub use wiring::create_node;
pub use wiring::ClusterNode;
pub use wiring::NodeConfig;
pub use wiring::NodeCreationError;
