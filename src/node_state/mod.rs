mod driver;
mod state_change_listener;
mod vnode_state;

pub use driver::CorrelationId;
pub(crate) use driver::DriverAction;
pub use driver::NodeCommand;
pub(crate) use driver::StateTransitionDriver;
pub use state_change_listener::NodeStateChangeListener;
pub use state_change_listener::NodeStateSnapshot;
pub use vnode_state::VNodeState;
