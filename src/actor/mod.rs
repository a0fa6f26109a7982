mod client;
mod event;
mod event_loop;

pub use client::NodeClient;
pub use client::NodeClientError;
pub use client::WeakNodeClient;
pub(crate) use event::Callback;
pub(crate) use event::Event;
pub(crate) use event::TimerEvent;
pub(crate) use event_loop::NodeActor;
