mod member;
mod positions;
mod quorum;

pub use member::ClusterInfo;
pub use member::Endpoint;
pub use member::InstanceId;
pub use member::MemberInfo;
pub use positions::EpochNumber;
pub use positions::LogPosition;
pub use positions::View;
pub(crate) use quorum::majority_of;
