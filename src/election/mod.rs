mod candidate;
mod coordinator;
mod messages;
mod proposal_store;

pub(crate) use coordinator::ElectionAction;
pub(crate) use coordinator::ElectionConfig;
pub(crate) use coordinator::ElectionCoordinator;
pub use coordinator::ElectionsState;
pub(crate) use coordinator::LocalCandidacy;
pub use messages::Accept;
pub use messages::ElectionMessage;
pub use messages::ElectionsDone;
pub use messages::LeaderIsResigning;
pub use messages::LeaderIsResigningOk;
pub use messages::Prepare;
pub use messages::PrepareOk;
pub use messages::Proposal;
pub use messages::ViewChange;
pub use messages::ViewChangeProof;
pub use proposal_store::InMemoryProposalStore;
pub use proposal_store::ProposalStore;
