mod epoch_manager;
mod epoch_record;
mod epoch_store;

pub(crate) use epoch_manager::EpochManager;
pub use epoch_manager::EpochError;
pub use epoch_manager::EpochValidation;
pub use epoch_record::EpochId;
pub use epoch_record::EpochRecord;
pub use epoch_record::EpochSummary;
pub use epoch_store::EpochStore;
pub use epoch_store::EpochStoreFailureSwitch;
pub use epoch_store::InMemoryEpochStore;
