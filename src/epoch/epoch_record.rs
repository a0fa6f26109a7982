use crate::cluster::{EpochNumber, InstanceId, LogPosition};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct EpochId(Uuid);

impl EpochId {
    pub fn new_random() -> Self {
        EpochId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        EpochId(uuid)
    }
}

impl fmt::Debug for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// EpochRecord marks the start of a leadership term in the log. Once written it is never changed.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochRecord {
    pub epoch_number: EpochNumber,
    pub epoch_position: LogPosition,
    pub epoch_id: EpochId,
    pub prev_epoch_position: Option<LogPosition>,
    pub leader_instance_id: InstanceId,
    pub timestamp: DateTime<Utc>,
}

impl EpochRecord {
    pub fn summary(&self) -> EpochSummary {
        EpochSummary {
            epoch_number: self.epoch_number,
            epoch_position: self.epoch_position,
            epoch_id: self.epoch_id,
            leader_instance_id: self.leader_instance_id,
        }
    }
}

/// The identifying part of an epoch, as carried in votes, gossip and replica handshakes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EpochSummary {
    pub epoch_number: EpochNumber,
    pub epoch_position: LogPosition,
    pub epoch_id: EpochId,
    pub leader_instance_id: InstanceId,
}
