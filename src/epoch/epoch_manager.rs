use crate::cluster::{EpochNumber, InstanceId, LogPosition};
use crate::epoch::{EpochId, EpochRecord, EpochStore, EpochSummary};
use chrono::Utc;
use std::collections::VecDeque;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EpochError {
    #[error("Epoch store IO failure: {0}")]
    Io(#[from] io::Error),
    #[error("New epoch number {new:?} is not greater than last epoch number {last:?}")]
    EpochNumberNotIncreasing { last: EpochNumber, new: EpochNumber },
    #[error("New epoch position {new:?} is not greater than last epoch position {last:?}")]
    EpochPositionNotIncreasing { last: LogPosition, new: LogPosition },
    #[error("Replica has data up to {0:?} but reported no epochs")]
    ReplicaDataWithoutEpochs(LogPosition),
    #[error("No epoch after {0:?} is known locally")]
    UnknownEpochSuccessor(EpochNumber),
}

/// Result of walking a replica's epoch chain against ours.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochValidation {
    /// Latest epoch both chains agree on. Anything the replica holds past it is not trusted.
    pub common_epoch: Option<EpochSummary>,
    /// Position the replica may safely resume replication from.
    pub subscription_position: LogPosition,
}

/// EpochManager owns this node's chain of epoch records. It keeps the most recent `cache_size`
/// epochs in memory, ascending by epoch number, and writes new epochs through to the store.
/// Lookups that miss a trimmed cache fall back to the full chain in the store.
pub(crate) struct EpochManager<S: EpochStore> {
    logger: slog::Logger,
    store: S,
    epochs: VecDeque<EpochRecord>,
    cache_size: usize,
    // Older epochs than the cached ones exist in the store.
    trimmed: bool,
}

impl<S: EpochStore> EpochManager<S> {
    pub(crate) fn init(logger: slog::Logger, store: S, cache_size: usize) -> Result<Self, EpochError> {
        let mut manager = EpochManager {
            logger,
            store,
            epochs: VecDeque::new(),
            cache_size: cache_size.max(1),
            trimmed: false,
        };
        manager.reload_cache()?;

        slog::info!(
            manager.logger,
            "Loaded {} epochs. Last epoch: {:?}",
            manager.epochs.len(),
            manager.last_epoch().map(|e| e.summary())
        );

        Ok(manager)
    }

    pub(crate) fn last_epoch(&self) -> Option<&EpochRecord> {
        self.epochs.back()
    }

    pub(crate) fn last_epoch_number(&self) -> Option<EpochNumber> {
        self.last_epoch().map(|e| e.epoch_number)
    }

    /// Most recent `n` epochs, newest first.
    pub(crate) fn get_last_epochs(&self, n: usize) -> Vec<EpochRecord> {
        self.epochs.iter().rev().take(n).cloned().collect()
    }

    /// Position of the first epoch with a number greater than `epoch_number`.
    fn get_epoch_position_after(&self, epoch_number: EpochNumber) -> Result<Option<LogPosition>, EpochError> {
        if self.covered_by_cache(epoch_number) {
            return Ok(epoch_position_after(self.epochs.iter(), epoch_number));
        }

        let all = self.read_chain()?;
        Ok(epoch_position_after(all.iter(), epoch_number))
    }

    fn is_correct_epoch_at(&self, epoch: &EpochSummary) -> Result<bool, EpochError> {
        if self.covered_by_cache(epoch.epoch_number) {
            return Ok(is_correct_epoch_in(self.epochs.iter(), epoch));
        }

        slog::debug!(self.logger, "Epoch {:?} is older than the cache. Reading full chain.", epoch);
        let all = self.read_chain()?;
        Ok(is_correct_epoch_in(all.iter(), epoch))
    }

    fn covered_by_cache(&self, epoch_number: EpochNumber) -> bool {
        match self.epochs.front() {
            Some(oldest) => !self.trimmed || oldest.epoch_number <= epoch_number,
            None => !self.trimmed,
        }
    }

    fn read_chain(&self) -> Result<Vec<EpochRecord>, EpochError> {
        let mut records = self.store.read_all()?;
        records.sort_by_key(|r| r.epoch_number);
        Ok(records)
    }

    /// Appends a new epoch starting at `writer_checkpoint`. Durable before returning `Ok`.
    pub(crate) fn write_new_epoch(
        &mut self,
        epoch_number: EpochNumber,
        writer_checkpoint: LogPosition,
        leader_instance_id: InstanceId,
    ) -> Result<EpochRecord, EpochError> {
        let last = self.last_epoch().map(|e| (e.epoch_number, e.epoch_position));
        if let Some((last_number, last_position)) = last {
            if epoch_number <= last_number {
                return Err(EpochError::EpochNumberNotIncreasing {
                    last: last_number,
                    new: epoch_number,
                });
            }
            if writer_checkpoint <= last_position {
                return Err(EpochError::EpochPositionNotIncreasing {
                    last: last_position,
                    new: writer_checkpoint,
                });
            }
        }

        let record = EpochRecord {
            epoch_number,
            epoch_position: writer_checkpoint,
            epoch_id: EpochId::new_random(),
            prev_epoch_position: last.map(|(_, position)| position),
            leader_instance_id,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.store.append(&record) {
            slog::error!(self.logger, "Failed to persist epoch {:?}: {:?}", record.summary(), e);
            return Err(EpochError::Io(e));
        }

        slog::info!(self.logger, "Wrote new epoch {:?}", record.summary());
        self.push_to_cache(record.clone());

        Ok(record)
    }

    /// Persists and caches an epoch record that arrived through replication. Returns true if the
    /// chain grew. Records at or behind the last known epoch are ignored.
    pub(crate) fn add_replicated_epoch(&mut self, record: EpochRecord) -> Result<bool, EpochError> {
        if let Some(last) = self.last_epoch() {
            if record.epoch_number <= last.epoch_number {
                slog::trace!(self.logger, "Ignoring known or older epoch {:?}", record.summary());
                return Ok(false);
            }
        }

        self.store.append(&record)?;
        slog::debug!(self.logger, "Added replicated epoch {:?}", record.summary());
        self.push_to_cache(record);
        Ok(true)
    }

    /// Walks `replica_epochs` (newest first) to find the latest epoch our chain agrees with, and the
    /// position the replica can resume from.
    pub(crate) fn validate_against(
        &self,
        replica_position: LogPosition,
        replica_epochs: &[EpochSummary],
        writer_checkpoint: LogPosition,
    ) -> Result<EpochValidation, EpochError> {
        if replica_epochs.is_empty() {
            if replica_position > LogPosition::start() {
                return Err(EpochError::ReplicaDataWithoutEpochs(replica_position));
            }
            return Ok(EpochValidation {
                common_epoch: None,
                subscription_position: LogPosition::start(),
            });
        }

        let mut common = None;
        for (i, epoch) in replica_epochs.iter().enumerate() {
            if self.is_correct_epoch_at(epoch)? {
                let after_common = if i > 0 { Some(&replica_epochs[i - 1]) } else { None };
                common = Some((*epoch, after_common));
                break;
            }
        }

        let (common_epoch, after_common) = match common {
            Some(c) => c,
            None => {
                slog::warn!(
                    self.logger,
                    "No common epoch with replica at {:?}. Replica epochs: {:?}",
                    replica_position,
                    replica_epochs
                );
                return Ok(EpochValidation {
                    common_epoch: None,
                    subscription_position: LogPosition::start(),
                });
            }
        };

        // The replica's data past its first divergent epoch can't be trusted at all.
        let replica_position = after_common
            .map(|e| e.epoch_position.min(replica_position))
            .unwrap_or(replica_position);

        let subscription_position = if Some(common_epoch.epoch_number) == self.last_epoch_number() {
            replica_position.min(writer_checkpoint)
        } else {
            let next_epoch_position = self
                .get_epoch_position_after(common_epoch.epoch_number)?
                .ok_or(EpochError::UnknownEpochSuccessor(common_epoch.epoch_number))?;
            replica_position.min(next_epoch_position)
        };

        Ok(EpochValidation {
            common_epoch: Some(common_epoch),
            subscription_position,
        })
    }

    /// Drops every epoch starting at or past `position` after the log was truncated there.
    pub(crate) fn truncate_from(&mut self, position: LogPosition) -> Result<(), EpochError> {
        self.store.truncate_from(position)?;
        self.reload_cache()?;

        slog::info!(
            self.logger,
            "Truncated epochs from {:?}. Last epoch: {:?}",
            position,
            self.last_epoch().map(|e| e.summary())
        );
        Ok(())
    }

    fn reload_cache(&mut self) -> Result<(), EpochError> {
        let records = self.read_chain()?;
        self.epochs.clear();
        self.trimmed = false;
        for record in records {
            self.push_to_cache(record);
        }
        Ok(())
    }

    fn push_to_cache(&mut self, record: EpochRecord) {
        self.epochs.push_back(record);
        while self.epochs.len() > self.cache_size {
            self.epochs.pop_front();
            self.trimmed = true;
        }
    }
}

fn is_correct_epoch_in<'a>(mut records: impl Iterator<Item = &'a EpochRecord>, epoch: &EpochSummary) -> bool {
    records
        .find(|e| e.epoch_number == epoch.epoch_number)
        .map(|e| e.epoch_position == epoch.epoch_position && e.epoch_id == epoch.epoch_id)
        .unwrap_or(false)
}

fn epoch_position_after<'a>(
    mut records: impl Iterator<Item = &'a EpochRecord>,
    epoch_number: EpochNumber,
) -> Option<LogPosition> {
    records.find(|e| e.epoch_number > epoch_number).map(|e| e.epoch_position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::InMemoryEpochStore;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn manager() -> EpochManager<InMemoryEpochStore> {
        EpochManager::init(logger(), InMemoryEpochStore::new(), 100).unwrap()
    }

    fn write(m: &mut EpochManager<InMemoryEpochStore>, number: u64, position: u64) -> EpochRecord {
        m.write_new_epoch(
            EpochNumber::new(number),
            LogPosition::new(position),
            InstanceId::new_random(),
        )
        .unwrap()
    }

    #[test]
    fn write_new_epoch_links_to_previous() {
        let mut m = manager();
        assert_eq!(m.last_epoch_number(), None);

        let first = write(&mut m, 0, 0);
        let second = write(&mut m, 3, 500);

        assert_eq!(first.prev_epoch_position, None);
        assert_eq!(second.prev_epoch_position, Some(LogPosition::new(0)));
        assert_eq!(m.last_epoch_number(), Some(EpochNumber::new(3)));
        assert_eq!(
            m.get_last_epochs(5).iter().map(|e| e.epoch_number).collect::<Vec<_>>(),
            vec![EpochNumber::new(3), EpochNumber::new(0)]
        );
    }

    #[test]
    fn write_new_epoch_rejects_non_increasing_values() {
        let mut m = manager();
        write(&mut m, 2, 100);

        let leader = InstanceId::new_random();
        assert!(matches!(
            m.write_new_epoch(EpochNumber::new(2), LogPosition::new(200), leader),
            Err(EpochError::EpochNumberNotIncreasing { .. })
        ));
        assert!(matches!(
            m.write_new_epoch(EpochNumber::new(3), LogPosition::new(100), leader),
            Err(EpochError::EpochPositionNotIncreasing { .. })
        ));
        assert_eq!(m.get_last_epochs(10).len(), 1);
    }

    #[test]
    fn write_new_epoch_failure_leaves_chain_untouched() {
        let store = InMemoryEpochStore::new();
        let switch = store.failure_switch();
        let mut m = EpochManager::init(logger(), store, 10).unwrap();

        switch.set_failing(true);
        let result = m.write_new_epoch(EpochNumber::first(), LogPosition::start(), InstanceId::new_random());

        assert!(matches!(result, Err(EpochError::Io(_))));
        assert_eq!(m.last_epoch(), None);
    }

    #[test]
    fn init_reloads_persisted_chain() {
        let mut m = manager();
        write(&mut m, 0, 0);
        write(&mut m, 1, 10);
        let records = m.store.read_all().unwrap();

        let reloaded = EpochManager::init(logger(), InMemoryEpochStore::with_records(records), 1).unwrap();
        assert_eq!(reloaded.last_epoch_number(), Some(EpochNumber::new(1)));
        // Cache trimmed to one entry.
        assert_eq!(reloaded.get_last_epochs(10).len(), 1);
    }

    #[test]
    fn add_replicated_epoch_is_idempotent() {
        let mut m = manager();
        let record = EpochRecord {
            epoch_number: EpochNumber::new(4),
            epoch_position: LogPosition::new(40),
            epoch_id: EpochId::new_random(),
            prev_epoch_position: None,
            leader_instance_id: InstanceId::new_random(),
            timestamp: Utc::now(),
        };

        assert!(m.add_replicated_epoch(record.clone()).unwrap());
        assert!(!m.add_replicated_epoch(record).unwrap());
        assert_eq!(m.get_last_epochs(10).len(), 1);
        assert_eq!(m.store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn validate_against_empty_replica() {
        let mut m = manager();
        write(&mut m, 0, 0);
        let writer = LogPosition::new(100);

        let v = m.validate_against(LogPosition::start(), &[], writer).unwrap();
        assert_eq!(v.subscription_position, LogPosition::start());
        assert_eq!(v.common_epoch, None);

        assert!(matches!(
            m.validate_against(LogPosition::new(5), &[], writer),
            Err(EpochError::ReplicaDataWithoutEpochs(_))
        ));
    }

    #[test]
    fn validate_against_replica_on_latest_epoch() {
        let mut m = manager();
        write(&mut m, 0, 0);
        let e1 = write(&mut m, 1, 100);
        let writer = LogPosition::new(150);

        let v = m
            .validate_against(LogPosition::new(120), &[e1.summary()], writer)
            .unwrap();
        assert_eq!(v.common_epoch, Some(e1.summary()));
        assert_eq!(v.subscription_position, LogPosition::new(120));

        // Replica can't be further along than the leader.
        let v = m
            .validate_against(LogPosition::new(400), &[e1.summary()], writer)
            .unwrap();
        assert_eq!(v.subscription_position, writer);
    }

    #[test]
    fn validate_against_diverged_replica() {
        let mut m = manager();
        let e0 = write(&mut m, 0, 0);
        let e1 = write(&mut m, 1, 100);
        write(&mut m, 2, 200);

        // Replica wrote its own epoch 2 at 180 as an ex-leader that never got it replicated.
        let divergent = EpochSummary {
            epoch_number: EpochNumber::new(2),
            epoch_position: LogPosition::new(180),
            epoch_id: EpochId::new_random(),
            leader_instance_id: InstanceId::new_random(),
        };
        let v = m
            .validate_against(
                LogPosition::new(250),
                &[divergent, e1.summary(), e0.summary()],
                LogPosition::new(300),
            )
            .unwrap();

        assert_eq!(v.common_epoch, Some(e1.summary()));
        // Must resume from the start of the divergent epoch, which is before our epoch 2.
        assert_eq!(v.subscription_position, LogPosition::new(180));
    }

    #[test]
    fn validate_against_replica_behind_by_an_epoch() {
        let mut m = manager();
        let e0 = write(&mut m, 0, 0);
        write(&mut m, 1, 100);

        let v = m
            .validate_against(LogPosition::new(150), &[e0.summary()], LogPosition::new(300))
            .unwrap();
        assert_eq!(v.common_epoch, Some(e0.summary()));
        assert_eq!(v.subscription_position, LogPosition::new(100));
    }

    #[test]
    fn validate_against_unknown_chain() {
        let mut m = manager();
        write(&mut m, 0, 0);
        let foreign = EpochSummary {
            epoch_number: EpochNumber::new(0),
            epoch_position: LogPosition::new(0),
            epoch_id: EpochId::new_random(),
            leader_instance_id: InstanceId::new_random(),
        };

        let v = m
            .validate_against(LogPosition::new(70), &[foreign], LogPosition::new(300))
            .unwrap();
        assert_eq!(v.common_epoch, None);
        assert_eq!(v.subscription_position, LogPosition::start());
    }

    #[test]
    fn validate_against_epochs_older_than_cache() {
        let mut m = EpochManager::init(logger(), InMemoryEpochStore::new(), 2).unwrap();
        let e0 = write(&mut m, 0, 0);
        let e1 = write(&mut m, 1, 100);
        write(&mut m, 2, 200);
        write(&mut m, 3, 300);
        assert_eq!(m.get_last_epochs(10).len(), 2);

        let v = m
            .validate_against(LogPosition::new(150), &[e1.summary(), e0.summary()], LogPosition::new(400))
            .unwrap();
        assert_eq!(v.common_epoch, Some(e1.summary()));
        assert_eq!(v.subscription_position, LogPosition::new(150));

        // Successor of an uncached epoch comes from the store, not the oldest cached epoch.
        let v = m
            .validate_against(LogPosition::new(150), &[e0.summary()], LogPosition::new(400))
            .unwrap();
        assert_eq!(v.common_epoch, Some(e0.summary()));
        assert_eq!(v.subscription_position, LogPosition::new(100));
    }

    #[test]
    fn truncate_from_drops_epochs_at_or_past_position() {
        let mut m = EpochManager::init(logger(), InMemoryEpochStore::new(), 2).unwrap();
        let e0 = write(&mut m, 0, 0);
        let e1 = write(&mut m, 1, 100);
        write(&mut m, 2, 200);
        write(&mut m, 3, 300);

        m.truncate_from(LogPosition::new(200)).unwrap();

        assert_eq!(m.last_epoch_number(), Some(EpochNumber::new(1)));
        assert_eq!(
            m.get_last_epochs(10).iter().map(|e| e.summary()).collect::<Vec<_>>(),
            vec![e1.summary(), e0.summary()]
        );
        assert_eq!(m.store.read_all().unwrap().len(), 2);

        // Chain keeps growing from the truncated tip.
        let e2 = write(&mut m, 4, 250);
        assert_eq!(e2.prev_epoch_position, Some(LogPosition::new(100)));
    }

    #[test]
    fn truncate_from_reports_store_failure() {
        let store = InMemoryEpochStore::new();
        let switch = store.failure_switch();
        let mut m = EpochManager::init(logger(), store, 10).unwrap();
        write(&mut m, 0, 0);
        write(&mut m, 1, 100);

        switch.set_failing(true);
        assert!(matches!(m.truncate_from(LogPosition::new(50)), Err(EpochError::Io(_))));
        assert_eq!(m.last_epoch_number(), Some(EpochNumber::new(1)));
    }
}
