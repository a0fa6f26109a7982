use crate::cluster::EpochNumber;
use std::io;

/// ProposalStore persists the highest proposal number this node has issued or accepted. A node
/// must never accept or issue a proposal at or below it again, even across restarts.
///
/// The store method is a CAS like operation: it returns true only if it mutated state.
pub trait ProposalStore: Send + 'static {
    fn last_proposal_number(&self) -> Option<EpochNumber>;

    /// Durably store `proposal_number` iff it is greater than the last stored one.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_if_increased(&mut self, proposal_number: EpochNumber) -> io::Result<bool>;
}

// Not durable. Restarting a node with this store forgets its proposals.
#[derive(Default)]
pub struct InMemoryProposalStore {
    last_proposal_number: Option<EpochNumber>,
}

impl InMemoryProposalStore {
    pub fn new() -> Self {
        InMemoryProposalStore::default()
    }
}

impl ProposalStore for InMemoryProposalStore {
    fn last_proposal_number(&self) -> Option<EpochNumber> {
        self.last_proposal_number
    }

    fn store_if_increased(&mut self, proposal_number: EpochNumber) -> io::Result<bool> {
        if Some(proposal_number) <= self.last_proposal_number {
            return Ok(false);
        }

        self.last_proposal_number.replace(proposal_number);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_only_ratchets_forward() {
        let mut store = InMemoryProposalStore::new();
        assert_eq!(store.last_proposal_number(), None);

        assert!(store.store_if_increased(EpochNumber::new(0)).unwrap());
        assert!(store.store_if_increased(EpochNumber::new(4)).unwrap());
        assert!(!store.store_if_increased(EpochNumber::new(4)).unwrap());
        assert!(!store.store_if_increased(EpochNumber::new(2)).unwrap());
        assert_eq!(store.last_proposal_number(), Some(EpochNumber::new(4)));
    }
}
