use std::fmt;

/// Byte offset into the transaction log.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LogPosition(u64);

impl LogPosition {
    pub const fn new(position: u64) -> Self {
        LogPosition(position)
    }

    pub const fn start() -> Self {
        LogPosition(0)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Number of bytes `self` is ahead of `other`, or zero if it is not ahead.
    pub fn distance_from(&self, other: LogPosition) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Debug for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LogPosition {
    fn from(position: u64) -> Self {
        LogPosition(position)
    }
}

/// View is a per-node election round counter. A node that has never attempted a view holds
/// `None` wherever an `Option<View>` is used, which orders below every real view.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct View(u64);

impl View {
    pub const fn new(view: u64) -> Self {
        View(view)
    }

    pub const fn initial() -> Self {
        View(0)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        View(self.0 + 1)
    }

    /// The view that follows `last`, or the initial view if nothing was attempted yet.
    pub fn after(last: Option<View>) -> Self {
        last.map(|v| v.next()).unwrap_or_else(View::initial)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Leadership term number. Proposal numbers share this type, because the winning proposal number
/// becomes the epoch number written by the new leader.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EpochNumber(u64);

impl EpochNumber {
    pub const fn new(number: u64) -> Self {
        EpochNumber(number)
    }

    pub const fn first() -> Self {
        EpochNumber(0)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        EpochNumber(self.0 + 1)
    }

    pub fn after(last: Option<EpochNumber>) -> Self {
        last.map(|n| n.next()).unwrap_or_else(EpochNumber::first)
    }
}

impl fmt::Debug for EpochNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}
