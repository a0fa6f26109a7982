mod cancel;
mod interval_timer;
mod time;
mod timeout_timer;
mod wake_slot;

#[cfg(test)]
mod test_utils;

pub(crate) use interval_timer::IntervalTimerHandle;
pub(crate) use time::Clock;
pub(crate) use time::RealClock;
pub(crate) use timeout_timer::TimeoutTimerHandle;

#[cfg(test)]
pub(crate) use time::mocked_clock;
