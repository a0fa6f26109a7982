use crate::actor::{TimerEvent, WeakNodeClient};
use crate::timers::cancel::{self, CancelCheck, CancelOnDrop};
use crate::timers::time::{Clock, RealClock};
use crate::timers::wake_slot::WakeSlot;
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// TimeoutTimerHandle delivers its event to the node once, after a random delay within the
/// configured range, unless the handle is dropped first or the deadline is pushed out with
/// `reset()`. Election progress timeouts and the leader discovery timeout use it.
pub(crate) struct TimeoutTimerHandle<C: Clock = RealClock> {
    wake_slot: WakeSlot,
    timeout_range: RangeInclusive<Duration>,
    clock: C,
    _cancel: CancelOnDrop,
}

struct TimeoutTimerTask<C: Clock> {
    wake_slot: WakeSlot,
    node_client: WeakNodeClient,
    event: TimerEvent,
    clock: C,
    cancel_check: CancelCheck,
}

impl TimeoutTimerHandle {
    pub(crate) fn spawn_timer_task(
        min_timeout: Duration,
        max_timeout: Duration,
        node_client: WeakNodeClient,
        event: TimerEvent,
    ) -> Self {
        let (task, handle) = TimeoutTimerTask::new(min_timeout, max_timeout, node_client, event, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> TimeoutTimerHandle<C> {
    /// Pushes the deadline out to a fresh random timeout from now.
    pub(crate) fn reset(&self) {
        self.wake_slot.set(self.random_wake_time());
    }

    fn random_wake_time(&self) -> Instant {
        let (min, max) = (*self.timeout_range.start(), *self.timeout_range.end());
        let timeout = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        self.clock.now() + timeout
    }
}

impl<C: Clock> TimeoutTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        node_client: WeakNodeClient,
        event: TimerEvent,
        clock: C,
    ) -> (Self, TimeoutTimerHandle<C>) {
        let wake_slot = WakeSlot::new();
        let (cancel_on_drop, cancel_check) = cancel::new();

        let task = TimeoutTimerTask {
            wake_slot: wake_slot.clone(),
            node_client,
            event,
            clock: clock.clone(),
            cancel_check,
        };
        let handle = TimeoutTimerHandle {
            wake_slot,
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            clock,
            _cancel: cancel_on_drop,
        };

        // The slot must hold a deadline before the task first looks at it, otherwise the task
        // would fire immediately.
        handle.reset();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            match self.wake_slot.take() {
                Some(wake_time) => self.clock.sleep_until(wake_time).await,
                None => {
                    if !self.cancel_check.is_cancelled() {
                        let _ = self.node_client.timer_event(self.event.clone()).await;
                    }
                    return;
                }
            }

            if self.cancel_check.is_cancelled() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::NodeClient;
    use crate::cluster::View;
    use crate::timers::test_utils::TestUtilActor;
    use crate::timers::time;

    #[tokio::test]
    async fn timeout_fires_once_after_deadline() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (client, rx) = NodeClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut controller) = time::mocked_clock();
        let event = TimerEvent::ElectionsTimedOut(View::new(3));

        let (task, _handle) = TimeoutTimerTask::new(timeout, timeout, client.weak(), event.clone(), mock_clock);
        let join_handle = tokio::task::spawn(task.run());

        // -- execute & verify --
        let one_ns = Duration::from_nanos(1);
        controller.advance(timeout - one_ns);
        actor.assert_no_event().await;

        controller.advance(one_ns);
        actor.assert_timer_event(event).await;

        // One-shot: the task exits and nothing else arrives.
        join_handle.await.unwrap();
        controller.advance(timeout * 3);
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn reset_pushes_deadline_out() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (client, rx) = NodeClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut controller) = time::mocked_clock();

        let (task, handle) = TimeoutTimerTask::new(
            timeout,
            timeout,
            client.weak(),
            TimerEvent::LeaderDiscoveryTimedOut,
            mock_clock,
        );
        tokio::task::spawn(task.run());

        // -- execute & verify --
        for _ in 0..4 {
            controller.advance(timeout / 2);
            handle.reset();
        }
        actor.assert_no_event().await;
        assert_eq!(controller.elapsed(), timeout * 2);

        controller.advance(timeout);
        actor.assert_timer_event(TimerEvent::LeaderDiscoveryTimedOut).await;
    }

    #[tokio::test]
    async fn dropped_handle_cancels_timeout() {
        // -- setup --
        let timeout = Duration::from_millis(100);
        let (client, rx) = NodeClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (mock_clock, mut controller) = time::mocked_clock();

        let (task, handle) = TimeoutTimerTask::new(
            timeout,
            timeout,
            client.weak(),
            TimerEvent::ElectionsTimedOut(View::initial()),
            mock_clock,
        );
        let join_handle = tokio::task::spawn(task.run());

        // -- execute --
        drop(handle);
        controller.advance(timeout * 2);

        // -- verify --
        join_handle.await.unwrap();
        actor.assert_no_event().await;
    }
}
