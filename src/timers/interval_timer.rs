use crate::actor::{TimerEvent, WeakNodeClient};
use crate::timers::cancel::{self, CancelCheck, CancelOnDrop};
use crate::timers::time::{Clock, RealClock};
use tokio::time::Duration;

/// IntervalTimerHandle delivers its event to the node every `period` until dropped. The first
/// event is delivered one full period after spawning.
pub(crate) struct IntervalTimerHandle {
    _cancel: CancelOnDrop,
}

struct IntervalTimerTask<C: Clock> {
    period: Duration,
    node_client: WeakNodeClient,
    event: TimerEvent,
    clock: C,
    cancel_check: CancelCheck,
}

impl IntervalTimerHandle {
    pub(crate) fn spawn_timer_task(period: Duration, node_client: WeakNodeClient, event: TimerEvent) -> Self {
        let (task, handle) = IntervalTimerTask::new(period, node_client, event, RealClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock> IntervalTimerTask<C> {
    fn new(
        period: Duration,
        node_client: WeakNodeClient,
        event: TimerEvent,
        clock: C,
    ) -> (Self, IntervalTimerHandle) {
        let (cancel_on_drop, cancel_check) = cancel::new();
        let task = IntervalTimerTask {
            period,
            node_client,
            event,
            clock,
            cancel_check,
        };

        (task, IntervalTimerHandle { _cancel: cancel_on_drop })
    }

    async fn run(mut self) {
        // Deadlines advance by whole periods from the start, so a slow actor doesn't make the
        // ticks drift.
        let mut next_tick = self.clock.now() + self.period;
        loop {
            self.clock.sleep_until(next_tick).await;
            if self.cancel_check.is_cancelled() {
                return;
            }

            if self.node_client.timer_event(self.event.clone()).await.is_err() {
                // Node is gone.
                return;
            }
            next_tick += self.period;
        }
    }
}
