//! Interval timers ticking into the element's own mailbox.
//!
//! A timer is a small Tokio task that periodically sends `TimerTick` to
//! the owning element. Ticks are therefore serialized with every other
//! message the element handles. Intervals are scaled by the pipeline
//! clock's rate ratio; a ratio update restarts all running timers with
//! their rescaled interval.

use crate::element::actor::ElementCore;
use crate::error::Result;
use crate::message::Message;
use std::time::Duration;
use tokio::task::AbortHandle;

/// One running timer.
pub(crate) struct TimerEntry {
    /// Interval at clock ratio 1.0.
    pub interval: Duration,
    pub abort: AbortHandle,
}

impl ElementCore {
    /// Start (or restart) a named timer.
    pub(crate) fn start_timer(&mut self, timer: String, interval: Duration) {
        self.stop_timer(&timer);
        let abort = spawn_timer(self.own.clone(), timer.clone(), self.scale(interval));
        self.timers.insert(timer, TimerEntry { interval, abort });
    }

    /// Stop a named timer; unknown names are ignored.
    pub(crate) fn stop_timer(&mut self, timer: &str) {
        if let Some(entry) = self.timers.remove(timer) {
            entry.abort.abort();
        }
    }

    pub(crate) fn stop_all_timers(&mut self) {
        for (_, entry) in self.timers.drain() {
            entry.abort.abort();
        }
    }

    /// A tick arrived in the mailbox. Ticks of timers stopped in the
    /// meantime are dropped.
    pub(crate) fn handle_timer_tick(&mut self, timer: String) -> Result<()> {
        if !self.timers.contains_key(&timer) {
            return Ok(());
        }
        let ctx = self.context();
        let result = self.element.handle_tick(&timer, &ctx);
        self.interpret("handle_tick", result, None)
    }

    /// The clock changed rate: rescale every running timer.
    pub(crate) fn handle_clock_ratio_update(&mut self, ratio: f64) {
        if ratio <= 0.0 {
            return;
        }
        self.clock_ratio = ratio;
        let running: Vec<(String, Duration)> = self
            .timers
            .iter()
            .map(|(name, entry)| (name.clone(), entry.interval))
            .collect();
        for (name, interval) in running {
            self.start_timer(name, interval);
        }
    }

    /// Effective interval at the current clock ratio.
    fn scale(&self, interval: Duration) -> Duration {
        interval.div_f64(self.clock_ratio)
    }
}

fn spawn_timer(own: crate::message::Mailbox, timer: String, period: Duration) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick of tokio's interval fires immediately; skip it so
        // the timer behaves like "every `period`, starting one period from
        // now".
        interval.tick().await;
        loop {
            interval.tick().await;
            own.send(Message::TimerTick {
                timer: timer.clone(),
            });
        }
    });
    handle.abort_handle()
}
