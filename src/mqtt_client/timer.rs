// SPDX-License-Identifier: MPL-2.0

use std::future::pending;
use std::pin::Pin;
use std::time::Instant;

use tokio::time::{sleep_until, Sleep};

/// A single cancellable wake-up, re-armed from `MqttEngine::next_tick_at`.
#[derive(Debug, Default)]
pub(crate) struct ScheduledTask {
    sleep: Option<Pin<Box<Sleep>>>,
    deadline: Option<Instant>,
}

impl ScheduledTask {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Points the task at `deadline`. `None` cancels it.
    pub(crate) fn arm(&mut self, deadline: Option<Instant>) {
        if deadline == self.deadline {
            return;
        }
        self.deadline = deadline;
        self.sleep = deadline
            .map(|d| Box::pin(sleep_until(tokio::time::Instant::from_std(d))));
    }

    pub(crate) fn cancel(&mut self) {
        self.arm(None);
    }

    /// Resolves when the armed deadline passes; never resolves when idle.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}

/// Wall clock for the engine, taken from tokio so paused test time applies.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
