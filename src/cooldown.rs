//! Resend Cooldown
//!
//! Counts down once per second after a code is sent so the resend action can
//! stay disabled until it reaches zero. The ticker task ends itself at zero,
//! on the wizard's close signal, or when the cooldown is dropped.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Whole seconds from `now` until `deadline`, rounded up
fn secs_until(deadline: Instant, now: Instant) -> u32 {
    let left = deadline.saturating_duration_since(now);
    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// A running (or finished) resend countdown
#[derive(Debug)]
pub struct ResendCooldown {
    deadline: Instant,
    remaining: watch::Receiver<u32>,
    task: JoinHandle<()>,
}

impl ResendCooldown {
    /// Count down to `deadline`, publishing each whole second as it passes
    ///
    /// Every published value is recomputed from the clock, so a late wakeup
    /// never leaves the countdown behind the deadline. Must be called from
    /// within a tokio runtime.
    pub fn start(deadline: Instant, mut closed: watch::Receiver<bool>) -> Self {
        let mut left = secs_until(deadline, Instant::now());
        let (tx, remaining) = watch::channel(left);

        let task = tokio::spawn(async move {
            while left > 0 {
                let next = deadline - Duration::from_secs(u64::from(left - 1));
                tokio::select! {
                    _ = sleep_until(next) => {
                        left = secs_until(deadline, Instant::now());
                        if tx.send(left).is_err() {
                            return;
                        }
                    }
                    changed = closed.changed() => {
                        if changed.is_err() || *closed.borrow() {
                            debug!(left, "Resend cooldown stopped by close");
                            return;
                        }
                    }
                }
            }
            debug!("Resend cooldown elapsed");
        });

        Self {
            deadline,
            remaining,
            task,
        }
    }

    /// Seconds until resend is allowed
    pub fn remaining(&self) -> u32 {
        secs_until(self.deadline, Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        self.remaining() == 0
    }

    /// Watch the countdown (e.g. to render "Resend in 42s")
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.clone()
    }
}

impl Drop for ResendCooldown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
