//! Per-request idle watchdog.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Fires when a stream has been idle for the configured duration.
///
/// Every call to [`TimeoutGuard::touch`] pushes the deadline forward, so the
/// guard measures inactivity rather than total request time.
pub struct TimeoutGuard {
    duration: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl TimeoutGuard {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            sleep: Box::pin(tokio::time::sleep(duration)),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Record stream activity.
    pub fn touch(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.duration);
    }

    /// Resolves once the stream has been idle for the full duration.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await;
    }
}

/// Wait on an optional guard; pends forever when there is none.
pub(crate) async fn idle(guard: &mut Option<TimeoutGuard>) {
    match guard {
        Some(guard) => guard.expired().await,
        None => std::future::pending().await,
    }
}
