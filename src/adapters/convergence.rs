//! Convergence wait: poll the controller until a new application is synced
//! and healthy.
//!
//! ```text
//! Submitted ──► Polling ──┬──► Converged
//!                 ▲   │   ├──► TimedOut   (deadline elapsed)
//!                 └───┘   └──► Cancelled  (process shutdown)
//!              poll error
//! ```
//!
//! Poll errors are transient: they are logged and the next tick polls again.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::RegistryError;
use crate::domain::ApplicationStatus;

/// Reference poll interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Reference overall deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Something that can report an application's current status
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn status(&self, name: &str) -> Result<ApplicationStatus, RegistryError>;
}

/// Poll settings for a convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceWait {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ConvergenceWait {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ConvergenceWait {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll `probe` until `name` converges.
    ///
    /// The first poll happens one interval after the call. Returns the number
    /// of polls it took. Fails with [`RegistryError::ConvergenceTimeout`] once
    /// the deadline passes and with [`RegistryError::Cancelled`] as soon as
    /// `shutdown` fires; no poll is issued after either.
    pub async fn wait(
        &self,
        probe: &dyn StatusProbe,
        name: &str,
        shutdown: &CancellationToken,
    ) -> Result<u32, RegistryError> {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut ticker = interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u32;

        debug!(application = %name, interval = ?self.interval, timeout = ?self.timeout, "Waiting for convergence");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RegistryError::Cancelled(name.to_string())),
                _ = sleep_until(deadline) => return Err(self.timed_out(name)),
                _ = ticker.tick() => {}
            }

            polls += 1;
            let observed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(RegistryError::Cancelled(name.to_string())),
                _ = sleep_until(deadline) => return Err(self.timed_out(name)),
                observed = probe.status(name) => observed,
            };

            match observed {
                Ok(status) => {
                    info!(
                        application = %name,
                        poll = polls,
                        sync = ?status.sync,
                        health = ?status.health,
                        "Application status"
                    );
                    if status.is_converged() {
                        info!(application = %name, elapsed = ?start.elapsed(), "Application converged");
                        return Ok(polls);
                    }
                }
                Err(e) => {
                    error!(application = %name, poll = polls, error = %e, "Failed to get application status");
                }
            }
        }
    }

    fn timed_out(&self, name: &str) -> RegistryError {
        error!(application = %name, timeout = ?self.timeout, "Application did not converge");
        RegistryError::ConvergenceTimeout {
            name: name.to_string(),
            timeout: self.timeout,
        }
    }
}
