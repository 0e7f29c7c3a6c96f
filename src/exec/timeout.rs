//! Connection and execution timeouts
//!
//! Every remote call is bounded twice: once while reaching and
//! authenticating against the target, and once while the command runs.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time;

/// Which window ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    Connect,
    Execute,
}

/// The pair of timeouts applied to one remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualTimeout {
    connect: Duration,
    execute: Duration,
}

impl Default for DualTimeout {
    fn default() -> Self {
        Self::from_secs(30, 60)
    }
}

impl DualTimeout {
    /// Zero durations are raised to one second
    pub fn new(connect: Duration, execute: Duration) -> Self {
        let floor = Duration::from_secs(1);
        Self {
            connect: connect.max(floor),
            execute: execute.max(floor),
        }
    }

    pub fn from_secs(connect_secs: u64, execute_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(connect_secs),
            Duration::from_secs(execute_secs),
        )
    }

    pub fn connect(&self) -> Duration {
        self.connect
    }

    pub fn execute(&self) -> Duration {
        self.execute
    }

    /// Upper bound on a whole call
    pub fn total(&self) -> Duration {
        self.connect + self.execute
    }

    pub fn connect_deadline(&self) -> Instant {
        Instant::now() + self.connect
    }

    pub fn execute_deadline(&self) -> Instant {
        Instant::now() + self.execute
    }

    /// Run a future within one of the windows
    ///
    /// Returns the phase that expired if the future did not finish in time.
    /// The future is dropped on expiry.
    pub async fn run<F, T>(&self, phase: TimeoutPhase, future: F) -> Result<T, TimeoutPhase>
    where
        F: Future<Output = T>,
    {
        let limit = match phase {
            TimeoutPhase::Connect => self.connect,
            TimeoutPhase::Execute => self.execute,
        };
        time::timeout(limit, future).await.map_err(|_| phase)
    }
}

/// Time left until `deadline`, or `None` once it has passed
pub fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
}
