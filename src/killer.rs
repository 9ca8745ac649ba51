//! Task termination.
//!
//! The backend only chooses a [`KillBehavior`]; how signals escalate is up
//! to the [`Killer`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{KillError, RuntimeError};
use crate::runtime::{Signal, Task};

/// Default time a task gets to exit after `SIGTERM`.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a task should be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillBehavior {
    /// Ask the task to exit, escalating if it does not.
    Gracefully,
    /// Terminate the task immediately.
    Ungracefully,
}

/// Terminates running tasks.
#[async_trait]
pub trait Killer: Send + Sync {
    /// Kills `task` and returns once it has exited.
    async fn kill(&self, task: &dyn Task, behavior: KillBehavior) -> Result<(), KillError>;
}

/// Signal-based killer: `SIGTERM`, a grace period, then `SIGKILL`.
#[derive(Debug, Clone)]
pub struct SignalKiller {
    grace_period: Duration,
}

impl Default for SignalKiller {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl SignalKiller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a gracefully killed task may take to exit.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Sends `signal`; returns false when the task no longer exists.
    async fn signal(&self, task: &dyn Task, signal: Signal) -> Result<bool, KillError> {
        match task.kill(signal).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(task = %task.id(), signal = %signal, "Task already gone");
                Ok(false)
            }
            Err(source) => Err(KillError::Signal {
                signal: signal.name(),
                source,
            }),
        }
    }

    async fn kill_and_wait(&self, task: &dyn Task) -> Result<(), KillError> {
        if !self.signal(task, Signal::Kill).await? {
            return Ok(());
        }
        wait_for_exit(task.wait().await)
    }
}

fn wait_for_exit<T>(result: Result<T, RuntimeError>) -> Result<(), KillError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(KillError::Wait(e)),
    }
}

#[async_trait]
impl Killer for SignalKiller {
    async fn kill(&self, task: &dyn Task, behavior: KillBehavior) -> Result<(), KillError> {
        match behavior {
            KillBehavior::Ungracefully => self.kill_and_wait(task).await,
            KillBehavior::Gracefully => {
                if !self.signal(task, Signal::Term).await? {
                    return Ok(());
                }

                match tokio::time::timeout(self.grace_period, task.wait()).await {
                    Ok(result) => wait_for_exit(result),
                    Err(_) => {
                        warn!(
                            task = %task.id(),
                            grace_period = ?self.grace_period,
                            "Task did not exit after SIGTERM, sending SIGKILL"
                        );
                        self.kill_and_wait(task).await
                    }
                }
            }
        }
    }
}
