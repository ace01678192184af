//! Reconnect scheduling with a fixed delay.
//!
//! The [`ReconnectSupervisor`] owns a single task slot. Scheduling while a
//! task is still pending or running does nothing, so any number of
//! concurrent failure reports collapse into one reconnect loop. The loop
//! itself lives in the connection; it retries forever with the same delay.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Configuration for reconnection behaviour.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt. Default: 2 s.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

/// Holds at most one reconnect task.
#[derive(Debug, Default)]
pub struct ReconnectSupervisor {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectSupervisor {
    /// Create an empty supervisor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` unless a previous one has not finished yet.
    ///
    /// Returns `true` if the task was spawned.
    pub fn schedule<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Reconnect already scheduled, skipping");
            return false;
        }
        *slot = Some(tokio::spawn(task));
        true
    }

    /// Whether a reconnect task is pending or running.
    pub fn is_pending(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Abort the current task, if any, and wait for it to wind down.
    pub async fn cancel(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            // Cancellation surfaces as a JoinError; nothing to report.
            let _ = handle.await;
            tracing::debug!("Pending reconnect cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_delay_is_two_seconds() {
        assert_eq!(ReconnectConfig::default().delay, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_is_noop_while_pending() {
        let supervisor = ReconnectSupervisor::new();
        let runs = Arc::new(AtomicU32::new(0));

        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            supervisor.schedule(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(supervisor.is_pending());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1, "Only one task should run");
        assert!(!supervisor.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_completion_spawns_again() {
        let supervisor = ReconnectSupervisor::new();
        let runs = Arc::new(AtomicU32::new(0));

        let r = Arc::clone(&runs);
        assert!(supervisor.schedule(async move {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let r = Arc::clone(&runs);
        assert!(supervisor.schedule(async move {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_task() {
        let supervisor = ReconnectSupervisor::new();
        let runs = Arc::new(AtomicU32::new(0));

        let r = Arc::clone(&runs);
        supervisor.schedule(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            r.fetch_add(1, Ordering::SeqCst);
        });

        supervisor.cancel().await;
        assert!(!supervisor.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0, "Cancelled task must not run");
    }

    #[tokio::test]
    async fn test_cancel_without_task_is_noop() {
        let supervisor = ReconnectSupervisor::new();
        supervisor.cancel().await;
        assert!(!supervisor.is_pending());
    }
}
