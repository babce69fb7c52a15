use log::{debug, error};
use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
    time::Duration,
};

use crate::lock;

/// Single-flight, restartable one-shot timer.
///
/// At most one callback is pending at any time: [`KeepAliveTimer::start`]
/// cancels whatever was scheduled before scheduling the new callback. Each
/// scheduled callback waits on its own thread, so a firing callback never
/// holds the timer and a new `start` can run immediately, even from inside
/// the callback itself.
pub struct KeepAliveTimer {
    active: Mutex<Option<Arc<PendingTask>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Waiting,
    Cancelled,
    Fired,
}

struct PendingTask {
    state: Mutex<TaskState>,
    wake: Condvar,
}

impl PendingTask {
    fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Waiting),
            wake: Condvar::new(),
        }
    }

    /// Block until `duration` elapses or the task is cancelled.
    ///
    /// Returns true when the callback should run. The transition to `Fired`
    /// happens under the lock, so a concurrent cancel either wins before it
    /// or becomes a no-op after it.
    fn wait(&self, duration: Duration) -> bool {
        let state = lock(&self.state);
        let (mut state, _) = self
            .wake
            .wait_timeout_while(state, duration, |s| *s == TaskState::Waiting)
            .unwrap_or_else(PoisonError::into_inner);

        if *state == TaskState::Waiting {
            *state = TaskState::Fired;
            true
        } else {
            false
        }
    }

    fn cancel(&self) {
        let mut state = lock(&self.state);
        if *state == TaskState::Waiting {
            *state = TaskState::Cancelled;
            self.wake.notify_all();
        }
    }

    fn is_waiting(&self) -> bool {
        *lock(&self.state) == TaskState::Waiting
    }
}

impl KeepAliveTimer {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Schedule `callback` to run once after `duration`, replacing any
    /// callback that is still pending.
    pub fn start<F>(&self, duration: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        let pending = Arc::new(PendingTask::new());
        let task = Arc::clone(&pending);
        let spawned = thread::Builder::new()
            .name("keep-alive-timer".to_string())
            .spawn(move || {
                if task.wait(duration) {
                    debug!("Keep-alive timer fired after {:?}", duration);
                    callback();
                }
            });

        match spawned {
            Ok(_) => *active = Some(pending),
            Err(e) => error!("Failed to spawn keep-alive timer thread: {}", e),
        }
    }

    /// Cancel the pending callback, if any. Safe to call at any time.
    pub fn cancel(&self) {
        if let Some(pending) = lock(&self.active).take() {
            pending.cancel();
        }
    }

    /// Whether a callback is scheduled and has not fired or been cancelled.
    pub fn is_active(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|pending| pending.is_waiting())
    }
}

impl Default for KeepAliveTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeepAliveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
