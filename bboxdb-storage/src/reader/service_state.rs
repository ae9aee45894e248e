use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Lifecycle of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Starting => "starting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Terminated => "terminated",
            ServiceStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct StateInner {
    status: ServiceStatus,
    usage: usize,
    failure: Option<String>,
}

/// State machine plus usage counter of one reader.
///
/// `acquire` only succeeds while running. [`ServiceState::wait_until_unused`]
/// parks the caller on a condition variable until the last user released.
pub struct ServiceState {
    name: String,
    inner: Mutex<StateInner>,
    unused: Condvar,
}

impl ServiceState {
    pub fn new(name: impl Into<String>) -> Self {
        ServiceState {
            name: name.into(),
            inner: Mutex::new(StateInner {
                status: ServiceStatus::Stopped,
                usage: 0,
                failure: None,
            }),
            unused: Condvar::new(),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.inner.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == ServiceStatus::Running
    }

    /// Cause recorded when the state machine entered `Failed`.
    pub fn failure(&self) -> Option<String> {
        self.inner.lock().failure.clone()
    }

    pub fn usage(&self) -> usize {
        self.inner.lock().usage
    }

    /// Moves `from -> to`; returns false and leaves the state alone when the
    /// current status is not `from`.
    pub fn transition(&self, from: ServiceStatus, to: ServiceStatus) -> bool {
        let mut inner = self.inner.lock();
        if inner.status != from {
            return false;
        }
        debug!("{}: {} -> {}", self.name, from, to);
        inner.status = to;
        true
    }

    /// Unconditionally moves to `to`.
    pub fn set(&self, to: ServiceStatus) {
        let mut inner = self.inner.lock();
        debug!("{}: {} -> {}", self.name, inner.status, to);
        inner.status = to;
    }

    pub fn fail(&self, cause: impl Into<String>) {
        let mut inner = self.inner.lock();
        let cause = cause.into();
        debug!("{}: {} -> failed ({})", self.name, inner.status, cause);
        inner.status = ServiceStatus::Failed;
        inner.failure = Some(cause);
        self.unused.notify_all();
    }

    /// Registers one user. Fails unless the state machine is running.
    pub fn acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.status != ServiceStatus::Running {
            return false;
        }
        inner.usage += 1;
        true
    }

    pub fn release(&self) {
        let mut inner = self.inner.lock();
        if inner.usage == 0 {
            warn!("{}: release called without a matching acquire", self.name);
            return;
        }
        inner.usage -= 1;
        if inner.usage == 0 {
            self.unused.notify_all();
        }
    }

    /// Scoped [`ServiceState::acquire`]; the usage is released on drop.
    pub fn guard(&self) -> Option<UsageGuard<'_>> {
        if self.acquire() {
            Some(UsageGuard { state: self })
        } else {
            None
        }
    }

    /// Blocks until no user holds the state.
    pub fn wait_until_unused(&self) {
        let mut inner = self.inner.lock();
        while inner.usage > 0 {
            self.unused.wait(&mut inner);
        }
    }
}

/// Releases one usage of a [`ServiceState`] when dropped.
pub struct UsageGuard<'a> {
    state: &'a ServiceState,
}

impl Drop for UsageGuard<'_> {
    fn drop(&mut self) {
        self.state.release();
    }
}
