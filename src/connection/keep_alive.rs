use std::time::{Duration, Instant};

/// Timing thresholds for silent connection loss detection, derived once from
/// the server supplied keep alive timeout.
#[derive(Debug, Clone)]
pub struct KeepAliveData {
    timeout: Duration,
    timeout_warning: Duration,
    check_interval: Duration,
    last_keep_alive: Instant,
}

impl KeepAliveData {
    /// The warning threshold is two thirds of the timeout; the check interval
    /// is a third of the remaining window.
    pub fn new(timeout: Duration) -> Self {
        let timeout_warning = timeout * 2 / 3;
        let check_interval = (timeout - timeout_warning) / 3;

        KeepAliveData {
            timeout,
            timeout_warning,
            check_interval,
            last_keep_alive: Instant::now(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_warning(&self) -> Duration {
        self.timeout_warning
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Time since the last observed activity.
    pub fn elapsed(&self) -> Duration {
        self.last_keep_alive.elapsed()
    }

    /// Refreshed on every frame the connection processes.
    pub fn touch(&mut self) {
        self.last_keep_alive = Instant::now();
    }
}
