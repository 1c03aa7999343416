use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;

use super::connection::Connection;
use super::state::ConnectionState;

/// Periodic liveness check bound to one connection.
///
/// Ticks at the keep alive check interval, compares the time since the last
/// observed activity against the warning and timeout thresholds, and latches
/// each signal so it fires once per episode. It only reads connection state;
/// loss is signalled through the transport's `lost_connection` entry point.
pub struct HeartbeatMonitor {
    connection: Weak<Connection>,
    been_warned: AtomicBool,
    timed_out: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(connection: Weak<Connection>) -> Arc<Self> {
        Arc::new(HeartbeatMonitor {
            connection,
            been_warned: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    pub(crate) fn start(self: Arc<Self>) {
        let Some(connection) = self.connection.upgrade() else {
            return;
        };

        connection.update_last_keep_alive();
        self.been_warned.store(false, Ordering::SeqCst);
        self.timed_out.store(false, Ordering::SeqCst);

        let Some(check_interval) = connection.keep_alive().map(|k| k.check_interval()) else {
            return;
        };
        if check_interval.is_zero() {
            return;
        }

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(check_interval);
            ticks.tick().await;

            loop {
                ticks.tick().await;
                monitor.heartbeat();
            }
        });

        *self.timer.lock().unwrap() = Some(handle);
    }

    pub(crate) fn stop(&self) {
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.abort();
        }
    }

    fn heartbeat(&self) {
        if let Some(connection) = self.connection.upgrade() {
            if let Some(keep_alive) = connection.keep_alive() {
                self.beat(&connection, keep_alive.elapsed());
            }
        }
    }

    /// One evaluation of the thresholds for the given elapsed time. Only
    /// meaningful while the connection is connected.
    pub(crate) fn beat(&self, connection: &Arc<Connection>, elapsed: Duration) {
        if connection.state() != ConnectionState::Connected {
            return;
        }

        let Some(keep_alive) = connection.keep_alive() else {
            return;
        };

        if elapsed >= keep_alive.timeout() {
            if !self.timed_out.swap(true, Ordering::SeqCst) {
                warn!("connection timed out, transport lost connection");
                if let Some(transport) = connection.transport() {
                    transport.lost_connection(connection);
                }
            }
        } else if elapsed >= keep_alive.timeout_warning() {
            if !self.been_warned.swap(true, Ordering::SeqCst) {
                warn!("connection timeout warning, notifying user");
                connection.connection_did_slow();
            }
        } else {
            self.been_warned.store(false, Ordering::SeqCst);
            self.timed_out.store(false, Ordering::SeqCst);
        }
    }
}
