//! Graceful shutdown coordination.
//!
//! A single [`ShutdownCoordinator`] observes the whole host lifecycle. Any
//! shutdown cause — the `shutdown` RPC method, end of input, a signal, a
//! fatal error — funnels through [`request`](ShutdownCoordinator::request),
//! which only marks the flag and reason. Teardown itself is always driven
//! from the main task by [`run`](ShutdownCoordinator::run):
//!
//! 1. The read loop observes the flag and stops accepting input.
//! 2. In-flight requests are drained, bounded by the drain timeout.
//! 3. The manager shuts every plugin down; errors are logged, not fatal.
//! 4. Cleanup callbacks run in registration order, async then sync.
//! 5. Output streams are flushed and the reason's exit code is returned.
//!
//! Signal watchers never perform teardown; they set the flag and return.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crucible_framework::manager::PluginManager;

use crate::message::RequestId;

/// Why the host is shutting down. Each reason carries its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `shutdown` RPC method.
    Normal,
    /// Input stream closed by the controller.
    Eof,
    /// Termination signal.
    Sigterm,
    /// Interrupt signal.
    Sigint,
    /// Fatal internal error.
    Error,
    /// Drain or teardown exceeded its budget.
    Timeout,
    /// Programmatic shutdown request.
    Requested,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Normal | ShutdownReason::Requested => 0,
            ShutdownReason::Error | ShutdownReason::Timeout => 1,
            ShutdownReason::Sigint => 2,
            ShutdownReason::Sigterm => 3,
            ShutdownReason::Eof => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::Normal => "normal",
            ShutdownReason::Eof => "eof",
            ShutdownReason::Sigterm => "sigterm",
            ShutdownReason::Sigint => "sigint",
            ShutdownReason::Error => "error",
            ShutdownReason::Timeout => "timeout",
            ShutdownReason::Requested => "requested",
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct ShutdownState {
    reason: Option<ShutdownReason>,
    timestamp: Option<f64>,
    plugins_shutdown: bool,
}

type AsyncCleanup = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
type SyncCleanup = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Cleanups {
    asynchronous: Vec<AsyncCleanup>,
    synchronous: Vec<SyncCleanup>,
}

/// Coordinates the ordered teardown of the host.
pub struct ShutdownCoordinator {
    initiated: AtomicBool,
    state: Mutex<ShutdownState>,
    in_flight: Mutex<HashSet<RequestId>>,
    cleanups: Mutex<Cleanups>,
    /// Budget for the in-flight drain.
    drain_timeout: Duration,
    /// Poll interval while draining.
    drain_poll: Duration,
    /// Budget for plugin teardown plus cleanup callbacks.
    shutdown_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_millis(100))
    }

    pub fn with_timeouts(drain_timeout: Duration, drain_poll: Duration) -> Self {
        Self {
            initiated: AtomicBool::new(false),
            state: Mutex::new(ShutdownState::default()),
            in_flight: Mutex::new(HashSet::new()),
            cleanups: Mutex::new(Cleanups::default()),
            drain_timeout,
            drain_poll,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    // ─── Flag ────────────────────────────────────────────────────────────────

    /// Marks shutdown requested. The first reason wins; later requests are
    /// ignored. Safe to call from signal watchers — nothing is torn down
    /// here.
    pub fn request(&self, reason: ShutdownReason) {
        if self.initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.reason = Some(reason);
        state.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs_f64());
        info!(reason = %reason, exit_code = reason.exit_code(), "Shutdown initiated");
    }

    pub fn is_requested(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.state.lock().reason
    }

    /// Current state in wire form (for `status`).
    pub fn state_wire(&self) -> Value {
        let state = self.state.lock();
        json!({
            "initiated": self.is_requested(),
            "reason": state.reason.map(|r| r.as_str()),
            "timestamp": state.timestamp,
            "in_flight_count": self.in_flight.lock().len(),
            "plugins_shutdown": state.plugins_shutdown,
            "exit_code": state.reason.map(|r| r.exit_code()).unwrap_or(0),
        })
    }

    // ─── In-flight tracking ──────────────────────────────────────────────────

    /// Tracks a request as executing. Requests arriving after shutdown was
    /// requested are not tracked — they are rejected upstream.
    pub fn request_started(&self, id: &RequestId) {
        if !self.is_requested() {
            self.in_flight.lock().insert(id.clone());
        }
    }

    pub fn request_completed(&self, id: &RequestId) {
        self.in_flight.lock().remove(id);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Waits for in-flight requests to complete, bounded by the drain
    /// timeout. On timeout the remaining identifiers are logged and `false`
    /// is returned; teardown proceeds anyway.
    pub async fn wait_for_in_flight(&self) -> bool {
        if self.in_flight_count() == 0 {
            return true;
        }

        info!(count = self.in_flight_count(), "Waiting for in-flight requests");
        let start = tokio::time::Instant::now();
        while self.in_flight_count() > 0 && start.elapsed() < self.drain_timeout {
            tokio::time::sleep(self.drain_poll).await;
        }

        let remaining: Vec<String> = self
            .in_flight
            .lock()
            .iter()
            .map(|id| id.to_string())
            .collect();
        if remaining.is_empty() {
            info!("All in-flight requests completed");
            true
        } else {
            warn!(remaining = ?remaining, "Drain timeout, abandoning in-flight requests");
            false
        }
    }

    // ─── Cleanup callbacks ───────────────────────────────────────────────────

    pub fn register_cleanup(&self, callback: AsyncCleanup) {
        self.cleanups.lock().asynchronous.push(callback);
    }

    pub fn register_sync_cleanup(&self, callback: SyncCleanup) {
        self.cleanups.lock().synchronous.push(callback);
    }

    /// Runs every registered cleanup in registration order, asynchronous
    /// callbacks first. Panics are contained per callback.
    pub async fn run_cleanups(&self) {
        let (async_cbs, sync_cbs) = {
            let mut cleanups = self.cleanups.lock();
            (
                std::mem::take(&mut cleanups.asynchronous),
                std::mem::take(&mut cleanups.synchronous),
            )
        };

        for callback in &async_cbs {
            let future = callback();
            if let Err(e) = tokio::task::spawn(future).await {
                error!(error = %e, "Error in cleanup callback");
            }
        }
        run_sync_cleanups(&sync_cbs);
    }

    // ─── Teardown ────────────────────────────────────────────────────────────

    /// Drives the full shutdown sequence and returns the exit code.
    ///
    /// Plugin teardown and cleanup callbacks share one budget; exceeding it
    /// abandons them and turns the exit code into the timeout code.
    pub async fn run(&self, manager: &PluginManager, reason: ShutdownReason) -> i32 {
        self.request(reason);
        let reason = self.reason().unwrap_or(reason);
        info!(reason = %reason, "Beginning shutdown sequence");
        let start = Instant::now();

        self.wait_for_in_flight().await;

        let teardown = async {
            manager.shutdown_all().await;
            self.state.lock().plugins_shutdown = true;
            self.run_cleanups().await;
        };
        let timed_out = tokio::time::timeout(self.shutdown_timeout, teardown)
            .await
            .is_err();

        flush_streams();

        if timed_out {
            error!("Shutdown timed out, forcing exit");
            return ShutdownReason::Timeout.exit_code();
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Shutdown complete"
        );
        reason.exit_code()
    }

    /// Last-resort synchronous teardown for contexts where the scheduler
    /// cannot be driven: runs only the synchronous cleanups and flushes.
    pub fn run_sync(&self, reason: ShutdownReason) -> i32 {
        self.request(reason);
        let reason = self.reason().unwrap_or(reason);
        info!(reason = %reason, "Beginning synchronous shutdown");

        let sync_cbs = std::mem::take(&mut self.cleanups.lock().synchronous);
        run_sync_cleanups(&sync_cbs);
        flush_streams();

        reason.exit_code()
    }

    /// Spawns flag-only signal watchers for interrupt and termination.
    pub fn spawn_signal_watchers(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt signal");
                coordinator.request(ShutdownReason::Sigint);
            }
        });

        #[cfg(unix)]
        {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received termination signal");
                            coordinator.request(ShutdownReason::Sigterm);
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to register SIGTERM watcher"),
                }
            });
        }

        debug!("Signal watchers installed");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn run_sync_cleanups(callbacks: &[SyncCleanup]) {
    for callback in callbacks {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
            error!("Error in sync cleanup callback");
        }
    }
}

fn flush_streams() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}
