//! Stdio transport: the host's read loop and frame writer.
//!
//! Two hard invariants live here:
//!
//! 1. **Stdout carries only JSON-RPC frames.** One compact JSON object per
//!    line, flushed after every frame. Diagnostics never touch stdout; the
//!    logging layer is pinned to stderr before any component can emit.
//! 2. **The loop observes shutdown promptly.** The cooperative reader polls
//!    the shutdown flag between read attempts (default tick 1 s), so a
//!    `shutdown` request, signal, or EOF stops intake within one tick.
//!
//! Two read modes exist. The cooperative mode attaches an async reader to
//! stdin and is the default. The blocking mode iterates stdin with the
//! synchronous line iterator and drives each request to completion on the
//! shared runtime — for platforms where the scheduler cannot attach to the
//! input pipe (classic Windows pipes). A controller cannot tell the two
//! apart.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info};

use crate::message::Response;
use crate::router::Router;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Default interval at which the cooperative reader re-checks the
/// shutdown flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Writes one response frame to stdout and flushes it.
///
/// A write failure means the controller is gone; it is reported on stderr
/// and the caller decides whether to keep going.
pub fn write_frame(response: &Response) -> bool {
    let line = response.to_line();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match writeln!(handle, "{line}").and_then(|()| handle.flush()) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Failed to write response frame");
            false
        }
    }
}

/// Cooperative read loop: awaits stdin lines with a poll-interval timeout
/// so the shutdown flag is observed promptly.
pub async fn run_cooperative(
    router: Arc<Router>,
    shutdown: Arc<ShutdownCoordinator>,
    poll_interval: Duration,
) {
    info!("Reading requests from stdin (cooperative mode)");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        if shutdown.is_requested() {
            debug!("Shutdown requested, leaving read loop");
            break;
        }

        match tokio::time::timeout(poll_interval, lines.next_line()).await {
            // Poll tick: re-check the flag.
            Err(_) => continue,
            Ok(Ok(Some(line))) => {
                if let Some(response) = router.handle_line(&line).await {
                    write_frame(&response);
                }
            }
            Ok(Ok(None)) => {
                info!("Input stream closed");
                shutdown.request(ShutdownReason::Eof);
                break;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to read from stdin");
                shutdown.request(ShutdownReason::Error);
                break;
            }
        }
    }
}

/// Blocking read loop: iterates stdin synchronously and drives each
/// request on the shared runtime. At most one request is in flight at any
/// time.
pub fn run_blocking(
    runtime: &tokio::runtime::Runtime,
    router: Arc<Router>,
    shutdown: Arc<ShutdownCoordinator>,
) {
    info!("Reading requests from stdin (blocking mode)");
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        if shutdown.is_requested() {
            debug!("Shutdown requested, leaving read loop");
            return;
        }

        match line {
            Ok(line) => {
                if let Some(response) = runtime.block_on(router.handle_line(&line)) {
                    write_frame(&response);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from stdin");
                shutdown.request(ShutdownReason::Error);
                return;
            }
        }
    }

    info!("Input stream closed");
    shutdown.request(ShutdownReason::Eof);
}
