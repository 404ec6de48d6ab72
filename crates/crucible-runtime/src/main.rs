//! `crucible-host` entry point.
//!
//! Order matters at startup: the child-process unbuffered flag is exported
//! before any I/O, then logging is pinned to stderr, and only then do
//! components come up — stdout stays reserved for JSON-RPC frames from the
//! first observable action of the process.

use clap::Parser;
use tracing::info;

use crucible_runtime::config::HostArgs;
use crucible_runtime::host::PluginHost;
use crucible_runtime::logging::{LoggingBuilder, parse_level};

fn main() {
    // Subprocesses spawned by the loader (dependency installs) must not
    // buffer their output. Exported before any other I/O.
    // SAFETY: no other threads exist yet.
    unsafe {
        std::env::set_var("PYTHONUNBUFFERED", "1");
    }

    let args = HostArgs::parse();

    LoggingBuilder::new()
        .with_level(parse_level(&args.log_level))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %args.log_level,
        "Starting crucible-host"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build the async runtime: {e}");
            std::process::exit(1);
        }
    };

    let use_blocking = args.use_blocking_loop();
    let host = PluginHost::new(args);

    let exit_code = if use_blocking {
        host.run_blocking(&runtime)
    } else {
        runtime.block_on(host.run_cooperative())
    };

    std::process::exit(exit_code);
}
