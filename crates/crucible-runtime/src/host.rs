//! Host orchestration: wires the manager, router, shutdown coordinator,
//! and transport together and runs the process to an exit code.

use std::sync::Arc;

use tracing::{error, info, warn};

use crucible_framework::executor::IsolatedExecutor;
use crucible_framework::manager::PluginManager;
use crucible_rpc::router::Router;
use crucible_rpc::shutdown::{ShutdownCoordinator, ShutdownReason};
use crucible_rpc::stdio::{self, DEFAULT_POLL_INTERVAL};

use crate::config::HostArgs;

/// The assembled plugin host.
pub struct PluginHost {
    args: HostArgs,
    manager: Arc<PluginManager>,
    shutdown: Arc<ShutdownCoordinator>,
    router: Arc<Router>,
}

impl PluginHost {
    pub fn new(args: HostArgs) -> Self {
        let executor = Arc::new(IsolatedExecutor::default());
        let manager = Arc::new(PluginManager::new(
            &args.plugins_dir,
            &args.config_dir,
            args.auto_install_deps,
            executor,
        ));
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let router = Arc::new(Router::new(Arc::clone(&manager), Arc::clone(&shutdown)));
        Self { args, manager, shutdown, router }
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Loads every discovered plugin that passes shallow validation.
    ///
    /// Failures are logged per plugin and never abort startup; a second
    /// plugin for an occupied contract slot is skipped with a warning.
    pub async fn auto_load(&self) {
        let discovered = self.manager.discover(false);
        info!(count = discovered.len(), "Auto-loading plugins");
        for plugin in discovered {
            match self.manager.load(&plugin.name, None, true).await {
                Ok(_) => info!(plugin = %plugin.name, contract = %plugin.contract, "Auto-loaded"),
                Err(e) => warn!(plugin = %plugin.name, error = %e, "Auto-load skipped"),
            }
        }
    }

    /// Runs the cooperative read loop to completion and returns the exit
    /// code.
    pub async fn run_cooperative(&self) -> i32 {
        self.shutdown.spawn_signal_watchers();
        if self.args.auto_load {
            self.auto_load().await;
        }

        info!(
            plugins_dir = %self.args.plugins_dir.display(),
            config_dir = %self.args.config_dir.display(),
            "Plugin host ready"
        );
        stdio::run_cooperative(
            Arc::clone(&self.router),
            Arc::clone(&self.shutdown),
            DEFAULT_POLL_INTERVAL,
        )
        .await;

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Normal);
        self.shutdown.run(&self.manager, reason).await
    }

    /// Runs the blocking read loop to completion and returns the exit code.
    ///
    /// The synchronous stdin iterator runs on this thread; each request and
    /// the final teardown are driven on `runtime`.
    pub fn run_blocking(&self, runtime: &tokio::runtime::Runtime) -> i32 {
        {
            let _guard = runtime.enter();
            self.shutdown.spawn_signal_watchers();
        }
        if self.args.auto_load {
            runtime.block_on(self.auto_load());
        }

        info!(
            plugins_dir = %self.args.plugins_dir.display(),
            config_dir = %self.args.config_dir.display(),
            "Plugin host ready (blocking mode)"
        );
        stdio::run_blocking(runtime, Arc::clone(&self.router), Arc::clone(&self.shutdown));

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Normal);
        runtime.block_on(self.shutdown.run(&self.manager, reason))
    }

    /// Last-resort teardown when the runtime cannot be driven.
    pub fn emergency_shutdown(&self) -> i32 {
        error!("Emergency shutdown: running synchronous cleanup only");
        self.shutdown.run_sync(ShutdownReason::Error)
    }
}
