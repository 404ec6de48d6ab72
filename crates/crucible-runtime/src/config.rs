//! Host configuration and command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments of the `crucible-host` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "crucible-host",
    version,
    about = "Plugin host speaking JSON-RPC 2.0 over stdio"
)]
pub struct HostArgs {
    /// Directory scanned for plugin folders.
    #[arg(long, default_value = "./plugins")]
    pub plugins_dir: PathBuf,

    /// Directory holding the prefix registry, contract registry, and
    /// manifest schema.
    #[arg(long, default_value = "./config")]
    pub config_dir: PathBuf,

    /// Log verbosity on the standard error stream.
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Load every plugin that passes shallow validation at startup.
    #[arg(long)]
    pub auto_load: bool,

    /// Allow the loader to install missing plugin dependencies.
    #[arg(long)]
    pub auto_install_deps: bool,

    /// Force the blocking read loop.
    #[arg(long)]
    pub sync_mode: bool,

    /// Force the cooperative read loop even where blocking is preferred.
    #[arg(long)]
    pub force_async: bool,
}

impl HostArgs {
    /// Whether the blocking read loop should be used.
    ///
    /// Blocking is forced by `--sync-mode`, preferred on Windows (where the
    /// scheduler cannot attach to classic pipes) unless `--force-async`
    /// overrides it.
    pub fn use_blocking_loop(&self) -> bool {
        if self.sync_mode {
            return true;
        }
        if self.force_async {
            return false;
        }
        cfg!(windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> HostArgs {
        HostArgs::parse_from(std::iter::once("crucible-host").chain(extra.iter().copied()))
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = args(&[]);
        assert_eq!(args.plugins_dir, PathBuf::from("./plugins"));
        assert_eq!(args.config_dir, PathBuf::from("./config"));
        assert_eq!(args.log_level, "INFO");
        assert!(!args.auto_load);
        assert!(!args.auto_install_deps);
        assert!(!args.sync_mode);
        assert!(!args.force_async);
    }

    #[test]
    fn sync_mode_forces_the_blocking_loop() {
        assert!(args(&["--sync-mode"]).use_blocking_loop());
    }

    #[test]
    fn force_async_wins_on_every_platform() {
        assert!(!args(&["--force-async"]).use_blocking_loop());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let result = HostArgs::try_parse_from(["crucible-host", "--log-level", "LOUD"]);
        assert!(result.is_err());
    }
}
