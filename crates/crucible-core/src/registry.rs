//! Process-wide registry of compiled-in plugin factories.
//!
//! With static linkage there is no module file to import at load time, so
//! each plugin crate exports its constructor through a well-known symbol: a
//! [`PluginFactory`] entry in the [`PLUGIN_FACTORIES`] distributed slice.
//! The loader resolves a manifest's `entry_point` against this registry and
//! calls the factory to obtain a fresh instance — a later load always starts
//! from a clean slate because nothing of the previous instance survives the
//! drop.
//!
//! Registration from a plugin crate:
//!
//! ```rust,ignore
//! use crucible_core::registry::{PLUGIN_FACTORIES, PluginFactory};
//!
//! #[distributed_slice(PLUGIN_FACTORIES)]
//! static FACTORY: PluginFactory = PluginFactory {
//!     entry_point: "tts_example",
//!     contract: "tts",
//!     construct: || Box::new(TtsDispatch::new(ExampleTtsPlugin::new())),
//! };
//! ```

use linkme::distributed_slice;
use thiserror::Error;

use crate::dispatch::DynPlugin;

/// Constructor entry contributed by a plugin crate.
#[derive(Debug)]
pub struct PluginFactory {
    /// Well-known entry symbol, matched against manifest `entry_point`.
    pub entry_point: &'static str,
    /// Contract tag the constructed plugin serves.
    pub contract: &'static str,
    /// Builds a fresh, uninitialized instance. Must be cheap: heavy setup
    /// belongs in `initialize`.
    pub construct: fn() -> Box<dyn DynPlugin>,
}

/// All plugin factories linked into this binary.
#[distributed_slice]
pub static PLUGIN_FACTORIES: [PluginFactory];

/// Package names satisfied by crates linked into this binary.
///
/// The loader checks manifest `dependencies` against this set; a plugin
/// crate that bundles a requirement announces it here.
#[distributed_slice]
pub static PROVIDED_PACKAGES: [&'static str];

/// Factory lookup failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no factory registered for entry point '{0}'")]
    NotRegistered(String),

    /// Two crates claimed the same entry symbol. Registration is explicit,
    /// so this is a packaging bug and is rejected rather than resolved by
    /// registration order.
    #[error("{1} factories registered for entry point '{0}'")]
    Ambiguous(String, usize),
}

/// Resolves the factory for `entry_point`, rejecting ambiguity.
pub fn find_factory(entry_point: &str) -> Result<&'static PluginFactory, RegistryError> {
    let mut matches = PLUGIN_FACTORIES.iter().filter(|f| f.entry_point == entry_point);
    let first = matches
        .next()
        .ok_or_else(|| RegistryError::NotRegistered(entry_point.to_string()))?;
    let extra = matches.count();
    if extra > 0 {
        return Err(RegistryError::Ambiguous(entry_point.to_string(), extra + 1));
    }
    Ok(first)
}

/// Entry symbols of every registered factory.
pub fn registered_entry_points() -> Vec<&'static str> {
    PLUGIN_FACTORIES.iter().map(|f| f.entry_point).collect()
}

/// Whether a package requirement is satisfied by a linked crate.
pub fn package_provided(name: &str) -> bool {
    PROVIDED_PACKAGES.iter().any(|p| *p == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_entry_point_is_not_registered() {
        let err = find_factory("no_such_plugin").unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered("no_such_plugin".to_string()));
    }

    #[test]
    fn unknown_package_is_not_provided() {
        assert!(!package_provided("definitely-not-linked"));
    }
}
