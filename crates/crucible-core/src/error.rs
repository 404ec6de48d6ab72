//! Error type shared by every plugin-facing call.

use thiserror::Error;

/// Failure raised by a plugin operation.
///
/// The isolated executor maps each variant onto a stable JSON-RPC error
/// code, so plugins signal *kinds* of failure rather than codes:
///
/// - [`InvalidParams`](PluginError::InvalidParams) — a caller-supplied
///   argument is missing or has the wrong shape.
/// - [`UnknownOperation`](PluginError::UnknownOperation) — the requested
///   operation does not exist on this plugin.
/// - [`Unsupported`](PluginError::Unsupported) — the operation exists in the
///   contract but this plugin does not implement it (optional capability).
/// - [`ResourceExhausted`](PluginError::ResourceExhausted) — memory-class
///   failure inside the plugin.
/// - [`Failed`](PluginError::Failed) — any other plugin-side failure.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    /// Short classifier used in crash reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginError::InvalidParams(_) => "InvalidParams",
            PluginError::UnknownOperation(_) => "UnknownOperation",
            PluginError::Unsupported(_) => "Unsupported",
            PluginError::ResourceExhausted(_) => "ResourceExhausted",
            PluginError::Failed(_) => "Failed",
        }
    }

    /// Convenience constructor for generic failures.
    pub fn failed(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::InvalidParams(err.to_string())
    }
}

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_errors_become_invalid_params() {
        let err = serde_json::from_value::<u32>(serde_json::json!("nope")).unwrap_err();
        let plugin_err: PluginError = err.into();
        assert!(matches!(plugin_err, PluginError::InvalidParams(_)));
        assert_eq!(plugin_err.kind(), "InvalidParams");
    }
}
