//! Stable JSON-RPC error codes.
//!
//! The `-327xx` range follows the JSON-RPC 2.0 specification; the `-320xx`
//! range carries host-specific semantics. Codes are part of the wire
//! contract and never change meaning.

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub const PLUGIN_NOT_FOUND: i64 = -32000;
pub const PLUGIN_NOT_READY: i64 = -32001;
pub const PLUGIN_LOAD_FAILED: i64 = -32002;
pub const PLUGIN_INITIALIZE_FAILED: i64 = -32003;
pub const PLUGIN_SHUTDOWN_FAILED: i64 = -32004;
pub const PLUGIN_ALREADY_LOADED: i64 = -32005;

pub const CONTRACT_MISMATCH: i64 = -32010;
pub const MANIFEST_INVALID: i64 = -32012;

pub const HOTSWAP_FAILED: i64 = -32020;
pub const HOTSWAP_ROLLBACK_FAILED: i64 = -32021;

pub const RESOURCE_EXHAUSTED: i64 = -32050;
pub const EXECUTION_TIMEOUT: i64 = -32060;
pub const PLUGIN_EXCEPTION: i64 = -32061;

/// Symbolic name for a code, for diagnostics.
pub fn name(code: i64) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        INVALID_REQUEST => "INVALID_REQUEST",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        PLUGIN_NOT_FOUND => "PLUGIN_NOT_FOUND",
        PLUGIN_NOT_READY => "PLUGIN_NOT_READY",
        PLUGIN_LOAD_FAILED => "PLUGIN_LOAD_FAILED",
        PLUGIN_INITIALIZE_FAILED => "PLUGIN_INITIALIZE_FAILED",
        PLUGIN_SHUTDOWN_FAILED => "PLUGIN_SHUTDOWN_FAILED",
        PLUGIN_ALREADY_LOADED => "PLUGIN_ALREADY_LOADED",
        CONTRACT_MISMATCH => "CONTRACT_MISMATCH",
        MANIFEST_INVALID => "MANIFEST_INVALID",
        HOTSWAP_FAILED => "HOTSWAP_FAILED",
        HOTSWAP_ROLLBACK_FAILED => "HOTSWAP_ROLLBACK_FAILED",
        RESOURCE_EXHAUSTED => "RESOURCE_EXHAUSTED",
        EXECUTION_TIMEOUT => "EXECUTION_TIMEOUT",
        PLUGIN_EXCEPTION => "PLUGIN_EXCEPTION",
        _ => "UNKNOWN",
    }
}
