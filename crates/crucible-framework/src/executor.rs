//! Crash isolation for plugin execution.
//!
//! Every plugin invocation — lifecycle calls and contract methods alike —
//! runs through [`IsolatedExecutor::run`], which wraps the operation with:
//!
//! 1. A deadline (per-method override or the global default).
//! 2. Panic capture, so a plugin that unwinds never takes the host with it.
//! 3. A crash report with sanitized parameters, appended to a bounded ring.
//! 4. Rate-limited crash logging: at most `rate_limit` full reports per
//!    plugin per sliding window; further crashes are counted silently and
//!    the suppressed total is logged once when reporting resumes.
//!
//! On success the plugin's result is returned untouched together with the
//! elapsed time in milliseconds.

use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

use crucible_core::error::{PluginError, PluginResult};

/// Keys whose values are masked in crash reports and logs.
static SECRET_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("password|secret|key|token|auth").expect("secret pattern compiles"));

const MAX_STRING_CHARS: usize = 200;
const MAX_LIST_ITEMS: usize = 10;

/// Redacts parameters before they are recorded or logged.
///
/// Secret-looking keys are masked, long strings truncated with a
/// `"… (N chars)"` suffix, and long sequences elided to `<list with N
/// items>`. Binary payloads ride as base64 strings and fall under the
/// string rule.
pub fn sanitize_params(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                if SECRET_KEY.is_match(&key.to_lowercase()) {
                    sanitized.insert(key.clone(), json!("***"));
                } else {
                    sanitized.insert(key.clone(), sanitize_params(entry));
                }
            }
            Value::Object(sanitized)
        }
        Value::Array(items) if items.len() > MAX_LIST_ITEMS => {
            json!(format!("<list with {} items>", items.len()))
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_params).collect()),
        Value::String(s) if s.chars().count() > MAX_STRING_CHARS => {
            let head: String = s.chars().take(MAX_STRING_CHARS).collect();
            json!(format!("{head}… ({} chars)", s.chars().count()))
        }
        other => other.clone(),
    }
}

/// Executor tuning knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline applied when no per-method override exists.
    pub default_timeout: Duration,
    /// Per-method deadline overrides, keyed by operation name.
    pub method_timeouts: HashMap<String, Duration>,
    /// Ring-buffer capacity for crash history.
    pub history_limit: usize,
    /// Sliding window for crash-report rate limiting.
    pub rate_window: Duration,
    /// Full reports allowed per plugin per window.
    pub rate_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            method_timeouts: HashMap::new(),
            history_limit: 100,
            rate_window: Duration::from_secs(60),
            rate_limit: 5,
        }
    }
}

/// Sanitized record of one plugin-side failure.
#[derive(Debug, Clone)]
pub struct CrashReport {
    pub plugin: String,
    pub method: String,
    /// Failure classifier (`Timeout`, `Panic`, or the plugin error kind).
    pub exception: String,
    pub message: String,
    pub timestamp: f64,
    pub request_id: Option<Value>,
    /// Parameters after redaction.
    pub params: Value,
    /// Value of the plugin's crash counter after this crash.
    pub crash_count: u64,
}

impl CrashReport {
    pub fn to_wire(&self) -> Value {
        json!({
            "plugin": self.plugin,
            "method": self.method,
            "exception": self.exception,
            "message": self.message,
            "timestamp": self.timestamp,
            "request_id": self.request_id,
            "params": self.params,
            "crash_count": self.crash_count,
        })
    }
}

/// Failure surfaced by the executor.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("execution of {method} timed out after {timeout_ms} ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("plugin panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl ExecError {
    fn classifier(&self) -> String {
        match self {
            ExecError::Timeout { .. } => "Timeout".to_string(),
            ExecError::Panicked(_) => "Panic".to_string(),
            ExecError::Plugin(err) => err.kind().to_string(),
        }
    }
}

#[derive(Default)]
struct CrashLog {
    history: VecDeque<CrashReport>,
    counters: HashMap<String, u64>,
    windows: HashMap<String, VecDeque<Instant>>,
    suppressed: HashMap<String, u64>,
}

/// Wraps every plugin invocation with timeout, crash capture, and
/// rate-limited reporting.
pub struct IsolatedExecutor {
    config: ExecutorConfig,
    log: Mutex<CrashLog>,
}

impl IsolatedExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config, log: Mutex::new(CrashLog::default()) }
    }

    /// Deadline for `method`.
    pub fn timeout_for(&self, method: &str) -> Duration {
        self.config
            .method_timeouts
            .get(method)
            .copied()
            .unwrap_or(self.config.default_timeout)
    }

    /// Runs one plugin operation under isolation.
    ///
    /// Returns the operation's value and the elapsed milliseconds, or an
    /// [`ExecError`] after recording a crash report. The host process never
    /// unwinds out of this call.
    pub async fn run<T, F>(
        &self,
        plugin: &str,
        method: &str,
        request_id: Option<&Value>,
        params: &Value,
        operation: F,
    ) -> Result<(T, f64), ExecError>
    where
        F: Future<Output = PluginResult<T>>,
    {
        let deadline = self.timeout_for(method);
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            deadline,
            std::panic::AssertUnwindSafe(operation).catch_unwind(),
        )
        .await;

        let err = match outcome {
            Ok(Ok(Ok(value))) => {
                return Ok((value, start.elapsed().as_secs_f64() * 1000.0));
            }
            Ok(Ok(Err(plugin_err))) => ExecError::Plugin(plugin_err),
            Ok(Err(panic_payload)) => ExecError::Panicked(panic_message(panic_payload)),
            Err(_) => ExecError::Timeout {
                method: method.to_string(),
                timeout_ms: deadline.as_millis() as u64,
            },
        };

        self.record_crash(plugin, method, &err, request_id, params);
        Err(err)
    }

    fn record_crash(
        &self,
        plugin: &str,
        method: &str,
        err: &ExecError,
        request_id: Option<&Value>,
        params: &Value,
    ) {
        let now = Instant::now();
        let mut log = self.log.lock();

        let counter = log.counters.entry(plugin.to_string()).or_insert(0);
        *counter += 1;
        let crash_count = *counter;

        let report = CrashReport {
            plugin: plugin.to_string(),
            method: method.to_string(),
            exception: err.classifier(),
            message: err.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            request_id: request_id.cloned(),
            params: sanitize_params(params),
            crash_count,
        };

        if log.history.len() >= self.config.history_limit {
            log.history.pop_front();
        }
        log.history.push_back(report.clone());

        // Sliding-window rate limit on full reports, per plugin.
        let window = log.windows.entry(plugin.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.config.rate_window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.config.rate_limit {
            *log.suppressed.entry(plugin.to_string()).or_insert(0) += 1;
            return;
        }
        window.push_back(now);

        let resumed_after = log.suppressed.insert(plugin.to_string(), 0).unwrap_or(0);
        if resumed_after > 0 {
            warn!(
                plugin = %plugin,
                suppressed = resumed_after,
                "Crash reporting resumed; reports were suppressed"
            );
        }

        error!(
            plugin = %plugin,
            method = %method,
            exception = %report.exception,
            crash_count = crash_count,
            params = %report.params,
            "Plugin crash: {}",
            report.message
        );
    }

    /// Snapshot of the crash-report ring, oldest first.
    pub fn crash_history(&self) -> Vec<CrashReport> {
        self.log.lock().history.iter().cloned().collect()
    }

    /// Total crashes recorded for one plugin.
    pub fn crash_count(&self, plugin: &str) -> u64 {
        self.log.lock().counters.get(plugin).copied().unwrap_or(0)
    }

    /// Aggregate crash statistics for the `status` host method.
    pub fn stats(&self) -> Value {
        let log = self.log.lock();
        let total: u64 = log.counters.values().sum();
        json!({
            "total_crashes": total,
            "by_plugin": log.counters,
            "history_entries": log.history.len(),
            "suppressed": log.suppressed,
        })
    }
}

impl Default for IsolatedExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
