//! JSON-RPC method routing.
//!
//! Method names are `"<namespace>/<operation>"`; the bare names `ping`,
//! `status`, and `shutdown` are reserved. The `plugin` namespace is the
//! host-management surface; any other namespace is a contract tag and is
//! routed to the plugin serving that slot through the isolated executor.
//!
//! Notifications (requests without an id) never produce a response frame,
//! success or failure; their failures still land in crash history and the
//! error counter.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crucible_core::error::PluginError;
use crucible_core::manifest::JsonMap;
use crucible_framework::executor::{ExecError, IsolatedExecutor};
use crucible_framework::manager::{HotSwapResult, ManagerError, PluginManager};

use crate::codes;
use crate::message::{Request, RequestId, Response, RpcError};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Host methods the router answers without touching a plugin.
pub const HOST_METHODS: &[&str] = &[
    "ping",
    "status",
    "shutdown",
    "plugin/list",
    "plugin/load",
    "plugin/unload",
    "plugin/reload",
    "plugin/swap",
    "plugin/health",
];

#[derive(Default)]
struct Counters {
    requests: u64,
    errors: u64,
    last_request: Option<f64>,
}

/// Parses, validates, and dispatches JSON-RPC requests.
pub struct Router {
    manager: Arc<PluginManager>,
    executor: Arc<IsolatedExecutor>,
    shutdown: Arc<ShutdownCoordinator>,
    counters: Mutex<Counters>,
    version: &'static str,
}

impl Router {
    pub fn new(
        manager: Arc<PluginManager>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let executor = Arc::clone(manager.executor());
        Self {
            manager,
            executor,
            shutdown,
            counters: Mutex::new(Counters::default()),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn request_count(&self) -> u64 {
        self.counters.lock().requests
    }

    pub fn error_count(&self) -> u64 {
        self.counters.lock().errors
    }

    /// Handles one raw input line end to end: parse, validate, track
    /// in-flight, dispatch, and decide whether a frame goes out.
    ///
    /// Returns `None` for empty lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                self.count_error();
                return Some(Response::failure(
                    None,
                    RpcError::new(codes::PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        let request = match Request::from_value(value) {
            Ok(request) => request,
            Err(invalid) => {
                self.count_error();
                return Some(Response::failure(
                    invalid.id.as_ref(),
                    RpcError::new(codes::INVALID_REQUEST, format!("Invalid request: {invalid}")),
                ));
            }
        };

        let id = request.id.clone();
        if let Some(id) = &id {
            self.shutdown.request_started(id);
        }

        let response = self.dispatch(request).await;

        if let Some(id) = &id {
            self.shutdown.request_completed(id);
        }
        response
    }

    /// Dispatches a validated request.
    ///
    /// Returns `None` for notifications — whatever the outcome, nothing is
    /// written back for them.
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        {
            let mut counters = self.counters.lock();
            counters.requests += 1;
            counters.last_request = epoch_seconds();
        }

        let Request { method, params, id } = request;
        debug!(method = %method, id = ?id, "Dispatching request");

        if self.shutdown.is_requested() && method != "shutdown" {
            self.count_error();
            return id.as_ref().map(|id| {
                Response::failure(
                    Some(id),
                    RpcError::new(codes::INVALID_REQUEST, "shutdown in progress"),
                )
            });
        }

        let outcome = match method.as_str() {
            "ping" => Ok(json!("pong")),
            "status" => Ok(self.status().await),
            "shutdown" => {
                self.shutdown.request(ShutdownReason::Normal);
                Ok(json!({"status": "shutting_down"}))
            }
            "plugin/list" => Ok(json!(self.manager.list_available().await)),
            "plugin/load" => self.plugin_load(&params).await,
            "plugin/unload" => self.plugin_unload(&params).await,
            "plugin/reload" => self.plugin_reload(&params).await,
            "plugin/swap" => self.plugin_swap(&params).await,
            "plugin/health" => self.plugin_health(&params).await,
            other => match other.split_once('/') {
                Some((tag, op)) if tag != "plugin" && self.manager.knows_contract(tag) => {
                    self.route_to_plugin(tag, op, &method, params, id.as_ref()).await
                }
                _ => Err(RpcError::new(
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )),
            },
        };

        match outcome {
            Ok(result) => id.as_ref().map(|id| Response::success(id, result)),
            Err(error) => {
                self.count_error();
                if id.is_none() {
                    // Notification failure: recorded, never answered.
                    return None;
                }
                Some(Response::failure(id.as_ref(), error))
            }
        }
    }

    fn count_error(&self) {
        self.counters.lock().errors += 1;
    }

    async fn status(&self) -> Value {
        let counters = {
            let counters = self.counters.lock();
            json!({
                "request_count": counters.requests,
                "error_count": counters.errors,
                "last_request": counters.last_request,
            })
        };
        json!({
            "version": self.version,
            "counters": counters,
            "methods": HOST_METHODS,
            "plugins": self.manager.status_summary().await,
            "crashes": self.executor.stats(),
            "shutdown": self.shutdown.state_wire(),
        })
    }

    // ─── Host plugin-management methods ──────────────────────────────────────

    async fn plugin_load(&self, params: &Value) -> Result<Value, RpcError> {
        let name = required_str(params, "name")?;
        let config = optional_object(params, "config")?;
        self.manager
            .load(&name, config, true)
            .await
            .map_err(|e| manager_error(&e))
    }

    async fn plugin_unload(&self, params: &Value) -> Result<Value, RpcError> {
        let name = required_str(params, "name")?;
        self.manager
            .unload(&name)
            .await
            .map(|()| json!({"success": true, "plugin": name}))
            .map_err(|e| manager_error(&e))
    }

    async fn plugin_reload(&self, params: &Value) -> Result<Value, RpcError> {
        let name = required_str(params, "name")?;
        let config = optional_object(params, "config")?;
        self.manager
            .reload(&name, config)
            .await
            .map_err(|e| manager_error(&e))
    }

    async fn plugin_swap(&self, params: &Value) -> Result<Value, RpcError> {
        let old = required_str(params, "old")?;
        let new = required_str(params, "new")?;
        let config = optional_object(params, "config")?;

        match self.manager.hot_swap(&old, &new, config).await {
            Ok(result) => {
                if result.rollback_failed {
                    Err(rollback_failed_error(&result))
                } else {
                    // Success and clean-rollback outcomes both answer with
                    // the result object; the caller inspects `success`.
                    Ok(result.to_wire())
                }
            }
            Err(e @ ManagerError::Load(_)) => Err(RpcError::new(
                codes::HOTSWAP_FAILED,
                format!("Hot swap failed: {e}"),
            )),
            Err(e) => Err(manager_error(&e)),
        }
    }

    async fn plugin_health(&self, params: &Value) -> Result<Value, RpcError> {
        match optional_str(params, "name")? {
            Some(name) => {
                let health = self.manager.health_check(&name).await.ok_or_else(|| {
                    RpcError::new(
                        codes::PLUGIN_NOT_FOUND,
                        format!("Plugin not loaded: {name}"),
                    )
                })?;
                serde_json::to_value(&health)
                    .map_err(|e| RpcError::new(codes::INTERNAL_ERROR, e.to_string()))
            }
            None => {
                let all = self.manager.health_check_all().await;
                serde_json::to_value(&all)
                    .map_err(|e| RpcError::new(codes::INTERNAL_ERROR, e.to_string()))
            }
        }
    }

    // ─── Contract-routed methods ─────────────────────────────────────────────

    async fn route_to_plugin(
        &self,
        tag: &str,
        op: &str,
        method: &str,
        params: Value,
        id: Option<&RequestId>,
    ) -> Result<Value, RpcError> {
        let routed = self.manager.find_by_contract(tag).await.ok_or_else(|| {
            RpcError::new(
                codes::PLUGIN_NOT_FOUND,
                format!("No plugin loaded for contract '{tag}'"),
            )
        })?;

        if !routed.status.is_serviceable() {
            return Err(RpcError::new(
                codes::PLUGIN_NOT_READY,
                format!("Plugin '{}' is not ready (status: {})", routed.name, routed.status),
            ));
        }

        let id_value = id.map(RequestId::to_value);
        let instance = Arc::clone(&routed.instance);
        let mut guard = instance.lock().await;

        if !guard.methods().contains(&op) {
            return Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ));
        }

        let outcome = self
            .executor
            .run(
                &routed.name,
                op,
                id_value.as_ref(),
                &params,
                guard.invoke(op, params.clone()),
            )
            .await;

        match outcome {
            Ok((result, elapsed_ms)) => {
                debug!(method = %method, plugin = %routed.name, elapsed_ms = elapsed_ms as u64, "Plugin call complete");
                Ok(result)
            }
            Err(e) => {
                warn!(method = %method, plugin = %routed.name, error = %e, "Plugin call failed");
                Err(exec_error(&routed.name, op, &e))
            }
        }
    }
}

// ─── Parameter helpers ────────────────────────────────────────────────────────

fn required_str(params: &Value, key: &str) -> Result<String, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            RpcError::new(
                codes::INVALID_PARAMS,
                format!("Missing required parameter: {key}"),
            )
        })
}

fn optional_str(params: &Value, key: &str) -> Result<Option<String>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RpcError::new(
            codes::INVALID_PARAMS,
            format!("Parameter '{key}' must be a string"),
        )),
    }
}

fn optional_object(params: &Value, key: &str) -> Result<Option<JsonMap>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(RpcError::new(
            codes::INVALID_PARAMS,
            format!("Parameter '{key}' must be an object"),
        )),
    }
}

// ─── Error mapping ────────────────────────────────────────────────────────────

fn manager_error(err: &ManagerError) -> RpcError {
    let code = match err {
        ManagerError::NotFound(_) | ManagerError::NotLoaded(_) => codes::PLUGIN_NOT_FOUND,
        ManagerError::AlreadyLoaded(_) | ManagerError::SlotOccupied { .. } => {
            codes::PLUGIN_ALREADY_LOADED
        }
        ManagerError::ValidationFailed { manifest_invalid, .. } => {
            if *manifest_invalid {
                codes::MANIFEST_INVALID
            } else {
                codes::PLUGIN_LOAD_FAILED
            }
        }
        ManagerError::Load(_) => codes::PLUGIN_LOAD_FAILED,
        ManagerError::InitializeFailed(_) => codes::PLUGIN_INITIALIZE_FAILED,
        ManagerError::ShutdownFailed(_) => codes::PLUGIN_SHUTDOWN_FAILED,
        ManagerError::ContractMismatch { .. } => codes::CONTRACT_MISMATCH,
    };
    RpcError::new(code, err.to_string())
}

fn rollback_failed_error(result: &HotSwapResult) -> RpcError {
    RpcError::new(
        codes::HOTSWAP_ROLLBACK_FAILED,
        format!(
            "Hot swap {} -> {} failed and rollback also failed",
            result.old_plugin, result.new_plugin
        ),
    )
    .with_data(result.to_wire())
}

fn exec_error(plugin: &str, method: &str, err: &ExecError) -> RpcError {
    let code = match err {
        ExecError::Timeout { .. } => codes::EXECUTION_TIMEOUT,
        ExecError::Panicked(_) => codes::PLUGIN_EXCEPTION,
        ExecError::Plugin(PluginError::InvalidParams(_)) => codes::INVALID_PARAMS,
        ExecError::Plugin(PluginError::UnknownOperation(_))
        | ExecError::Plugin(PluginError::Unsupported(_)) => codes::METHOD_NOT_FOUND,
        ExecError::Plugin(PluginError::ResourceExhausted(_)) => codes::RESOURCE_EXHAUSTED,
        ExecError::Plugin(PluginError::Failed(_)) => codes::PLUGIN_EXCEPTION,
    };

    let exception = match err {
        ExecError::Timeout { .. } => "Timeout",
        ExecError::Panicked(_) => "Panic",
        ExecError::Plugin(plugin_err) => plugin_err.kind(),
    };

    RpcError::new(code, err.to_string()).with_data(json!({
        "plugin": plugin,
        "method": method,
        "exception": exception,
        "timestamp": epoch_seconds(),
    }))
}

fn epoch_seconds() -> Option<f64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}
