//! JSON-RPC 2.0 request and response framing.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Request identifier: a string or an integer.
///
/// A request without an identifier is a *notification* and must never
/// produce a response frame. An explicit `null` id is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Number(n) => json!(n),
            RequestId::String(s) => json!(s),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Named mapping, positional sequence, or `Null` when absent.
    pub params: Value,
    /// Absent for notifications.
    pub id: Option<RequestId>,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Why a parsed JSON value is not a conformant request object.
///
/// Carries the request id when one could still be extracted, so the
/// `INVALID_REQUEST` response can echo it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InvalidRequest {
    pub id: Option<RequestId>,
    pub message: String,
}

fn extract_id(value: &Value) -> Result<Option<RequestId>, String> {
    match value.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => Ok(Some(RequestId::Number(n))),
            None => Err("Request id must be an integer or a string".to_string()),
        },
        Some(_) => Err("Request id must be an integer or a string".to_string()),
    }
}

impl Request {
    /// Interprets a parsed JSON value as a JSON-RPC 2.0 request.
    pub fn from_value(value: Value) -> Result<Request, InvalidRequest> {
        if !value.is_object() {
            return Err(InvalidRequest {
                id: None,
                message: "Request must be a JSON object".to_string(),
            });
        }

        let id = match extract_id(&value) {
            Ok(id) => id,
            Err(message) => return Err(InvalidRequest { id: None, message }),
        };

        match value.get("jsonrpc").and_then(Value::as_str) {
            Some("2.0") => {}
            _ => {
                return Err(InvalidRequest {
                    id,
                    message: "Request 'jsonrpc' member must be \"2.0\"".to_string(),
                });
            }
        }

        let method = match value.get("method").and_then(Value::as_str) {
            Some(method) if !method.is_empty() => method.to_string(),
            _ => {
                return Err(InvalidRequest {
                    id,
                    message: "Request 'method' member must be a non-empty string".to_string(),
                });
            }
        };

        let params = match value.get("params") {
            None => Value::Null,
            Some(params @ (Value::Object(_) | Value::Array(_))) => params.clone(),
            Some(_) => {
                return Err(InvalidRequest {
                    id,
                    message: "Request 'params' member must be an object or an array".to_string(),
                });
            }
        };

        Ok(Request { method, params, id })
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An outbound response frame.
#[derive(Debug, Clone)]
pub struct Response {
    /// `Null` when the request id could not be determined (parse errors).
    pub id: Value,
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    pub fn success(id: &RequestId, result: Value) -> Self {
        Self { id: id.to_value(), outcome: Ok(result) }
    }

    pub fn failure(id: Option<&RequestId>, error: RpcError) -> Self {
        Self {
            id: id.map(RequestId::to_value).unwrap_or(Value::Null),
            outcome: Err(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Error code of a failure response, if any.
    pub fn error_code(&self) -> Option<i64> {
        self.outcome.as_ref().err().map(|e| e.code)
    }

    /// The JSON object form of this frame.
    pub fn to_json(&self) -> Value {
        match &self.outcome {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "id": self.id,
                "result": result,
            }),
            Err(error) => {
                let mut body = json!({
                    "code": error.code,
                    "message": error.message,
                });
                if let Some(data) = &error.data {
                    body["data"] = data.clone();
                }
                json!({
                    "jsonrpc": "2.0",
                    "id": self.id,
                    "error": body,
                })
            }
        }
    }

    /// Compact single-line wire form (no embedded newlines).
    pub fn to_line(&self) -> String {
        self.to_json().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_numeric_id() {
        let request = Request::from_value(json!({
            "jsonrpc": "2.0", "method": "ping", "id": 1
        }))
        .unwrap();
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(RequestId::Number(1)));
        assert!(request.params.is_null());
    }

    #[test]
    fn absent_and_null_ids_are_notifications() {
        let r1 = Request::from_value(json!({"jsonrpc": "2.0", "method": "ping"})).unwrap();
        assert!(r1.is_notification());
        let r2 =
            Request::from_value(json!({"jsonrpc": "2.0", "method": "ping", "id": null})).unwrap();
        assert!(r2.is_notification());
    }

    #[test]
    fn wrong_version_is_invalid_but_keeps_id() {
        let err = Request::from_value(json!({"jsonrpc": "1.0", "method": "ping", "id": 7}))
            .unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(7)));
        assert!(err.message.contains("2.0"));
    }

    #[test]
    fn missing_method_is_invalid() {
        let err = Request::from_value(json!({"jsonrpc": "2.0", "id": "a"})).unwrap_err();
        assert_eq!(err.id, Some(RequestId::String("a".to_string())));
        assert!(err.message.contains("method"));
    }

    #[test]
    fn scalar_params_are_invalid() {
        let err = Request::from_value(json!({
            "jsonrpc": "2.0", "method": "ping", "params": 3, "id": 1
        }))
        .unwrap_err();
        assert!(err.message.contains("params"));
    }

    #[test]
    fn fractional_id_is_invalid() {
        let err = Request::from_value(json!({
            "jsonrpc": "2.0", "method": "ping", "id": 1.5
        }))
        .unwrap_err();
        assert!(err.message.contains("id"));
    }

    #[test]
    fn success_frame_matches_wire_shape() {
        let response = Response::success(&RequestId::Number(1), json!("pong"));
        assert_eq!(
            response.to_json(),
            json!({"jsonrpc": "2.0", "id": 1, "result": "pong"})
        );
        assert!(!response.to_line().contains('\n'));
    }

    #[test]
    fn error_frame_includes_code_and_optional_data() {
        let response = Response::failure(
            None,
            RpcError::new(-32700, "Parse error: bad json").with_data(json!({"line": 1})),
        );
        let wire = response.to_json();
        assert_eq!(wire["id"], Value::Null);
        assert_eq!(wire["error"]["code"], -32700);
        assert_eq!(wire["error"]["data"]["line"], 1);

        let plain = Response::failure(Some(&RequestId::Number(2)), RpcError::new(-32601, "nope"));
        assert!(plain.to_json()["error"].get("data").is_none());
    }
}
