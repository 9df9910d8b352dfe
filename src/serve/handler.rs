//! Maps one request to one dispatcher call.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::protocol::{Request, Response, INVALID_PARAMS, UNKNOWN_OP};
use crate::dispatcher::Dispatcher;
use crate::error::{LaneError, LaneResult};
use crate::ops::{self, DEFAULT_ELEMENT_TIMEOUT_SECS, DEFAULT_SWIPE_DURATION_MS};
use crate::session::Target;

#[derive(Debug, Deserialize)]
struct ShellParams {
    command: String,
}

#[derive(Debug, Deserialize)]
struct TapParams {
    x: i32,
    y: i32,
}

#[derive(Debug, Deserialize)]
struct SwipeParams {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    #[serde(default = "default_swipe_duration")]
    duration_ms: i64,
}

fn default_swipe_duration() -> i64 {
    DEFAULT_SWIPE_DURATION_MS
}

#[derive(Debug, Deserialize)]
struct TextParams {
    text: String,
    #[serde(default)]
    clear: bool,
}

#[derive(Debug, Deserialize)]
struct ActionParams {
    action: String,
}

#[derive(Debug, Deserialize)]
struct ElementParams {
    text: Option<String>,
    resource_id: Option<String>,
    content_desc: Option<String>,
    #[serde(default = "default_element_timeout")]
    timeout_s: f64,
}

fn default_element_timeout() -> f64 {
    DEFAULT_ELEMENT_TIMEOUT_SECS
}

/// Outcome of a request before it is wrapped in a response
enum Failure {
    Lane(LaneError),
    Params(String),
    UnknownOp(String),
    Encode(String),
}

impl From<LaneError> for Failure {
    fn from(err: LaneError) -> Self {
        Failure::Lane(err)
    }
}

fn params<T: DeserializeOwned>(raw: &Value) -> Result<T, Failure> {
    let raw = if raw.is_null() { json!({}) } else { raw.clone() };
    serde_json::from_value(raw).map_err(|e| Failure::Params(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: LaneResult<T>) -> Result<Value, Failure> {
    let value = value?;
    serde_json::to_value(value).map_err(|e| Failure::Encode(e.to_string()))
}

/// Execute `request` against `dispatcher`
pub fn handle(dispatcher: &Dispatcher, request: Request) -> Response {
    let id = request.id.clone();
    match execute(dispatcher, &request) {
        Ok(result) => Response::success(id, result),
        Err(Failure::Lane(err)) => Response::from_error(id, &err),
        Err(Failure::Params(message)) => Response::failure(id, INVALID_PARAMS, message),
        Err(Failure::UnknownOp(op)) => {
            Response::failure(id, UNKNOWN_OP, format!("unknown op: {}", op))
        }
        Err(Failure::Encode(message)) => Response::failure(id, "INTERNAL", message),
    }
}

fn execute(dispatcher: &Dispatcher, request: &Request) -> Result<Value, Failure> {
    let target = Target::from_option(request.serial.as_deref());

    match request.op.as_str() {
        "list_devices" => to_value(dispatcher.list_devices()),
        "device_status" => {
            let serial = target
                .serial()
                .ok_or_else(|| Failure::Params("device_status requires serial".to_string()))?;
            to_value(dispatcher.device_status(serial))
        }
        "list_active_sessions" => Ok(json!(dispatcher.list_active_sessions())),
        "session_snapshots" => to_value(Ok(dispatcher.session_snapshots())),
        "clear_session" => {
            let serial = target
                .serial()
                .ok_or_else(|| Failure::Params("clear_session requires serial".to_string()))?;
            Ok(json!({ "cleared": dispatcher.clear_session(serial) }))
        }
        "shell" => {
            let p: ShellParams = params(&request.params)?;
            to_value(ops::shell(dispatcher, target, &p.command))
        }
        "tap" => {
            let p: TapParams = params(&request.params)?;
            to_value(ops::tap(dispatcher, target, p.x, p.y))
        }
        "swipe" => {
            let p: SwipeParams = params(&request.params)?;
            to_value(ops::swipe(dispatcher, target, (p.x1, p.y1), (p.x2, p.y2), p.duration_ms))
        }
        "send_text" => {
            let p: TextParams = params(&request.params)?;
            to_value(ops::send_text(dispatcher, target, &p.text, p.clear))
        }
        "system_action" => {
            let p: ActionParams = params(&request.params)?;
            to_value(ops::system_action(dispatcher, target, &p.action))
        }
        "click_element" => {
            let p: ElementParams = params(&request.params)?;
            let selector = ops::element_selector(
                p.text.as_deref(),
                p.resource_id.as_deref(),
                p.content_desc.as_deref(),
            )?;
            to_value(ops::click_element(dispatcher, target, selector, p.timeout_s))
        }
        "ui_info" => to_value(ops::ui_info(dispatcher, target)),
        other => Err(Failure::UnknownOp(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DeviceExecutor;
    use crate::mock::MockRegistry;
    use crate::session::{SessionManager, SessionPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher(registry: &MockRegistry) -> Dispatcher {
        let policy = SessionPolicy::default().with_connect_retry(0, Duration::ZERO);
        Dispatcher::new(
            SessionManager::new(Arc::new(registry.clone()), policy),
            DeviceExecutor::new(2).unwrap(),
        )
    }

    fn request(line: &str) -> Request {
        Request::parse(line).unwrap()
    }

    #[test]
    fn test_tap_request() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let response = handle(&d, request(r#"{"id":1,"op":"tap","params":{"x":5,"y":6}}"#));
        assert!(response.ok);
        assert_eq!(response.id, json!(1));
        assert_eq!(response.result, Some(json!("Tapped at (5, 6)")));
    }

    #[test]
    fn test_swipe_default_duration() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let line = r#"{"op":"swipe","params":{"x1":0,"y1":0,"x2":9,"y2":9}}"#;
        let response = handle(&d, request(line));
        assert!(response.ok);
        assert_eq!(registry.gestures()[0].action, "swipe 0 0 9 9 300");
    }

    #[test]
    fn test_missing_params() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let response = handle(&d, request(r#"{"id":"t","op":"tap"}"#));
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_unknown_op() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let response = handle(&d, request(r#"{"id":2,"op":"reboot"}"#));
        assert_eq!(response.error.unwrap().code, UNKNOWN_OP);
    }

    #[test]
    fn test_resolution_error_code() {
        let registry = MockRegistry::with_serials(["A", "B"]);
        let d = dispatcher(&registry);

        let response = handle(&d, request(r#"{"id":3,"op":"ui_info"}"#));
        let error = response.error.unwrap();
        assert_eq!(error.code, "RESOLUTION_FAILED");
        assert!(error.message.contains("specify serial"));
    }

    #[test]
    fn test_session_ops() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        handle(&d, request(r#"{"op":"shell","serial":"A","params":{"command":"echo"}}"#));

        let active = handle(&d, request(r#"{"op":"list_active_sessions"}"#));
        assert_eq!(active.result, Some(json!(["A"])));

        let snapshots = handle(&d, request(r#"{"op":"session_snapshots"}"#));
        assert_eq!(snapshots.result.unwrap()[0]["serial"], "A");

        let cleared = handle(&d, request(r#"{"op":"clear_session","serial":"A"}"#));
        assert_eq!(cleared.result, Some(json!({"cleared": true})));

        let missing = handle(&d, request(r#"{"op":"clear_session"}"#));
        assert_eq!(missing.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_list_devices() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let response = handle(&d, request(r#"{"op":"list_devices"}"#));
        let devices = response.result.unwrap();
        assert_eq!(devices[0]["serial"], "A");
        assert_eq!(devices[0]["android_version"], "14");
    }

    #[test]
    fn test_device_status() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let status = handle(&d, request(r#"{"op":"device_status","serial":"A"}"#));
        assert_eq!(status.result.unwrap()["model"], "Mock Device");

        let absent = handle(&d, request(r#"{"op":"device_status","serial":"Z"}"#));
        assert_eq!(absent.error.unwrap().code, "RESOLUTION_FAILED");

        let unnamed = handle(&d, request(r#"{"op":"device_status"}"#));
        assert_eq!(unnamed.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn test_click_element() {
        let registry = MockRegistry::with_serials(["A"]);
        registry.show_element("A", lane_backend::Selector::Text("OK".into()));
        let d = dispatcher(&registry);

        let hit = handle(&d, request(r#"{"id":1,"op":"click_element","params":{"text":"OK"}}"#));
        assert_eq!(hit.result, Some(json!("Clicked element with selector text=OK")));

        let line = r#"{"id":2,"op":"click_element","params":{"text":"Nope","timeout_s":0}}"#;
        let miss = handle(&d, request(line));
        assert_eq!(miss.error.unwrap().code, "ELEMENT_NOT_FOUND");

        let line = r#"{"id":3,"op":"click_element","params":{"text":"OK","resource_id":"id/ok"}}"#;
        let ambiguous = handle(&d, request(line));
        assert_eq!(ambiguous.error.unwrap().code, INVALID_PARAMS);

        assert_eq!(d.list_active_sessions(), vec!["A"]);
    }
}
