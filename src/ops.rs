//! Device operations
//!
//! Typed operations run through the [`Dispatcher`]. Parameters are validated
//! on the calling thread before any device is resolved, so a bad request never
//! touches a backend and is never retried.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use lane_backend::Selector;
use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::error::{LaneError, LaneResult};
use crate::session::Target;

/// Default swipe duration in milliseconds
pub const DEFAULT_SWIPE_DURATION_MS: i64 = 300;

/// Default wait for a UI element to appear, in seconds
pub const DEFAULT_ELEMENT_TIMEOUT_SECS: f64 = 10.0;

/// Hardware/navigation key presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    Back,
    Home,
    RecentApps,
}

impl SystemAction {
    /// Action name as accepted from callers
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemAction::Back => "BACK",
            SystemAction::Home => "HOME",
            SystemAction::RecentApps => "RECENT_APPS",
        }
    }

    /// Key name understood by the UI backend
    pub fn key(&self) -> &'static str {
        match self {
            SystemAction::Back => "back",
            SystemAction::Home => "home",
            SystemAction::RecentApps => "recent",
        }
    }
}

impl fmt::Display for SystemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemAction {
    type Err = LaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BACK" => Ok(SystemAction::Back),
            "HOME" => Ok(SystemAction::Home),
            "RECENT_APPS" => Ok(SystemAction::RecentApps),
            _ => Err(LaneError::validation(
                "Invalid action. Allowed values: BACK, HOME, RECENT_APPS",
            )),
        }
    }
}

/// Run a shell command on the device (no UI lock)
pub fn shell(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    command: &str,
) -> LaneResult<String> {
    let command = command.trim();
    if command.is_empty() {
        return Err(LaneError::validation("command cannot be empty"));
    }
    let command = command.to_string();
    dispatcher.run_for_device(
        target,
        move |session| Ok(session.bridge().shell(&command)?),
        false,
    )
}

/// Tap a screen coordinate
pub fn tap(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    x: i32,
    y: i32,
) -> LaneResult<String> {
    check_coordinate("x", x)?;
    check_coordinate("y", y)?;
    dispatcher.run_for_device(
        target,
        move |session| {
            session.ui().tap(x, y)?;
            Ok(format!("Tapped at ({}, {})", x, y))
        },
        true,
    )
}

/// Swipe between two coordinates over `duration_ms` milliseconds
pub fn swipe(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    from: (i32, i32),
    to: (i32, i32),
    duration_ms: i64,
) -> LaneResult<String> {
    let (x1, y1) = from;
    let (x2, y2) = to;
    for (name, value) in [("x1", x1), ("y1", y1), ("x2", x2), ("y2", y2)] {
        check_coordinate(name, value)?;
    }
    let duration = u64::try_from(duration_ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| LaneError::validation("duration_ms must be > 0"))?;

    dispatcher.run_for_device(
        target,
        move |session| {
            session.ui().swipe(x1, y1, x2, y2, duration)?;
            Ok(format!("Swiped from ({}, {}) to ({}, {})", x1, y1, x2, y2))
        },
        true,
    )
}

/// Type text into the focused field, optionally clearing it first
pub fn send_text(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    text: &str,
    clear: bool,
) -> LaneResult<String> {
    if text.is_empty() {
        return Err(LaneError::validation("text cannot be empty"));
    }
    let text = text.to_string();
    dispatcher.run_for_device(
        target,
        move |session| {
            session.ui().send_text(&text, clear)?;
            Ok(format!("Sent text: {}", text))
        },
        true,
    )
}

/// Press a navigation key
pub fn system_action(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    action: &str,
) -> LaneResult<String> {
    let action: SystemAction = action.parse()?;
    dispatcher.run_for_device(
        target,
        move |session| {
            session.ui().press(action.key())?;
            Ok(format!("Performed action: {}", action))
        },
        true,
    )
}

/// Build a selector from caller fields. Exactly one must be non-empty.
pub fn element_selector(
    text: Option<&str>,
    resource_id: Option<&str>,
    content_desc: Option<&str>,
) -> LaneResult<Selector> {
    let given = |field: Option<&str>| field.filter(|v| !v.is_empty()).map(str::to_string);
    let mut selectors = [
        given(text).map(Selector::Text),
        given(resource_id).map(Selector::ResourceId),
        given(content_desc).map(Selector::ContentDesc),
    ]
    .into_iter()
    .flatten();

    match (selectors.next(), selectors.next()) {
        (Some(selector), None) => Ok(selector),
        _ => Err(LaneError::validation(
            "Exactly one selector must be provided: text, resource_id, content_desc",
        )),
    }
}

/// Wait up to `timeout_s` seconds for the element, then click it.
///
/// A miss is [`LaneError::ElementNotFound`]: the session stays cached and the
/// click is not retried.
pub fn click_element(
    dispatcher: &Dispatcher,
    target: impl Into<Target>,
    selector: Selector,
    timeout_s: f64,
) -> LaneResult<String> {
    let timeout = Duration::try_from_secs_f64(timeout_s)
        .map_err(|_| LaneError::validation("timeout_s must be a finite number >= 0"))?;

    dispatcher.run_for_device(
        target,
        move |session| {
            if session.ui().click_element(&selector, timeout)? {
                Ok(format!("Clicked element with selector {}", selector))
            } else {
                Err(LaneError::ElementNotFound {
                    selector: selector.to_string(),
                })
            }
        },
        true,
    )
}

/// UI backend introspection
pub fn ui_info(dispatcher: &Dispatcher, target: impl Into<Target>) -> LaneResult<Value> {
    dispatcher.run_for_device(target, |session| Ok(session.ui().info()?), true)
}

fn check_coordinate(name: &str, value: i32) -> LaneResult<()> {
    if value < 0 {
        return Err(LaneError::validation(format!("{} must be >= 0, got {}", name, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DeviceExecutor;
    use crate::mock::{BackendCall, FailureConfig, MockRegistry};
    use crate::session::{SessionManager, SessionPolicy};
    use lane_backend::ErrorKind;
    use std::sync::Arc;

    fn dispatcher(registry: &MockRegistry) -> Dispatcher {
        let policy = SessionPolicy::default().with_connect_retry(0, Duration::ZERO);
        let sessions = SessionManager::new(Arc::new(registry.clone()), policy);
        Dispatcher::new(sessions, DeviceExecutor::new(2).unwrap())
    }

    fn actions(registry: &MockRegistry) -> Vec<String> {
        registry.gestures().into_iter().map(|g| g.action).collect()
    }

    #[test]
    fn test_system_action_parse() {
        assert_eq!(" home ".parse::<SystemAction>().unwrap(), SystemAction::Home);
        assert_eq!("recent_apps".parse::<SystemAction>().unwrap().key(), "recent");
        assert!("MENU".parse::<SystemAction>().is_err());
    }

    #[test]
    fn test_tap_confirms() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        assert_eq!(tap(&d, "A", 10, 20).unwrap(), "Tapped at (10, 20)");
        assert_eq!(actions(&registry), vec!["tap 10 20"]);
    }

    #[test]
    fn test_swipe_duration_passed_through() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let msg = swipe(&d, "A", (0, 0), (100, 200), DEFAULT_SWIPE_DURATION_MS).unwrap();
        assert_eq!(msg, "Swiped from (0, 0) to (100, 200)");
        assert_eq!(actions(&registry), vec!["swipe 0 0 100 200 300"]);
    }

    #[test]
    fn test_validation_never_reaches_backend() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        assert!(matches!(swipe(&d, "A", (0, 0), (1, 1), 0), Err(LaneError::Validation(_))));
        assert!(matches!(tap(&d, "A", -1, 5), Err(LaneError::Validation(_))));
        assert!(matches!(send_text(&d, "A", "", false), Err(LaneError::Validation(_))));
        assert!(matches!(system_action(&d, "A", "menu"), Err(LaneError::Validation(_))));
        assert!(matches!(
            click_element(&d, "A", Selector::Text("OK".into()), -1.0),
            Err(LaneError::Validation(_))
        ));
        assert!(matches!(shell(&d, "A", "   "), Err(LaneError::Validation(_))));

        assert_eq!(registry.calls(BackendCall::ListSerials), 0);
        assert!(d.list_active_sessions().is_empty());
    }

    #[test]
    fn test_send_text_and_system_action() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        assert_eq!(
            send_text(&d, Target::Default, "hello world", true).unwrap(),
            "Sent text: hello world"
        );
        assert_eq!(
            system_action(&d, Target::Default, "recent_apps").unwrap(),
            "Performed action: RECENT_APPS"
        );
        assert_eq!(actions(&registry), vec!["text hello world clear=true", "press recent"]);
    }

    #[test]
    fn test_shell_output() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let out = shell(&d, "A", "echo hi").unwrap();
        assert!(out.ends_with(": echo hi"));
    }

    #[test]
    fn test_ui_info_returns_backend_value() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let info = ui_info(&d, "A").unwrap();
        assert_eq!(info["serial"], "A");
    }

    #[test]
    fn test_gesture_transient_failure_retried() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);
        registry.inject(
            BackendCall::Gesture,
            FailureConfig::error(ErrorKind::Transport, "rpc channel closed").with_fail_count(1),
        );

        assert_eq!(tap(&d, "A", 1, 1).unwrap(), "Tapped at (1, 1)");
        assert_eq!(registry.calls(BackendCall::Gesture), 2);
        assert_eq!(registry.calls(BackendCall::Bridge), 2);
    }

    #[test]
    fn test_element_selector_requires_exactly_one() {
        assert_eq!(
            element_selector(Some("OK"), None, Some("")).unwrap(),
            Selector::Text("OK".into())
        );
        assert_eq!(
            element_selector(None, Some("id/ok"), None).unwrap(),
            Selector::ResourceId("id/ok".into())
        );
        assert!(matches!(element_selector(None, None, None), Err(LaneError::Validation(_))));
        assert!(matches!(
            element_selector(Some("OK"), Some("id/ok"), None),
            Err(LaneError::Validation(_))
        ));
    }

    #[test]
    fn test_click_element_found() {
        let registry = MockRegistry::with_serials(["A"]);
        registry.show_element("A", Selector::ContentDesc("Close".into()));
        let d = dispatcher(&registry);

        let msg = click_element(&d, "A", Selector::ContentDesc("Close".into()), 1.0).unwrap();
        assert_eq!(msg, "Clicked element with selector content_desc=Close");
        assert_eq!(actions(&registry), vec!["click content_desc=Close"]);
    }

    #[test]
    fn test_click_element_miss_keeps_session() {
        let registry = MockRegistry::with_serials(["A"]);
        let d = dispatcher(&registry);

        let err = click_element(&d, "A", Selector::Text("Missing".into()), 0.05).unwrap_err();
        match &err {
            LaneError::ElementNotFound { selector } => assert_eq!(selector, "text=Missing"),
            other => panic!("expected ElementNotFound, got {:?}", other),
        }
        assert_eq!(err.code(), "ELEMENT_NOT_FOUND");

        let session_id = d.session_snapshots()[0].session_id.clone();
        assert!(click_element(&d, "A", Selector::Text("Missing".into()), 0.0).is_err());

        assert_eq!(registry.calls(BackendCall::Gesture), 2);
        assert_eq!(registry.calls(BackendCall::Bridge), 1);
        assert_eq!(d.session_snapshots()[0].session_id, session_id);
    }
}
