//! Bridge and UI handles over adb shell commands.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use lane_backend::{BackendError, BackendResult, BridgeHandle, Selector, UiHandle};
use regex_lite::Regex;
use serde_json::{json, Value};

use super::run_adb;

/// Pause between UI hierarchy dumps while waiting for an element
const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Device-bridge handle: `get-state` and `shell`
#[derive(Debug)]
pub struct AdbBridge {
    adb: PathBuf,
    serial: String,
}

impl AdbBridge {
    pub fn new(adb: PathBuf, serial: impl Into<String>) -> Self {
        Self {
            adb,
            serial: serial.into(),
        }
    }
}

impl BridgeHandle for AdbBridge {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn state(&self) -> BackendResult<String> {
        let out = run_adb(&self.adb, Some(&self.serial), &["get-state"])?;
        Ok(out.trim().to_string())
    }

    fn shell(&self, command: &str) -> BackendResult<String> {
        run_adb(&self.adb, Some(&self.serial), &["shell", command])
    }
}

/// UI handle driving the `input` and `wm` shell tools
#[derive(Debug)]
pub struct AdbUi {
    adb: PathBuf,
    serial: String,
}

impl AdbUi {
    /// Open a UI handle, checking the window manager answers.
    pub fn connect(adb: PathBuf, serial: impl Into<String>) -> BackendResult<Self> {
        let ui = Self {
            adb,
            serial: serial.into(),
        };
        ui.display_size()?;
        Ok(ui)
    }

    fn shell(&self, command: &str) -> BackendResult<String> {
        run_adb(&self.adb, Some(&self.serial), &["shell", command])
    }

    fn display_size(&self) -> BackendResult<String> {
        let out = self.shell("wm size")?;
        parse_display_size(&out).ok_or_else(|| {
            BackendError::transport(format!("unexpected 'wm size' output: {}", out.trim()))
        })
    }
}

impl UiHandle for AdbUi {
    fn info(&self) -> BackendResult<Value> {
        let display = self.display_size()?;
        Ok(json!({
            "serial": self.serial,
            "display": display,
        }))
    }

    fn tap(&self, x: i32, y: i32) -> BackendResult<()> {
        self.shell(&format!("input tap {} {}", x, y)).map(drop)
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration: Duration) -> BackendResult<()> {
        self.shell(&format!(
            "input swipe {} {} {} {} {}",
            x1,
            y1,
            x2,
            y2,
            duration.as_millis()
        ))
        .map(drop)
    }

    fn press(&self, key: &str) -> BackendResult<()> {
        self.shell(&format!("input keyevent {}", key_code(key))).map(drop)
    }

    fn send_text(&self, text: &str, clear: bool) -> BackendResult<()> {
        if clear {
            self.shell("input keycombination KEYCODE_CTRL_LEFT KEYCODE_A")?;
            self.shell("input keyevent KEYCODE_DEL")?;
        }
        self.shell(&format!("input text {}", encode_input_text(text))).map(drop)
    }

    fn click_element(&self, selector: &Selector, timeout: Duration) -> BackendResult<bool> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let dump = self.shell("uiautomator dump /dev/tty")?;
            if let Some((x, y)) = find_element(&dump, selector)? {
                self.tap(x, y)?;
                return Ok(true);
            }
            let now = Instant::now();
            match deadline {
                Some(deadline) if now >= deadline => return Ok(false),
                Some(deadline) => thread::sleep(ELEMENT_POLL_INTERVAL.min(deadline - now)),
                None => thread::sleep(ELEMENT_POLL_INTERVAL),
            }
        }
    }
}

/// Center of the first node in a `uiautomator dump` that matches `selector`
pub fn find_element(dump: &str, selector: &Selector) -> BackendResult<Option<(i32, i32)>> {
    let node_re = pattern(r"<node\b[^>]*>")?;
    let attr_re = pattern(r#"([\w-]+)="([^"]*)""#)?;
    let bounds_re = pattern(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$")?;

    let wanted = match selector {
        Selector::Text(_) => "text",
        Selector::ResourceId(_) => "resource-id",
        Selector::ContentDesc(_) => "content-desc",
    };

    for node in node_re.find_iter(dump) {
        let mut matched = false;
        let mut bounds = None;
        for attr in attr_re.captures_iter(node.as_str()) {
            let (name, value) = (&attr[1], attr.get(2).map_or("", |m| m.as_str()));
            if name == wanted && unescape_xml(value) == selector.value() {
                matched = true;
            } else if name == "bounds" {
                bounds = Some(value);
            }
        }
        if !matched {
            continue;
        }
        let center = bounds
            .and_then(|b| bounds_re.captures(b))
            .and_then(|c| {
                let n = |i: usize| c[i].parse::<i32>().ok();
                Some(((n(1)? + n(3)?) / 2, (n(2)? + n(4)?) / 2))
            });
        if center.is_some() {
            return Ok(center);
        }
    }
    Ok(None)
}

fn pattern(re: &str) -> BackendResult<Regex> {
    Regex::new(re).map_err(|e| BackendError::other(format!("bad element pattern: {}", e)))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Keycode for a backend key name (`back`, `home`, `recent`, or a raw code)
pub fn key_code(key: &str) -> String {
    match key.trim().to_ascii_lowercase().as_str() {
        "back" => "KEYCODE_BACK".to_string(),
        "home" => "KEYCODE_HOME".to_string(),
        "recent" => "KEYCODE_APP_SWITCH".to_string(),
        other if other.chars().all(|c| c.is_ascii_digit()) => other.to_string(),
        other if other.starts_with("keycode_") => other.to_ascii_uppercase(),
        other => format!("KEYCODE_{}", other.to_ascii_uppercase()),
    }
}

/// Escape text for `input text`: spaces become `%s`, shell metacharacters
/// are backslash-escaped.
pub fn encode_input_text(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => encoded.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*' | '?'
            | '#' | '~' => {
                encoded.push('\\');
                encoded.push(c);
            }
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Display size from `wm size` output, preferring the override size
pub fn parse_display_size(output: &str) -> Option<String> {
    let mut physical = None;
    for line in output.lines() {
        if let Some((label, size)) = line.split_once(':') {
            let size = size.trim();
            if size.is_empty() {
                continue;
            }
            match label.trim() {
                "Override size" => return Some(size.to_string()),
                "Physical size" => physical = Some(size.to_string()),
                _ => {}
            }
        }
    }
    physical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_code() {
        assert_eq!(key_code("back"), "KEYCODE_BACK");
        assert_eq!(key_code("HOME"), "KEYCODE_HOME");
        assert_eq!(key_code("recent"), "KEYCODE_APP_SWITCH");
        assert_eq!(key_code("66"), "66");
        assert_eq!(key_code("keycode_enter"), "KEYCODE_ENTER");
        assert_eq!(key_code("enter"), "KEYCODE_ENTER");
    }

    #[test]
    fn test_encode_input_text() {
        assert_eq!(encode_input_text("hello world"), "hello%sworld");
        assert_eq!(encode_input_text("a&b"), "a\\&b");
        assert_eq!(encode_input_text("it's $5"), "it\\'s%s\\$5");
    }

    const DUMP: &str = concat!(
        r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0">"#,
        r#"<node index="0" text="" resource-id="" class="android.widget.FrameLayout" "#,
        r#"content-desc="" bounds="[0,0][1080,2400]">"#,
        r#"<node index="0" text="Save &amp; exit" resource-id="com.app:id/save" "#,
        r#"class="android.widget.Button" content-desc="" bounds="[100,200][300,260]" />"#,
        r#"<node index="1" text="" resource-id="com.app:id/close" "#,
        r#"class="android.widget.ImageButton" content-desc="Close" bounds="[980,40][1060,120]" />"#,
        r#"</node></hierarchy>UI hierchary dumped to: /dev/tty"#,
    );

    #[test]
    fn test_find_element_by_each_selector() {
        let by_text = find_element(DUMP, &Selector::Text("Save & exit".into())).unwrap();
        assert_eq!(by_text, Some((200, 230)));

        let by_id = find_element(DUMP, &Selector::ResourceId("com.app:id/close".into())).unwrap();
        assert_eq!(by_id, Some((1020, 80)));

        let by_desc = find_element(DUMP, &Selector::ContentDesc("Close".into())).unwrap();
        assert_eq!(by_desc, Some((1020, 80)));
    }

    #[test]
    fn test_find_element_miss() {
        assert_eq!(find_element(DUMP, &Selector::Text("Cancel".into())).unwrap(), None);
        assert_eq!(find_element(DUMP, &Selector::Text("Save".into())).unwrap(), None);
        let no_nodes = find_element("ERROR: null root node", &Selector::Text("OK".into()));
        assert_eq!(no_nodes.unwrap(), None);
    }

    #[test]
    fn test_parse_display_size() {
        assert_eq!(
            parse_display_size("Physical size: 1080x2400\n").as_deref(),
            Some("1080x2400")
        );
        assert_eq!(
            parse_display_size("Physical size: 1440x3120\nOverride size: 1080x2340\n").as_deref(),
            Some("1080x2340")
        );
        assert_eq!(parse_display_size("error: closed"), None);
    }
}
