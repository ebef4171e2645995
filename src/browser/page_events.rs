//! Forwards what the page itself reports (console output, uncaught exceptions,
//! failed requests) to the log. When a selector stops matching, this is
//! usually where the reason shows up.

use crate::errors::{PublishError, Result};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Network;
use headless_chrome::Tab;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// In-flight request URLs are forgotten past this many, so a long session
/// cannot grow the map without bound.
const MAX_PENDING: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMessage {
    Console { level: String, text: String },
    Exception(String),
    RequestFailed { url: String, error: String, canceled: bool },
}

impl PageMessage {
    /// Console errors, exceptions and real request failures are worth a
    /// warning; everything else is debug noise.
    pub fn is_warning(&self) -> bool {
        match self {
            PageMessage::Console { level, .. } => matches!(level.as_str(), "error" | "assert" | "warning"),
            PageMessage::Exception(_) => true,
            PageMessage::RequestFailed { canceled, .. } => !canceled,
        }
    }
}

impl std::fmt::Display for PageMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageMessage::Console { level, text } => write!(f, "console.{}: {}", level, text),
            PageMessage::Exception(text) => write!(f, "page error: {}", text),
            PageMessage::RequestFailed { url, error, .. } => write!(f, "request failed: {} ({})", url, error),
        }
    }
}

fn remote_object_text(arg: &Value) -> String {
    match arg.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => arg
            .get("description")
            .or_else(|| arg.get("unserializableValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                arg.get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("undefined")
                    .to_string()
            }),
        Some(other) => other.to_string(),
    }
}

/// `Runtime.consoleAPICalled` params.
pub fn console_message(params: &Value) -> PageMessage {
    let level = params
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("log")
        .to_string();
    let text = params
        .get("args")
        .and_then(Value::as_array)
        .map(|args| args.iter().map(remote_object_text).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    PageMessage::Console { level, text }
}

/// `Runtime.exceptionThrown` params.
pub fn exception_message(params: &Value) -> PageMessage {
    let details = &params["exceptionDetails"];
    let text = details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("unknown exception");
    PageMessage::Exception(text.to_string())
}

/// `Network.loadingFailed` params, with the URL recorded when the request
/// was sent.
pub fn request_failed_message(params: &Value, url: Option<String>) -> PageMessage {
    PageMessage::RequestFailed {
        url: url.unwrap_or_else(|| format!("request {}", params["requestId"].as_str().unwrap_or("?"))),
        error: params["errorText"].as_str().unwrap_or("unknown").to_string(),
        canceled: params["canceled"].as_bool().unwrap_or(false),
    }
}

#[derive(Default)]
pub struct PageEventLog {
    pending: Mutex<HashMap<String, String>>,
}

impl PageEventLog {
    /// Enable the Runtime and Network domains on `tab` and start forwarding.
    pub fn attach(tab: &Tab) -> Result<()> {
        tab.enable_runtime().map_err(PublishError::from_driver)?;
        let network: Network::Enable = serde_json::from_value(json!({}))?;
        tab.call_method(network).map_err(PublishError::from_driver)?;

        let log = Arc::new(PageEventLog::default());
        tab.add_event_listener(Arc::new(move |event: &Event| log.observe(event)))
            .map_err(PublishError::from_driver)?;
        Ok(())
    }

    fn observe(&self, event: &Event) {
        let message = match event {
            Event::RuntimeConsoleAPICalled(ev) => serde_json::to_value(&ev.params).ok().map(|p| console_message(&p)),
            Event::RuntimeExceptionThrown(ev) => serde_json::to_value(&ev.params).ok().map(|p| exception_message(&p)),
            Event::NetworkRequestWillBeSent(ev) => {
                self.remember(ev.params.request_id.clone(), ev.params.request.url.clone());
                None
            }
            Event::NetworkLoadingFinished(ev) => {
                self.forget(&ev.params.request_id);
                None
            }
            Event::NetworkLoadingFailed(ev) => {
                let url = self.forget(&ev.params.request_id);
                serde_json::to_value(&ev.params)
                    .ok()
                    .map(|p| request_failed_message(&p, url))
            }
            _ => None,
        };

        if let Some(message) = message {
            if message.is_warning() {
                warn!("{}", message);
            } else {
                debug!("{}", message);
            }
        }
    }

    fn remember(&self, request_id: String, url: String) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.len() >= MAX_PENDING {
            pending.clear();
        }
        pending.insert(request_id, url);
    }

    fn forget(&self, request_id: &str) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_args_are_joined() {
        let message = console_message(&json!({
            "type": "error",
            "args": [
                {"type": "string", "value": "selector failed:"},
                {"type": "number", "value": 3},
                {"type": "object", "description": "HTMLDivElement"},
                {"type": "undefined"}
            ]
        }));
        assert_eq!(
            message,
            PageMessage::Console {
                level: "error".into(),
                text: "selector failed: 3 HTMLDivElement undefined".into()
            }
        );
        assert!(message.is_warning());
    }

    #[test]
    fn plain_logs_stay_at_debug() {
        let message = console_message(&json!({"type": "log", "args": [{"type": "string", "value": "ready"}]}));
        assert!(!message.is_warning());
        assert_eq!(message.to_string(), "console.log: ready");
    }

    #[test]
    fn exceptions_prefer_the_thrown_description() {
        let thrown = exception_message(&json!({
            "timestamp": 1.0,
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {"type": "object", "description": "TypeError: x is undefined"}
            }
        }));
        assert_eq!(thrown, PageMessage::Exception("TypeError: x is undefined".into()));

        let bare = exception_message(&json!({"exceptionDetails": {"text": "Uncaught SyntaxError"}}));
        assert_eq!(bare, PageMessage::Exception("Uncaught SyntaxError".into()));
    }

    #[test]
    fn failed_requests_use_the_recorded_url() {
        let log = PageEventLog::default();
        log.remember("42.1".into(), "https://note.com/api/v1/text_notes".into());

        let url = log.forget("42.1");
        let message = request_failed_message(
            &json!({"requestId": "42.1", "errorText": "net::ERR_FAILED", "canceled": false}),
            url,
        );
        assert_eq!(
            message.to_string(),
            "request failed: https://note.com/api/v1/text_notes (net::ERR_FAILED)"
        );
        assert!(message.is_warning());
        assert_eq!(log.forget("42.1"), None);
    }

    #[test]
    fn cancelled_requests_are_not_warnings() {
        let message = request_failed_message(&json!({"requestId": "7", "errorText": "net::ERR_ABORTED", "canceled": true}), None);
        assert!(!message.is_warning());
        assert!(message.to_string().contains("request 7"));
    }
}
