//! One attached page target plus the capture state the diagnostics
//! pipeline reads from: a console-entry buffer and the network exchange
//! log.

use std::sync::Arc;
use std::time::Duration;

use exchange_log::{Exchange, ExchangeLog, TapEvent};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::transport::{Transport, TransportEvent};

/// Severity of a captured console entry, collapsed from the CDP level and
/// console-API call type strings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsoleLevel {
    Severe,
    Warning,
    Info,
    Debug,
}

impl ConsoleLevel {
    fn from_cdp(raw: &str) -> Self {
        match raw {
            "error" | "assert" => ConsoleLevel::Severe,
            "warning" => ConsoleLevel::Warning,
            "debug" | "verbose" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Info,
        }
    }
}

/// One console log entry captured since the last drain.
#[derive(Clone, Debug)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
}

/// A configured, headless, isolated browser with console and network
/// capture enabled. Owns exactly one page target; the diagnostics run
/// drives it strictly sequentially.
pub struct BrowserSession {
    transport: Arc<Transport>,
    session_id: String,
    console: Arc<Mutex<Vec<ConsoleEntry>>>,
    exchanges: Arc<ExchangeLog>,
    load_bus: broadcast::Sender<()>,
    event_task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl BrowserSession {
    /// Launch Chromium, open a blank page target, attach to it, and enable
    /// the Page/Runtime/Log/Network domains.
    pub async fn launch(cfg: SessionConfig) -> Result<Self, SessionError> {
        let transport = Arc::new(Transport::launch(&cfg).await?);

        let created = transport
            .send(None, "Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::Internal("createTarget missing targetId".to_string()))?
            .to_string();

        let attached = transport
            .send(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SessionError::Internal("attachToTarget missing sessionId".to_string())
            })?
            .to_string();

        for (method, params) in [
            ("Page.enable", Value::Object(Default::default())),
            ("Runtime.enable", Value::Object(Default::default())),
            ("Log.enable", Value::Object(Default::default())),
            (
                "Network.enable",
                json!({
                    "maxTotalBufferSize": 1_048_576u64,
                    "maxResourceBufferSize": 524_288u64,
                }),
            ),
        ] {
            transport
                .send(Some(session_id.clone()), method, params)
                .await?;
        }

        let console = Arc::new(Mutex::new(Vec::new()));
        let exchanges = Arc::new(ExchangeLog::new());
        let (load_bus, _) = broadcast::channel(16);
        let shutdown = CancellationToken::new();

        let event_task = tokio::spawn(event_loop(
            Arc::clone(&transport),
            session_id.clone(),
            Arc::clone(&console),
            Arc::clone(&exchanges),
            load_bus.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            transport,
            session_id,
            console,
            exchanges,
            load_bus,
            event_task,
            shutdown,
        })
    }

    /// Navigate the page and wait up to `deadline` for its load event.
    /// A deadline elapse is signaled as [`SessionError::NavTimeout`], which
    /// callers treat as recoverable.
    pub async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), SessionError> {
        // Subscribe before issuing the command so a fast load cannot race
        // past the wait below.
        let mut load_rx = self.load_bus.subscribe();

        let response = self
            .send_session("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(text) = response.get("errorText").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                return Err(SessionError::CdpIo(format!("navigation failed: {text}")));
            }
        }

        // A load event already queued when the navigate command was
        // acknowledged belongs to an earlier navigation (the ack precedes
        // the new page's load on the wire); drop it so a stale event from a
        // timed-out page cannot satisfy this wait.
        drain_stale_load_events(&mut load_rx);

        match timeout(deadline, load_rx.recv()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => Ok(()),
            Ok(Err(broadcast::error::RecvError::Closed)) => Err(SessionError::Internal(
                "load event channel closed".to_string(),
            )),
            Err(_) => Err(SessionError::NavTimeout),
        }
    }

    /// Evaluate a script expression in page context and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, SessionError> {
        let response = self
            .send_session(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|ex| ex.get("description"))
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("script exception");
            return Err(SessionError::Evaluate(text.to_string()));
        }

        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Drain all console entries captured since the last call.
    pub fn take_console_entries(&self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut *self.console.lock())
    }

    /// Snapshot the HTTP exchanges captured since the last clear.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.snapshot()
    }

    /// Reset the exchange capture before visiting the next page.
    pub fn clear_exchanges(&self) {
        self.exchanges.clear();
    }

    /// Tear the session down: stop the event loop and kill the browser.
    /// Consumes the session, so release happens exactly once.
    pub async fn close(self) {
        self.shutdown.cancel();
        let _ = self.event_task.await;
        self.transport.shutdown().await;
    }

    async fn send_session(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.transport
            .send(Some(self.session_id.clone()), method, params)
            .await
    }
}

fn drain_stale_load_events(load_rx: &mut broadcast::Receiver<()>) {
    loop {
        match load_rx.try_recv() {
            Ok(()) => continue,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

async fn event_loop(
    transport: Arc<Transport>,
    session_id: String,
    console: Arc<Mutex<Vec<ConsoleEntry>>>,
    exchanges: Arc<ExchangeLog>,
    load_bus: broadcast::Sender<()>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = transport.next_event() => {
                match event {
                    Some(ev) => {
                        // Only events for the attached page target matter.
                        if ev.session_id.as_deref() == Some(session_id.as_str()) {
                            handle_event(ev, &console, &exchanges, &load_bus);
                        }
                    }
                    None => {
                        debug!(target: "cdp-session", "transport stream ended");
                        break;
                    }
                }
            }
        }
    }
}

fn handle_event(
    event: TransportEvent,
    console: &Mutex<Vec<ConsoleEntry>>,
    exchanges: &ExchangeLog,
    load_bus: &broadcast::Sender<()>,
) {
    match event.method.as_str() {
        "Page.loadEventFired" => {
            let _ = load_bus.send(());
        }
        "Log.entryAdded" => match serde_json::from_value::<LogEntryAddedParams>(event.params) {
            Ok(payload) => {
                console.lock().push(ConsoleEntry {
                    level: ConsoleLevel::from_cdp(&payload.entry.level),
                    text: payload.entry.text,
                });
            }
            Err(err) => warn!(target: "cdp-session", ?err, "malformed Log.entryAdded"),
        },
        "Runtime.consoleAPICalled" => {
            match serde_json::from_value::<ConsoleApiCalledParams>(event.params) {
                Ok(payload) => {
                    let text = payload
                        .args
                        .iter()
                        .map(RemoteObject::render)
                        .collect::<Vec<_>>()
                        .join(" ");
                    console.lock().push(ConsoleEntry {
                        level: ConsoleLevel::from_cdp(&payload.kind),
                        text,
                    });
                }
                Err(err) => warn!(target: "cdp-session", ?err, "malformed consoleAPICalled"),
            }
        }
        "Runtime.exceptionThrown" => {
            match serde_json::from_value::<ExceptionThrownParams>(event.params) {
                Ok(payload) => {
                    let text = payload
                        .exception_details
                        .exception
                        .and_then(|ex| ex.description)
                        .or(payload.exception_details.text)
                        .unwrap_or_else(|| "uncaught exception".to_string());
                    console.lock().push(ConsoleEntry {
                        level: ConsoleLevel::Severe,
                        text,
                    });
                }
                Err(err) => warn!(target: "cdp-session", ?err, "malformed exceptionThrown"),
            }
        }
        "Network.requestWillBeSent" => {
            match serde_json::from_value::<RequestWillBeSentParams>(event.params) {
                Ok(payload) => exchanges.ingest(TapEvent::RequestWillBeSent {
                    id: payload.request_id,
                    url: payload.request.url,
                    method: payload.request.method,
                    ts: payload.timestamp,
                }),
                Err(err) => warn!(target: "cdp-session", ?err, "malformed requestWillBeSent"),
            }
        }
        "Network.responseReceived" => {
            match serde_json::from_value::<ResponseReceivedParams>(event.params) {
                Ok(payload) => exchanges.ingest(TapEvent::ResponseReceived {
                    id: payload.request_id,
                    status: payload.response.status,
                    ts: payload.timestamp,
                }),
                Err(err) => warn!(target: "cdp-session", ?err, "malformed responseReceived"),
            }
        }
        "Network.loadingFailed" => {
            match serde_json::from_value::<LoadingFailedParams>(event.params) {
                Ok(payload) => exchanges.ingest(TapEvent::LoadingFailed {
                    id: payload.request_id,
                    error_text: payload.error_text,
                }),
                Err(err) => warn!(target: "cdp-session", ?err, "malformed loadingFailed"),
            }
        }
        _ => {}
    }
}

#[derive(Debug, Deserialize)]
struct LogEntryAddedParams {
    entry: LogEntryPayload,
}

#[derive(Debug, Deserialize)]
struct LogEntryPayload {
    level: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ConsoleApiCalledParams {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    args: Vec<RemoteObject>,
}

#[derive(Debug, Deserialize)]
struct RemoteObject {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

impl RemoteObject {
    fn render(&self) -> String {
        match (&self.value, &self.description) {
            (Some(Value::String(s)), _) => s.clone(),
            (Some(other), _) => other.to_string(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExceptionThrownParams {
    exception_details: ExceptionDetailsPayload,
}

#[derive(Debug, Deserialize)]
struct ExceptionDetailsPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    exception: Option<ExceptionObject>,
}

#[derive(Debug, Deserialize)]
struct ExceptionObject {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSentParams {
    request_id: String,
    request: RequestPayload,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    url: String,
    method: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReceivedParams {
    request_id: String,
    response: ResponsePayload,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    status: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFailedParams {
    request_id: String,
    #[serde(default)]
    error_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_level_collapses_cdp_strings() {
        assert_eq!(ConsoleLevel::from_cdp("error"), ConsoleLevel::Severe);
        assert_eq!(ConsoleLevel::from_cdp("assert"), ConsoleLevel::Severe);
        assert_eq!(ConsoleLevel::from_cdp("warning"), ConsoleLevel::Warning);
        assert_eq!(ConsoleLevel::from_cdp("verbose"), ConsoleLevel::Debug);
        assert_eq!(ConsoleLevel::from_cdp("log"), ConsoleLevel::Info);
    }

    #[test]
    fn remote_object_prefers_string_values() {
        let obj: RemoteObject =
            serde_json::from_value(json!({ "value": "plain text" })).unwrap();
        assert_eq!(obj.render(), "plain text");

        let obj: RemoteObject = serde_json::from_value(json!({ "value": 42 })).unwrap();
        assert_eq!(obj.render(), "42");

        let obj: RemoteObject =
            serde_json::from_value(json!({ "description": "TypeError: x is undefined" }))
                .unwrap();
        assert_eq!(obj.render(), "TypeError: x is undefined");
    }

    #[test]
    fn stale_load_events_are_drained_before_the_wait() {
        let (tx, mut rx) = broadcast::channel(16);
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        drain_stale_load_events(&mut rx);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        // Events arriving afterwards still come through.
        tx.send(()).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn network_event_payloads_deserialize() {
        let params = json!({
            "requestId": "1000.1",
            "request": { "url": "https://example.com/", "method": "GET", "headers": {} },
            "timestamp": 1234.5,
            "wallTime": 1.7e9,
        });
        let payload: RequestWillBeSentParams = serde_json::from_value(params).unwrap();
        assert_eq!(payload.request_id, "1000.1");
        assert_eq!(payload.request.method, "GET");
        assert_eq!(payload.timestamp, Some(1234.5));

        let params = json!({
            "requestId": "1000.1",
            "response": { "status": 404, "url": "https://example.com/" },
            "timestamp": 1235.0,
        });
        let payload: ResponseReceivedParams = serde_json::from_value(params).unwrap();
        assert_eq!(payload.response.status, 404);
    }
}
