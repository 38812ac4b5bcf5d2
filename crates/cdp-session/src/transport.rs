//! Raw DevTools-protocol transport: launches a Chromium child process,
//! connects to its websocket endpoint, and multiplexes commands and events
//! over a single select loop.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::io::{AsyncBufReadExt, BufReader};
use futures::StreamExt;
use serde_json::Value;
use std::convert::TryInto;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;

/// One decoded CDP event as it came off the wire.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

struct ControlMessage {
    session: Option<String>,
    method: String,
    params: Value,
    responder: oneshot::Sender<Result<Value, SessionError>>,
}

/// Owns the Chromium child process and the websocket connection. The child
/// is killed exactly once: either by [`Transport::shutdown`] or by the
/// `Drop` backstop if teardown never ran.
pub struct Transport {
    command_tx: mpsc::Sender<ControlMessage>,
    events_rx: Mutex<mpsc::Receiver<TransportEvent>>,
    loop_task: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    alive: Arc<AtomicBool>,
    command_deadline: Duration,
}

impl Transport {
    /// Launch Chromium per `cfg` and establish the CDP connection.
    pub async fn launch(cfg: &SessionConfig) -> Result<Self, SessionError> {
        let browser_cfg = browser_config(cfg)?;
        let mut child = browser_cfg
            .launch()
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        let ws_url = extract_ws_url(&mut child).await?;

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| SessionError::CdpIo(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(512);

        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();
        let loop_task = tokio::spawn(async move {
            if let Err(err) = run_loop(conn, command_rx, events_tx).await {
                error!(target: "cdp-session", ?err, "transport loop terminated with error");
            }
            loop_alive.store(false, Ordering::Relaxed);
        });

        info!(target: "cdp-session", url = %ws_url, "chromium connection established");

        Ok(Self {
            command_tx,
            events_rx: Mutex::new(events_rx),
            loop_task,
            child: Mutex::new(Some(child)),
            alive,
            command_deadline: Duration::from_millis(cfg.command_timeout_ms),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Send one CDP command, browser-scoped when `session` is `None`.
    pub async fn send(
        &self,
        session: Option<String>,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let message = ControlMessage {
            session,
            method: method.to_string(),
            params,
            responder: resp_tx,
        };

        self.command_tx
            .send(message)
            .await
            .map_err(|err| SessionError::CdpIo(err.to_string()))?;

        match timeout(self.command_deadline, resp_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::CdpIo(
                "command response channel closed".to_string(),
            )),
            Err(_) => Err(SessionError::CdpIo(format!(
                "command {} timed out",
                method
            ))),
        }
    }

    /// Receive the next decoded CDP event; `None` once the connection ends.
    pub async fn next_event(&self) -> Option<TransportEvent> {
        let mut guard = self.events_rx.lock().await;
        guard.recv().await
    }

    /// Tear the transport down: stop the loop and kill the Chromium child.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(err) = child.kill().await {
                warn!(target: "cdp-session", ?err, "failed to kill chromium child");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        self.loop_task.abort();

        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-session", ?err, "failed to kill chromium child");
                        }
                    });
                } else {
                    debug!(target: "cdp-session", "no tokio runtime available to kill chromium child");
                }
            }
        }
    }
}

fn browser_config(cfg: &SessionConfig) -> Result<BrowserConfig, SessionError> {
    if !cfg.executable.as_os_str().is_empty() && !cfg.executable.exists() {
        return Err(SessionError::Launch(format!(
            "chrome executable not found at {} (set SMARTDIAG_CHROME or pass --chrome-path)",
            cfg.executable.display()
        )));
    }

    let profile_dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        let cwd = std::env::current_dir().map_err(|err| {
            SessionError::Internal(format!("failed to resolve cwd for user-data-dir: {err}"))
        })?;
        cwd.join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&profile_dir).map_err(|err| {
        SessionError::Internal(format!("failed to ensure user-data-dir: {err}"))
    })?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.command_timeout_ms))
        .launch_timeout(Duration::from_secs(20));

    if !cfg.headless {
        builder = builder.with_head();
    }

    if std::env::var("SMARTDIAG_DISABLE_SANDBOX")
        .map(|v| v != "0" && v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        builder = builder.no_sandbox();
    }

    // Background chatter would pollute the captured network traffic, so
    // everything that phones home on its own gets switched off, including
    // the clock-sync service.
    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-client-side-phishing-detection",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-features=NetworkTimeService,NetworkTimeServiceQuerying",
        "--disable-gpu",
        "--disable-hang-monitor",
        "--disable-popup-blocking",
        "--disable-prompt-on-repost",
        "--disable-sync",
        "--metrics-recording-only",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
    ];
    if cfg.headless {
        args.push("--headless=new");
        args.push("--hide-scrollbars");
        args.push("--mute-audio");
    }
    builder = builder.args(args);

    if !cfg.executable.as_os_str().is_empty() {
        builder = builder.chrome_executable(cfg.executable.clone());
    }
    builder = builder.user_data_dir(profile_dir);

    builder
        .build()
        .map_err(|err| SessionError::Launch(format!("browser config error: {err}")))
}

/// Extract the DevTools websocket URL from Chromium's stderr output.
async fn extract_ws_url(child: &mut Child) -> Result<String, SessionError> {
    let stderr = child.stderr.take().ok_or_else(|| {
        SessionError::Launch("chromium process missing stderr handle".to_string())
    })?;
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line.map_err(|err| SessionError::Launch(err.to_string()))?;
            captured.push(line.clone());
            if let Some((_, ws)) = line.rsplit_once("listening on ") {
                let ws = ws.trim();
                if ws.starts_with("ws") && ws.contains("devtools/browser") {
                    return Ok(ws.to_string());
                }
            }
        }
        Err(SessionError::Launch(format!(
            "chromium exited before exposing devtools websocket url. stderr preview: {}",
            captured
                .iter()
                .take(8)
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ")
        )))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| {
            SessionError::Launch("timed out waiting for chromium devtools websocket url".to_string())
        })?
}

async fn run_loop(
    mut conn: Connection<CdpEventMessage>,
    mut command_rx: mpsc::Receiver<ControlMessage>,
    event_tx: mpsc::Sender<TransportEvent>,
) -> Result<(), SessionError> {
    let mut inflight: HashMap<CallId, oneshot::Sender<Result<Value, SessionError>>> =
        HashMap::new();

    loop {
        tokio::select! {
            Some(cmd) = command_rx.recv() => {
                submit(&mut conn, cmd, &mut inflight)?;
            }
            message = conn.next() => {
                match message {
                    Some(Ok(Message::Response(resp))) => {
                        if let Some(sender) = inflight.remove(&resp.id) {
                            let _ = sender.send(extract_payload(resp));
                        }
                    }
                    Some(Ok(Message::Event(event))) => {
                        forward_event(event, &event_tx).await;
                    }
                    Some(Err(err)) => {
                        let session_err = SessionError::CdpIo(err.to_string());
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(session_err.clone()));
                        }
                        return Err(session_err);
                    }
                    None => {
                        let err = SessionError::CdpIo("cdp connection closed".to_string());
                        for (_, sender) in inflight.drain() {
                            let _ = sender.send(Err(err.clone()));
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn submit(
    conn: &mut Connection<CdpEventMessage>,
    cmd: ControlMessage,
    inflight: &mut HashMap<CallId, oneshot::Sender<Result<Value, SessionError>>>,
) -> Result<(), SessionError> {
    let session = cmd.session.map(CdpSessionId::from);
    let method_id: MethodId = cmd.method.clone().into();
    match conn.submit_command(method_id, session, cmd.params) {
        Ok(call_id) => {
            inflight.insert(call_id, cmd.responder);
            Ok(())
        }
        Err(err) => {
            let session_err = SessionError::CdpIo(err.to_string());
            let _ = cmd.responder.send(Err(session_err.clone()));
            Err(session_err)
        }
    }
}

async fn forward_event(event: CdpEventMessage, event_tx: &mpsc::Sender<TransportEvent>) {
    let raw: CdpJsonEventMessage = match event.try_into() {
        Ok(raw) => raw,
        Err(err) => {
            warn!(target: "cdp-session", ?err, "failed to decode cdp event");
            return;
        }
    };

    let payload = TransportEvent {
        method: raw.method.into_owned(),
        params: raw.params,
        session_id: raw.session_id,
    };

    if event_tx.send(payload).await.is_err() {
        debug!(target: "cdp-session", "event channel closed; dropping event");
    }
}

fn extract_payload(resp: Response) -> Result<Value, SessionError> {
    if let Some(result) = resp.result {
        Ok(result)
    } else if let Some(error) = resp.error {
        Err(SessionError::CdpIo(format!(
            "cdp error {}: {}",
            error.code, error.message
        )))
    } else {
        Err(SessionError::Internal("empty cdp response".to_string()))
    }
}
