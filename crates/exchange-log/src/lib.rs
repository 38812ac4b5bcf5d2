//! In-memory capture of HTTP exchanges observed through CDP `Network.*`
//! events.
//!
//! The browser session feeds every request/response pair into an
//! [`ExchangeLog`]; the diagnostics collector pulls a snapshot per page and
//! clears the store before the next navigation so captures never leak
//! across pages.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// CDP network request identifier (`Network.RequestId`).
pub type RequestId = String;

/// One captured HTTP request plus its response, if one ever arrived.
///
/// `status == None` means the browser never received a response for the
/// request (aborted, connection failure, or still pending at snapshot
/// time). Timestamps are CDP monotonic seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exchange {
    pub url: String,
    pub method: String,
    pub status: Option<i64>,
    pub request_ts: Option<f64>,
    pub response_ts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Network events understood by the log, mirroring the CDP event surface.
#[derive(Clone, Debug)]
pub enum TapEvent {
    RequestWillBeSent {
        id: RequestId,
        url: String,
        method: String,
        ts: Option<f64>,
    },
    ResponseReceived {
        id: RequestId,
        status: i64,
        ts: Option<f64>,
    },
    LoadingFailed {
        id: RequestId,
        error_text: String,
    },
}

/// Concurrent exchange store preserving first-seen request order.
#[derive(Default)]
pub struct ExchangeLog {
    entries: DashMap<RequestId, Exchange>,
    order: Mutex<Vec<RequestId>>,
}

impl ExchangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one network event. Redirect hops reuse the CDP request id, so
    /// a repeated `RequestWillBeSent` updates the existing entry in place
    /// (the final hop's URL and timestamp win, the position does not move).
    pub fn ingest(&self, event: TapEvent) {
        match event {
            TapEvent::RequestWillBeSent {
                id,
                url,
                method,
                ts,
            } => {
                if let Some(mut entry) = self.entries.get_mut(&id) {
                    entry.url = url;
                    entry.method = method;
                    entry.request_ts = ts;
                    entry.status = None;
                    entry.response_ts = None;
                    return;
                }
                self.entries.insert(
                    id.clone(),
                    Exchange {
                        url,
                        method,
                        status: None,
                        request_ts: ts,
                        response_ts: None,
                        failure: None,
                    },
                );
                self.order.lock().push(id);
            }
            TapEvent::ResponseReceived { id, status, ts } => {
                if let Some(mut entry) = self.entries.get_mut(&id) {
                    entry.status = Some(status);
                    entry.response_ts = ts;
                }
            }
            TapEvent::LoadingFailed { id, error_text } => {
                if let Some(mut entry) = self.entries.get_mut(&id) {
                    entry.failure = Some(error_text);
                }
            }
        }
    }

    /// Copy out all captured exchanges in first-seen order.
    pub fn snapshot(&self) -> Vec<Exchange> {
        let order = self.order.lock();
        order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        self.order.lock().clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
