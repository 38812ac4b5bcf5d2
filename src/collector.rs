//! Per-URL diagnostic collection: drives the browser session through one
//! page visit and distills the captured signals into a `PageRecord`.

use std::time::{Duration, Instant};

use anyhow::Result;
use cdp_session::{BrowserSession, ConsoleEntry, ConsoleLevel, Exchange};
use tracing::{debug, warn};

use crate::config::DiagnosticConfig;
use crate::report::{
    ApiError, ApiIssues, ApiTimeout, ConsoleIssues, OversizedImage, PagePerformance, PageRecord,
    ResourceEntry, ResourceIssues, SlowResponse,
};

/// In-page probe: every resource-timing entry reduced to the fields the
/// report cares about.
const RESOURCE_TIMING_SCRIPT: &str = "performance.getEntriesByType('resource').map(r => \
     ({name: r.name, type: r.initiatorType, duration: Math.round(r.duration), \
     size: Math.round(r.encodedBodySize)}))";

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Visits one URL and assembles its diagnostic record.
///
/// A navigation that misses the load deadline is recorded, not fatal: the
/// page gets the timeout as its load time and whatever console and
/// network signals arrived before the deadline. Any other session failure
/// aborts the run.
pub async fn collect_page(
    session: &BrowserSession,
    url: &str,
    config: &DiagnosticConfig,
) -> Result<PageRecord> {
    // Start each visit from a clean capture: exchanges and console
    // entries left over from the previous page must not leak in.
    session.clear_exchanges();
    let stale = session.take_console_entries();
    if !stale.is_empty() {
        debug!(count = stale.len(), "dropped console entries from previous page");
    }

    let started = Instant::now();
    let deadline = Duration::from_millis(config.page_load_timeout_ms);
    match session.navigate(url, deadline).await {
        Ok(()) => {
            wait_for_readiness(session, config, started).await;
        }
        Err(err) if err.is_nav_timeout() => {
            warn!(%url, timeout_ms = config.page_load_timeout_ms, "page load deadline missed");
        }
        Err(err) => return Err(err.into()),
    }
    let page_load_time_ms = started.elapsed().as_millis() as u64;

    let console_issues = classify_console(session.take_console_entries());

    let resources = match session.evaluate(RESOURCE_TIMING_SCRIPT).await {
        Ok(value) => parse_resource_entries(&value),
        Err(err) => {
            warn!(%url, %err, "resource timing probe failed");
            Vec::new()
        }
    };
    let resource_issues = classify_resources(&resources, config);
    let api_issues = classify_exchanges(&session.exchanges(), config);

    Ok(PageRecord {
        performance: PagePerformance { page_load_time_ms },
        console_issues,
        api_issues,
        resource_issues,
    })
}

/// Polls `document.readyState` until the document is complete, bounded by
/// the load standard. The bound keeps a busy page from inflating the
/// measurement past the threshold it is judged against.
async fn wait_for_readiness(session: &BrowserSession, config: &DiagnosticConfig, started: Instant) {
    let bound = Duration::from_millis(config.page_load_standard_ms);
    while started.elapsed() < bound {
        let poll = session.evaluate("document.readyState").await;
        if matches!(readiness_step(poll), ReadinessStep::Ready) {
            return;
        }
        tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
}

enum ReadinessStep {
    Ready,
    Retry,
}

fn readiness_step(poll: Result<serde_json::Value, cdp_session::SessionError>) -> ReadinessStep {
    match poll {
        Ok(value) if value.as_str() == Some("complete") => ReadinessStep::Ready,
        Ok(_) => ReadinessStep::Retry,
        Err(err) => {
            // A failed poll says nothing about readiness; keep waiting out
            // the bound instead of cutting the measurement short.
            debug!(%err, "readiness poll failed");
            ReadinessStep::Retry
        }
    }
}

/// Buckets console output by severity. Deprecation notices are their own
/// bucket regardless of level; Info/Debug chatter is dropped.
pub fn classify_console(entries: Vec<ConsoleEntry>) -> ConsoleIssues {
    let mut issues = ConsoleIssues::default();
    for entry in entries {
        if entry.text.to_ascii_lowercase().contains("deprecated") {
            issues.deprecations.push(entry.text);
        } else {
            match entry.level {
                ConsoleLevel::Severe => issues.errors.push(entry.text),
                ConsoleLevel::Warning => issues.warnings.push(entry.text),
                ConsoleLevel::Info | ConsoleLevel::Debug => {}
            }
        }
    }
    issues
}

/// Decodes the resource-timing probe result. A malformed payload yields
/// an empty list rather than failing the page.
pub fn parse_resource_entries(value: &serde_json::Value) -> Vec<ResourceEntry> {
    match serde_json::from_value(value.clone()) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(%err, "unparseable resource timing payload");
            Vec::new()
        }
    }
}

/// Flags slow resources and oversized images against the configured
/// thresholds.
pub fn classify_resources(
    resources: &[ResourceEntry],
    config: &DiagnosticConfig,
) -> ResourceIssues {
    let mut issues = ResourceIssues::default();
    for resource in resources {
        if resource.duration > config.resource_slow_ms {
            issues.slow_resources_ms.push(resource.clone());
        }
        if resource.kind == "img" {
            let size_kb = (resource.size as f64 / 1024.0 * 10.0).round() / 10.0;
            if size_kb > config.image_max_kb {
                issues.oversized_images.push(OversizedImage {
                    url: resource.name.clone(),
                    size_kb,
                });
            }
        }
    }
    issues
}

/// Flags failing, unanswered, and slow HTTP exchanges. Excluded URLs are
/// skipped before any classification.
pub fn classify_exchanges(exchanges: &[Exchange], config: &DiagnosticConfig) -> ApiIssues {
    let mut issues = ApiIssues::default();
    for exchange in exchanges {
        if config.is_excluded(&exchange.url) {
            continue;
        }
        match exchange.status {
            None => issues.timeouts.push(ApiTimeout {
                url: exchange.url.clone(),
                method: exchange.method.clone(),
            }),
            Some(status) if status >= 400 => issues.errors.push(ApiError {
                url: exchange.url.clone(),
                status,
                method: exchange.method.clone(),
            }),
            Some(_) => {}
        }
        if let (Some(request_ts), Some(response_ts)) = (exchange.request_ts, exchange.response_ts) {
            let duration_ms = ((response_ts - request_ts) * 1000.0).round() as u64;
            if duration_ms > config.api_slow_ms {
                issues.slow_responses_ms.push(SlowResponse {
                    url: exchange.url.clone(),
                    duration_ms,
                });
            }
        }
    }
    issues
}
