//! Self-contained HTML report rendering.
//!
//! Built by `format!` composition into a single document with inline
//! styles; no assets, no templating runtime.

use std::fmt::Write;

use crate::report::{PageRecord, Report};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8"><title>Smart Diagnostics Report</title>
  <style>
    body { font-family: Arial; margin: 20px; }
    h2 { border-bottom: 1px solid #ccc; padding-bottom: 4px; }
    table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
    th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
    th { background: #f4f4f4; }
    .error { color: #c00 }
    .warn  { color: #e65 }
    .ok    { color: #090 }
  </style>
</head>
<body>
  <h1>Smart Diagnostics Report</h1>
"#;

const PAGE_FOOT: &str = "</body>\n</html>\n";

/// Renders the whole report as one HTML document, pages in visit order.
pub fn render_html(report: &Report) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(PAGE_HEAD);
    for (url, record) in report.pages() {
        render_page(&mut out, url, record, report);
    }
    out.push_str(PAGE_FOOT);
    out
}

fn render_page(out: &mut String, url: &str, record: &PageRecord, report: &Report) {
    let _ = writeln!(out, "  <h2>{}</h2>", escape_html(url));

    let load_ms = record.performance.page_load_time_ms;
    let standard_ms = report.standard.performance.page_load_ms;
    let verdict = if load_ms > standard_ms {
        r#"<span class="error">FAIL</span>"#
    } else {
        r#"<span class="ok">PASS</span>"#
    };
    let _ = writeln!(
        out,
        "  <h3>Performance</h3>\n  <p>Load Time: <strong>{load_ms} ms</strong> \
         (Expected &le; {standard_ms} ms) {verdict}</p>"
    );

    let _ = writeln!(out, "  <h3>Console Issues</h3>");
    let console = &record.console_issues;
    render_console_bucket(out, "Errors", "error", &console.errors);
    render_console_bucket(out, "Warnings", "warn", &console.warnings);
    render_console_bucket(out, "Deprecations", "warn", &console.deprecations);

    let api = &record.api_issues;
    let _ = writeln!(
        out,
        "  <h3>API Issues</h3>\n  <p>Errors: <span class=\"error\">{}</span>, \
         Timeouts: <span class=\"warn\">{}</span>, \
         Slow: <span class=\"warn\">{}</span></p>",
        api.errors.len(),
        api.timeouts.len(),
        api.slow_responses_ms.len()
    );

    let resources = &record.resource_issues;
    let _ = writeln!(
        out,
        "  <h3>Resource Issues</h3>\n  <p>Missing/404: <span class=\"error\">{}</span>, \
         Slow: <span class=\"warn\">{}</span>, \
         Oversized Images: <span class=\"error\">{}</span> (Max {:.1} KB)</p>",
        resources.missing_or_404.len(),
        resources.slow_resources_ms.len(),
        resources.oversized_images.len(),
        report.standard.resource.image_max_kb
    );
    if !resources.oversized_images.is_empty() {
        out.push_str("  <table>\n    <tr><th>URL</th><th>Size (KB)</th><th>Result</th></tr>\n");
        for image in &resources.oversized_images {
            let verdict = if image.size_kb > report.standard.resource.image_max_kb {
                r#"<span class="error">FAIL</span>"#
            } else {
                r#"<span class="ok">PASS</span>"#
            };
            // One decimal place, so whole-number sizes render as the JSON
            // does (6.0, not 6).
            let _ = writeln!(
                out,
                "    <tr><td>{}</td><td>{:.1}</td><td>{verdict}</td></tr>",
                escape_html(&image.url),
                image.size_kb
            );
        }
        out.push_str("  </table>\n");
    }
}

fn render_console_bucket(out: &mut String, label: &str, class: &str, messages: &[String]) {
    let _ = writeln!(
        out,
        "  <p>{label}: <span class=\"{class}\">{}</span></p>",
        messages.len()
    );
    if !messages.is_empty() {
        out.push_str("  <table>\n    <tr><th>Message</th></tr>\n");
        for message in messages {
            let _ = writeln!(out, "    <tr><td>{}</td></tr>", escape_html(message));
        }
        out.push_str("  </table>\n");
    }
}

/// Minimal entity escaping for text nodes and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
