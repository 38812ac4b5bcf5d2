//! Report output: JSON and HTML side by side.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::render::render_html;
use crate::report::Report;

/// Writes the JSON and HTML renditions of the report, creating parent
/// directories as needed.
pub fn write_reports(report: &Report, json_path: &Path, html_path: &Path) -> Result<()> {
    for path in [json_path, html_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating report directory {}", parent.display()))?;
            }
        }
    }

    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    fs::write(json_path, json)
        .with_context(|| format!("writing JSON report {}", json_path.display()))?;

    fs::write(html_path, render_html(report))
        .with_context(|| format!("writing HTML report {}", html_path.display()))?;

    info!(json = %json_path.display(), html = %html_path.display(), "reports saved");
    Ok(())
}
