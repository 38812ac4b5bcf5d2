use anyhow::Result;
use cdp_session::{BrowserSession, SessionConfig};
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use super::env::CliArgs;
use super::runtime::{init_logging, load_config};
use crate::collector::collect_page;
use crate::loader::resolve_urls;
use crate::report::Report;
use crate::writer::write_reports;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let urls = resolve_urls(cli.urls_file.as_deref(), &cli.urls)?;
    if urls.is_empty() {
        // Refuse before any browser work; nothing useful can come of an
        // empty target list.
        CliArgs::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "no URLs to diagnose: pass URLs, or -f/--urls-file with a non-empty list",
            )
            .exit();
    }

    let _log_guard = init_logging(&cli.log_level, &cli.log_file)?;
    info!("Starting smartdiag v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_ref())?;

    let mut session_config = SessionConfig::default();
    if let Some(path) = cli.chrome_path.clone() {
        session_config.executable = path;
    }
    session_config.headless = !cli.headful;
    session_config.command_timeout_ms = config.page_load_timeout_ms;

    let session = BrowserSession::launch(session_config).await?;

    let mut report = Report::new(config.standard());
    let mut outcome = Ok(());
    for url in &urls {
        info!(%url, "visiting page");
        match collect_page(&session, url, &config).await {
            Ok(record) => {
                info!(
                    %url,
                    load_ms = record.performance.page_load_time_ms,
                    console_errors = record.console_issues.errors.len(),
                    api_errors = record.api_issues.errors.len(),
                    "page diagnosed"
                );
                report.insert(url.clone(), record);
            }
            Err(err) => {
                error!(%url, %err, "diagnostics aborted");
                outcome = Err(err);
                break;
            }
        }
    }

    // Whatever happened, persist what we have and release the browser.
    if let Err(err) = write_reports(&report, &cli.json, &cli.html) {
        error!(%err, "failed to write reports");
        if outcome.is_ok() {
            outcome = Err(err);
        }
    }
    session.close().await;

    outcome
}
