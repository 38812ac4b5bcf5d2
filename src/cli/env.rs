use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Smart page diagnostics over headless Chromium")]
pub struct CliArgs {
    /// URLs to diagnose. A single argument naming an existing file is
    /// read as a URL list instead.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// File with URLs to diagnose (one per line, or a JSON array)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub urls_file: Option<PathBuf>,

    /// JSON report output path
    #[arg(long, value_name = "FILE", default_value = "reports/smart_report.json")]
    pub json: PathBuf,

    /// HTML report output path
    #[arg(long, value_name = "FILE", default_value = "reports/smart_report.html")]
    pub html: PathBuf,

    /// Threshold configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Diagnostic log file
    #[arg(long, value_name = "FILE", default_value = "smartdiag.log")]
    pub log_file: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Run the browser with a visible window
    #[arg(long)]
    pub headful: bool,

    /// Chrome/Chromium executable to launch
    #[arg(long, value_name = "PATH")]
    pub chrome_path: Option<PathBuf>,
}
