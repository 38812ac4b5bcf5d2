use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::DiagnosticConfig;

const DEFAULT_CONFIG_PATH: &str = "config/smartdiag.yaml";

/// Initializes tracing with a console layer and a plain-text file layer.
/// The returned guard must live for the whole run or buffered file output
/// is lost.
pub fn init_logging(level: &str, log_file: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file
        .file_name()
        .context("log file path has no file name")?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Loads thresholds from YAML, falling back to defaults when no config
/// file is present. An explicit `--config` path that cannot be read is an
/// error; the implicit default path is allowed to be absent.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<DiagnosticConfig> {
    let (path, explicit) = match config_path {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DiagnosticConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        info!(path = %path.display(), "loaded threshold configuration");
        Ok(config)
    } else if explicit {
        anyhow::bail!("config file not found: {}", path.display());
    } else {
        warn!(path = %path.display(), "config file not found, using default thresholds");
        Ok(DiagnosticConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_config_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.page_load_standard_ms, 3_000);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn explicit_config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smartdiag.yaml");
        fs::write(&path, "api_slow_ms: 1500\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.api_slow_ms, 1_500);
        assert_eq!(config.resource_slow_ms, 2_000);
    }
}
