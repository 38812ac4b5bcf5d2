//! Headless Chromium session over the DevTools protocol.
//!
//! The crate owns exactly one browser process and one attached page target,
//! and exposes the capability surface the diagnostics pipeline needs:
//! navigate with a load deadline, evaluate a script expression, drain
//! captured console entries, and snapshot/clear captured HTTP exchanges.
//! The underlying process is released exactly once even when diagnostics
//! fail mid-run.

pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::{detect_chrome_executable, SessionConfig};
pub use error::SessionError;
pub use exchange_log::{Exchange, ExchangeLog, TapEvent};
pub use session::{BrowserSession, ConsoleEntry, ConsoleLevel};
