//! Smart page diagnostics over headless Chromium.
//!
//! Visits a list of URLs in one browser session, measures page load time,
//! drains the page console, captures every HTTP exchange, and grades the
//! results against configured thresholds into JSON and HTML reports.

pub mod cli;
pub mod collector;
pub mod config;
pub mod loader;
pub mod render;
pub mod report;
pub mod writer;
