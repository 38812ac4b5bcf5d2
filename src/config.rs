//! Diagnostic thresholds and exclusion rules, loadable from YAML.

use serde::{Deserialize, Serialize};

use crate::report::{DiagnosticStandard, PerformanceStandard, ResourceStandard};

/// Chromium's clock-sync probe; it shows up in captures on every page and
/// is never part of the page under test.
pub const CLOCK_SYNC_ENDPOINT: &str = "clients2.google.com/time/1/current";

/// Thresholds every visited page is judged against. Any subset can be
/// overridden from a YAML file; missing fields keep their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticConfig {
    /// Hard deadline for the page load event.
    pub page_load_timeout_ms: u64,
    /// PASS/FAIL threshold for the measured load time, and the bound on
    /// how long we poll for document readiness.
    pub page_load_standard_ms: u64,
    /// Resource-timing duration above which a resource counts as slow.
    pub resource_slow_ms: u64,
    /// Round-trip above which an HTTP exchange counts as slow.
    pub api_slow_ms: u64,
    /// PASS/FAIL threshold for image transfer size.
    pub image_max_kb: f64,
    /// Captured exchanges whose URL contains any of these substrings are
    /// ignored entirely.
    pub exclude_url_substrings: Vec<String>,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_ms: 20_000,
            page_load_standard_ms: 3_000,
            resource_slow_ms: 2_000,
            api_slow_ms: 3_000,
            image_max_kb: 5.0,
            exclude_url_substrings: vec![CLOCK_SYNC_ENDPOINT.to_string()],
        }
    }
}

impl DiagnosticConfig {
    /// The subset of thresholds embedded in the emitted report.
    pub fn standard(&self) -> DiagnosticStandard {
        DiagnosticStandard {
            performance: PerformanceStandard {
                page_load_ms: self.page_load_standard_ms,
            },
            resource: ResourceStandard {
                image_max_kb: self.image_max_kb,
            },
        }
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.exclude_url_substrings
            .iter()
            .any(|needle| url.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exclude_the_clock_sync_endpoint() {
        let config = DiagnosticConfig::default();
        assert!(config.is_excluded(
            "https://clients2.google.com/time/1/current?cup2key=4:abc"
        ));
        assert!(!config.is_excluded("https://api.example.com/v1/items"));
        assert_eq!(config.page_load_timeout_ms, 20_000);
        assert_eq!(config.standard().performance.page_load_ms, 3_000);
        assert_eq!(config.standard().resource.image_max_kb, 5.0);
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let config: DiagnosticConfig = serde_yaml::from_str(
            "page_load_standard_ms: 5000\nimage_max_kb: 12.5\n",
        )
        .unwrap();
        assert_eq!(config.page_load_standard_ms, 5_000);
        assert_eq!(config.image_max_kb, 12.5);
        // Untouched fields keep their defaults.
        assert_eq!(config.api_slow_ms, 3_000);
        assert!(config.is_excluded(CLOCK_SYNC_ENDPOINT));
    }
}
