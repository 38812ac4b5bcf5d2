//! Report data model: the configured standard, per-page diagnostic
//! records, and the ordered aggregate the writer serializes.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

/// Threshold the page load time is judged against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceStandard {
    pub page_load_ms: u64,
}

/// Threshold image resources are judged against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceStandard {
    pub image_max_kb: f64,
}

/// Configured PASS/FAIL thresholds. Immutable after construction;
/// supplied once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticStandard {
    pub performance: PerformanceStandard,
    pub resource: ResourceStandard,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PagePerformance {
    pub page_load_time_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConsoleIssues {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub deprecations: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub url: String,
    pub status: i64,
    pub method: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiTimeout {
    pub url: String,
    pub method: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlowResponse {
    pub url: String,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiIssues {
    pub errors: Vec<ApiError>,
    pub timeouts: Vec<ApiTimeout>,
    pub slow_responses_ms: Vec<SlowResponse>,
}

/// One entry from the in-page resource-timing API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration: u64,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OversizedImage {
    pub url: String,
    pub size_kb: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceIssues {
    /// Declared for shape fidelity; no collection logic populates it yet.
    pub missing_or_404: Vec<ResourceEntry>,
    pub slow_resources_ms: Vec<ResourceEntry>,
    pub oversized_images: Vec<OversizedImage>,
}

/// Everything collected for one visited URL.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageRecord {
    pub performance: PagePerformance,
    pub console_issues: ConsoleIssues,
    pub api_issues: ApiIssues,
    pub resource_issues: ResourceIssues,
}

/// Aggregate of all visited pages plus the standard they were judged
/// against. Pages keep visit order; revisiting a URL replaces its record
/// in place.
#[derive(Clone, Debug)]
pub struct Report {
    pages: Vec<(String, PageRecord)>,
    pub standard: DiagnosticStandard,
}

impl Report {
    pub fn new(standard: DiagnosticStandard) -> Self {
        Self {
            pages: Vec::new(),
            standard,
        }
    }

    /// Append a completed record under its URL key. Pure bookkeeping.
    pub fn insert(&mut self, url: impl Into<String>, record: PageRecord) {
        let url = url.into();
        if let Some(entry) = self.pages.iter_mut().find(|(existing, _)| *existing == url) {
            entry.1 = record;
        } else {
            self.pages.push((url, record));
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = (&str, &PageRecord)> {
        self.pages.iter().map(|(url, record)| (url.as_str(), record))
    }

    pub fn get(&self, url: &str) -> Option<&PageRecord> {
        self.pages
            .iter()
            .find(|(existing, _)| existing == url)
            .map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Serialize for Report {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Report", 2)?;
        state.serialize_field("pages", &PagesByUrl(&self.pages))?;
        state.serialize_field("standard", &self.standard)?;
        state.end()
    }
}

/// Serializes the page list as a JSON object keyed by URL, preserving
/// visit order.
struct PagesByUrl<'a>(&'a [(String, PageRecord)]);

impl Serialize for PagesByUrl<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (url, record) in self.0 {
            map.serialize_entry(url, record)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> DiagnosticStandard {
        DiagnosticStandard {
            performance: PerformanceStandard { page_load_ms: 3000 },
            resource: ResourceStandard { image_max_kb: 5.0 },
        }
    }

    fn record_with_load(ms: u64) -> PageRecord {
        PageRecord {
            performance: PagePerformance {
                page_load_time_ms: ms,
            },
            ..Default::default()
        }
    }

    #[test]
    fn pages_serialize_in_visit_order() {
        let mut report = Report::new(standard());
        report.insert("https://b.example", record_with_load(1));
        report.insert("https://a.example", record_with_load(2));
        report.insert("https://c.example", record_with_load(3));

        let json = serde_json::to_string_pretty(&report).unwrap();
        let b = json.find("https://b.example").unwrap();
        let a = json.find("https://a.example").unwrap();
        let c = json.find("https://c.example").unwrap();
        assert!(b < a && a < c, "visit order must survive serialization");
    }

    #[test]
    fn repeat_visit_replaces_record_in_place() {
        let mut report = Report::new(standard());
        report.insert("https://a.example", record_with_load(100));
        report.insert("https://b.example", record_with_load(200));
        report.insert("https://a.example", record_with_load(999));

        assert_eq!(report.len(), 2);
        assert_eq!(
            report
                .get("https://a.example")
                .unwrap()
                .performance
                .page_load_time_ms,
            999
        );
        let first = report.pages().next().unwrap();
        assert_eq!(first.0, "https://a.example");
    }

    #[test]
    fn json_shape_matches_data_model() {
        let mut report = Report::new(standard());
        report.insert("https://a.example", PageRecord::default());

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
        let page = &value["pages"]["https://a.example"];
        assert!(page["performance"]["page_load_time_ms"].is_u64());
        assert!(page["console_issues"]["errors"].is_array());
        assert!(page["console_issues"]["warnings"].is_array());
        assert!(page["console_issues"]["deprecations"].is_array());
        assert!(page["api_issues"]["errors"].is_array());
        assert!(page["api_issues"]["timeouts"].is_array());
        assert!(page["api_issues"]["slow_responses_ms"].is_array());
        assert!(page["resource_issues"]["missing_or_404"].is_array());
        assert!(page["resource_issues"]["slow_resources_ms"].is_array());
        assert!(page["resource_issues"]["oversized_images"].is_array());
        assert_eq!(value["standard"]["performance"]["page_load_ms"], 3000);
        assert_eq!(value["standard"]["resource"]["image_max_kb"], 5.0);

        // Top-level key order is stable: pages before standard.
        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("\"pages\"").unwrap() < text.find("\"standard\"").unwrap());
    }

    #[test]
    fn resource_entry_uses_wire_field_names() {
        let entry = ResourceEntry {
            name: "https://a.example/app.js".to_string(),
            kind: "script".to_string(),
            duration: 2500,
            size: 1024,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "script");
        assert_eq!(value["duration"], 2500);
    }
}
