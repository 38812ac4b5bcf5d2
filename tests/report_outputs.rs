//! End-to-end report output checks: a hand-built report must round-trip
//! through the writer with the JSON and HTML renditions agreeing.

use std::fs;

use smartdiag_cli::report::{
    ApiError, ConsoleIssues, DiagnosticStandard, OversizedImage, PagePerformance, PageRecord,
    PerformanceStandard, Report, ResourceStandard,
};
use smartdiag_cli::writer::write_reports;

fn sample_report() -> Report {
    let mut report = Report::new(DiagnosticStandard {
        performance: PerformanceStandard { page_load_ms: 3000 },
        resource: ResourceStandard { image_max_kb: 5.0 },
    });

    let mut slow_page = PageRecord {
        performance: PagePerformance {
            page_load_time_ms: 4100,
        },
        console_issues: ConsoleIssues {
            errors: vec![
                "Uncaught ReferenceError: track is not defined".to_string(),
                "Failed to load resource: the server responded with a status of 500".to_string(),
            ],
            warnings: vec!["third-party cookie will be blocked".to_string()],
            deprecations: vec!["Synchronous XMLHttpRequest is deprecated".to_string()],
        },
        ..Default::default()
    };
    slow_page.api_issues.errors.push(ApiError {
        url: "https://api.example/v1/profile".to_string(),
        status: 500,
        method: "POST".to_string(),
    });
    slow_page
        .resource_issues
        .oversized_images
        .push(OversizedImage {
            url: "https://cdn.example/banner.jpg".to_string(),
            size_kb: 11.4,
        });
    report.insert("https://slow.example", slow_page);

    report.insert(
        "https://fast.example",
        PageRecord {
            performance: PagePerformance {
                page_load_time_ms: 900,
            },
            ..Default::default()
        },
    );

    report
}

#[test]
fn json_and_html_outputs_agree() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("reports/smart_report.json");
    let html_path = dir.path().join("reports/smart_report.html");

    let report = sample_report();
    write_reports(&report, &json_path, &html_path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let html = fs::read_to_string(&html_path).unwrap();

    // HTML console error count equals the JSON listing length.
    let json_errors = value["pages"]["https://slow.example"]["console_issues"]["errors"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(json_errors, 2);
    assert!(html.contains(&format!(r#"Errors: <span class="error">{json_errors}</span>"#)));

    // The slow page fails the load standard, the fast one passes.
    assert!(html.contains(r#"<span class="error">FAIL</span>"#));
    assert!(html.contains(r#"<span class="ok">PASS</span>"#));

    // Both renditions carry the oversized image and the standard it broke.
    assert_eq!(
        value["pages"]["https://slow.example"]["resource_issues"]["oversized_images"][0]["size_kb"],
        11.4
    );
    assert!(html.contains("banner.jpg"));
    assert!(html.contains("(Max 5.0 KB)"));

    // Visit order is preserved in both outputs.
    let json_text = fs::read_to_string(&json_path).unwrap();
    assert!(json_text.find("slow.example").unwrap() < json_text.find("fast.example").unwrap());
    assert!(html.find("slow.example").unwrap() < html.find("fast.example").unwrap());
}
