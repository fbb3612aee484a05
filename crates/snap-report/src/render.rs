//! Report rendering
//!
//! Turns a [`SuiteSnapshot`] into the self-contained HTML artifact (and the
//! optional JSON summary). Layout is deliberately plain: a metadata table, a
//! summary line, then one section per test with its records in order.

use crate::entry::{Attachment, LogLevel, TestEntry, TestStatus};
use crate::result::ReportResult;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

/// Timestamp layout used inside the report
pub const DISPLAY_TIME_FORMAT: &str = "%d-%b-%Y %I:%M:%S %p";

/// Point-in-time copy of a suite, detached from its locks
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSnapshot {
    /// Report title
    pub title: String,
    /// Artifact path
    pub path: PathBuf,
    /// When the suite report was created
    pub created_at: DateTime<Local>,
    /// Metadata rows in display order
    pub system_info: Vec<(String, String)>,
    /// Test entries in creation order
    pub tests: Vec<TestEntry>,
}

impl SuiteSnapshot {
    fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status == status).count()
    }

    /// Number of passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Number of failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Number of skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Number of tests without an outcome
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.count(TestStatus::Pending)
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} tests, {} passed, {} failed, {} skipped",
            self.title,
            self.tests.len(),
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        )
    }
}

/// Escape HTML special characters
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "pass",
        TestStatus::Failed => "fail",
        TestStatus::Skipped => "skip",
        TestStatus::Pending => "pending",
    }
}

const fn level_class(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Pass => "pass",
        LogLevel::Fail => "fail",
        LogLevel::Skip => "skip",
        LogLevel::Warning => "warning",
    }
}

/// Render the HTML report
#[must_use]
pub fn render_html(suite: &SuiteSnapshot) -> String {
    let title = escape_html(&suite.title);
    let mut html = String::new();

    html.push_str(&format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 20px; }}
        .summary {{ background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }}
        table.info td {{ padding: 2px 12px 2px 0; }}
        .test {{ padding: 10px; margin: 10px 0; border-radius: 4px; }}
        .test.pass {{ background: #e8f5e9; border-left: 4px solid #4caf50; }}
        .test.fail {{ background: #ffebee; border-left: 4px solid #f44336; }}
        .test.skip, .test.pending {{ background: #fff3e0; border-left: 4px solid #ff9800; }}
        .record {{ font-family: monospace; margin: 4px 0; }}
        .level {{ font-weight: bold; display: inline-block; min-width: 70px; }}
        .level.fail {{ color: #d32f2f; }}
        .level.pass {{ color: #388e3c; }}
        .level.warning, .level.skip {{ color: #f57c00; }}
        .record img {{ max-width: 600px; border: 1px solid #ddd; display: block; margin-top: 4px; }}
    </style>
</head>
<body>
"#
    ));

    html.push_str(&format!(
        "<div class=\"summary\">\n    <h1>{title}</h1>\n    <p>Created: {}</p>\n    \
         <table class=\"info\">\n",
        suite.created_at.format(DISPLAY_TIME_FORMAT)
    ));
    for (key, value) in &suite.system_info {
        html.push_str(&format!(
            "        <tr><td><strong>{}</strong></td><td>{}</td></tr>\n",
            escape_html(key),
            escape_html(value)
        ));
    }
    html.push_str("    </table>\n");
    html.push_str(&format!(
        "    <h2>{} tests: {} passed, {} failed, {} skipped</h2>\n</div>\n",
        suite.tests.len(),
        suite.passed_count(),
        suite.failed_count(),
        suite.skipped_count()
    ));

    for test in &suite.tests {
        html.push_str(&format!(
            "<div class=\"test {}\">\n    <h3>{} - {:?}</h3>\n    <p>Worker: {}</p>\n",
            status_class(test.status),
            escape_html(&test.name),
            test.status,
            escape_html(test.worker.as_str())
        ));
        for record in &test.records {
            html.push_str(&format!(
                "    <div class=\"record\"><span class=\"level {}\">{}</span> \
                 <span class=\"time\">{}</span> {}",
                level_class(record.level),
                record.level.label(),
                record.timestamp.format(DISPLAY_TIME_FORMAT),
                record.message
            ));
            if let Some(attachment) = &record.attachment {
                html.push_str(&render_attachment(attachment));
            }
            html.push_str("</div>\n");
        }
        html.push_str("</div>\n");
    }

    html.push_str(
        r#"
<footer>
    <p>Generated by snap-report</p>
</footer>
</body>
</html>
"#,
    );

    html
}

fn render_attachment(attachment: &Attachment) -> String {
    match attachment {
        Attachment::Image {
            mime_type,
            base64,
            path,
        } => {
            let alt = path
                .as_ref()
                .and_then(|p| p.file_name())
                .map_or_else(|| "screenshot".to_string(), |n| n.to_string_lossy().into_owned());
            format!(
                r#"<img alt="{}" src="data:{};base64,{}">"#,
                escape_html(&alt),
                escape_html(mime_type),
                base64
            )
        }
        Attachment::Text(text) => format!("<pre>{}</pre>", escape_html(text)),
        Attachment::Html(fragment) => format!("<div>{fragment}</div>"),
    }
}

/// Render the JSON summary
///
/// # Errors
///
/// Returns error if serialization fails
pub fn render_json(suite: &SuiteSnapshot) -> ReportResult<String> {
    Ok(serde_json::to_string_pretty(suite)?)
}
