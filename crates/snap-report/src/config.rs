//! Report configuration
//!
//! Values come from any key-value [`ConfigSource`]; reading that source from a
//! properties file or the environment is the caller's business.

use std::collections::HashMap;
use std::path::PathBuf;

/// Keys looked up in a [`ConfigSource`]
pub mod keys {
    /// Report and document title
    pub const REPORT_NAME: &str = "test_report_name";
    /// Application under test
    pub const APPLICATION: &str = "application";
    /// Target URL
    pub const URL: &str = "url";
    /// Browser the suite runs in
    pub const BROWSER: &str = "browser";
    /// Who ran the suite
    pub const TESTED_BY: &str = "tested_by";
    /// Directory for report artifacts
    pub const REPORT_DIR: &str = "report_dir";
    /// Directory for screenshots
    pub const SCREENSHOT_DIR: &str = "screenshot_dir";
    /// Write a JSON summary next to the HTML report
    pub const JSON_SUMMARY: &str = "json_summary";
    /// Empty artifact directories at suite start
    pub const PREPARE_DIRS: &str = "prepare_dirs";
}

/// A key-value configuration source
pub trait ConfigSource {
    /// Look up a value
    fn value(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl ConfigSource for HashMap<&str, &str> {
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| (*v).to_string())
    }
}

/// Report configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Report and document title
    pub report_name: String,
    /// Application under test
    pub application: Option<String>,
    /// Target URL
    pub url: Option<String>,
    /// Browser used by the suite
    pub browser: Option<String>,
    /// Operator who ran the suite
    pub tested_by: Option<String>,
    /// Directory for `ExecutionReport_*.html`
    pub report_dir: PathBuf,
    /// Directory for `Screenshot_*.png`
    pub screenshot_dir: PathBuf,
    /// Also write `ExecutionReport_*.json`
    pub json_summary: bool,
    /// Empty both directories when the suite starts
    pub prepare_dirs: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_name: "Execution Report".to_string(),
            application: None,
            url: None,
            browser: None,
            tested_by: None,
            report_dir: PathBuf::from("Reports"),
            screenshot_dir: PathBuf::from("Screenshots"),
            json_summary: false,
            prepare_dirs: false,
        }
    }
}

impl ReportConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a key-value source, keeping defaults for
    /// missing keys
    #[must_use]
    pub fn from_source(source: &impl ConfigSource) -> Self {
        let defaults = Self::default();
        Self {
            report_name: source
                .value(keys::REPORT_NAME)
                .unwrap_or(defaults.report_name),
            application: source.value(keys::APPLICATION),
            url: source.value(keys::URL),
            browser: source.value(keys::BROWSER),
            tested_by: source.value(keys::TESTED_BY),
            report_dir: source
                .value(keys::REPORT_DIR)
                .map_or(defaults.report_dir, PathBuf::from),
            screenshot_dir: source
                .value(keys::SCREENSHOT_DIR)
                .map_or(defaults.screenshot_dir, PathBuf::from),
            json_summary: flag(source, keys::JSON_SUMMARY, defaults.json_summary),
            prepare_dirs: flag(source, keys::PREPARE_DIRS, defaults.prepare_dirs),
        }
    }

    /// Set report name
    #[must_use]
    pub fn with_report_name(mut self, name: impl Into<String>) -> Self {
        self.report_name = name.into();
        self
    }

    /// Set application name
    #[must_use]
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    /// Set target URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set browser
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    /// Set operator
    #[must_use]
    pub fn with_tested_by(mut self, who: impl Into<String>) -> Self {
        self.tested_by = Some(who.into());
        self
    }

    /// Set report directory
    #[must_use]
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Set screenshot directory
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    /// Enable the JSON summary
    #[must_use]
    pub const fn with_json_summary(mut self, enabled: bool) -> Self {
        self.json_summary = enabled;
        self
    }

    /// Empty artifact directories at suite start
    #[must_use]
    pub const fn with_prepare_dirs(mut self, enabled: bool) -> Self {
        self.prepare_dirs = enabled;
        self
    }

    /// Metadata rows shown at the top of the report, in display order.
    /// Unset values are left out.
    #[must_use]
    pub fn system_info(&self) -> Vec<(String, String)> {
        let configured = [
            ("Application", &self.application),
            ("Application URL", &self.url),
            ("Browser", &self.browser),
            ("Tested By", &self.tested_by),
        ];
        let mut rows: Vec<(String, String)> = configured
            .into_iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
            .collect();
        rows.push((
            "Operating System".to_string(),
            std::env::consts::OS.to_string(),
        ));
        rows.push((
            "Runtime Version".to_string(),
            format!("snap-report {}", env!("CARGO_PKG_VERSION")),
        ));
        rows
    }
}

fn flag(source: &impl ConfigSource, key: &str, default: bool) -> bool {
    match source.value(key) {
        None => default,
        Some(v) if v.trim().eq_ignore_ascii_case("true") => true,
        Some(v) if v.trim().eq_ignore_ascii_case("false") => false,
        Some(v) => {
            tracing::warn!("Ignoring {key}={v:?}: expected true or false");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert_eq!(config.report_dir, PathBuf::from("Reports"));
        assert_eq!(config.screenshot_dir, PathBuf::from("Screenshots"));
        assert!(!config.json_summary);
        assert!(config.application.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ReportConfig::new()
            .with_report_name("Nexus Regression")
            .with_application("Nexus")
            .with_browser("chrome")
            .with_json_summary(true);
        assert_eq!(config.report_name, "Nexus Regression");
        assert_eq!(config.application.as_deref(), Some("Nexus"));
        assert_eq!(config.browser.as_deref(), Some("chrome"));
        assert!(config.json_summary);
    }

    #[test]
    fn test_from_source() {
        let source: HashMap<&str, &str> = [
            ("test_report_name", "Nexus Suite"),
            ("application", "Nexus"),
            ("url", "https://nexus.example.com"),
            ("tested_by", "QA"),
            ("report_dir", "out/reports"),
            ("json_summary", "TRUE"),
        ]
        .into_iter()
        .collect();

        let config = ReportConfig::from_source(&source);
        assert_eq!(config.report_name, "Nexus Suite");
        assert_eq!(config.url.as_deref(), Some("https://nexus.example.com"));
        assert_eq!(config.report_dir, PathBuf::from("out/reports"));
        assert_eq!(config.screenshot_dir, PathBuf::from("Screenshots"));
        assert!(config.json_summary);
        assert!(config.browser.is_none());
    }

    #[test]
    fn test_bad_flag_keeps_default() {
        let source: HashMap<String, String> =
            [("prepare_dirs".to_string(), "yes please".to_string())]
                .into_iter()
                .collect();
        let config = ReportConfig::from_source(&source);
        assert!(!config.prepare_dirs);
    }

    #[test]
    fn test_system_info_order_and_omissions() {
        let config = ReportConfig::new()
            .with_application("Nexus")
            .with_tested_by("QA");
        let keys: Vec<_> = config.system_info().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                "Application",
                "Tested By",
                "Operating System",
                "Runtime Version"
            ]
        );
    }
}
