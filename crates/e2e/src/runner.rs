//! Main test runner that orchestrates the site probe, Playwright sessions
//! and price verification

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::expect::{expect_eventually, Expectation};
use crate::observer::VerificationObserver;
use crate::playwright::{PlaywrightConfig, PlaywrightSession};
use crate::site::{self, SiteConfig};
use crate::sort::{SortDirection, SortMismatch};
use crate::spec::{AttributeAssertion, TestSpec, TestStep};
use crate::verifier::{PriceSortVerifier, SortVerdict};

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_mismatch: Option<SortMismatch>,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            skipped: 0,
            duration_ms,
            results,
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub site: SiteConfig,
    pub playwright: PlaywrightConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            playwright: PlaywrightConfig::default(),
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Artifacts a successful step may leave behind
#[derive(Debug, Default)]
struct StepArtifacts {
    screenshot_path: Option<PathBuf>,
    sort_mismatch: Option<SortMismatch>,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    verifier: PriceSortVerifier,
    site_checked: bool,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            verifier: PriceSortVerifier::default(),
            site_checked: false,
        }
    }

    /// Route price verification events to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn VerificationObserver>) -> Self {
        self.verifier = PriceSortVerifier::new(observer);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Make sure the storefront answers before any browser is launched
    pub async fn probe_site(&mut self) -> E2eResult<()> {
        if self.site_checked || !self.config.site.probe {
            return Ok(());
        }

        site::wait_until_reachable(&self.config.site).await?;
        self.site_checked = true;
        Ok(())
    }

    /// Run all tests in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific test by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;

        self.run_specs(std::slice::from_ref(&spec)).await
    }

    /// Run a list of test specs
    pub async fn run_specs(&mut self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(specs.len());

        self.probe_site().await?;

        info!("Running {} test(s)...", specs.len());

        for spec in specs {
            let result = match self.run_spec(spec).await {
                Ok(result) => result,
                Err(e) => TestResult {
                    name: spec.name.clone(),
                    success: false,
                    duration_ms: 0,
                    steps: vec![],
                    error: Some(e.to_string()),
                },
            };

            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
            }
            results.push(result);
        }

        let suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run a single test spec in a fresh browser session
    pub async fn run_spec(&self, spec: &TestSpec) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let viewport = spec.viewport.unwrap_or(self.config.playwright.viewport);
        let session =
            PlaywrightSession::launch(&self.config.playwright, &self.config.site.base_url, viewport).await?;

        let mut step_results = Vec::with_capacity(spec.steps.len());
        let mut test_error: Option<String> = None;

        for step in &spec.steps {
            let result = self.execute_step(&session, step).await;

            if !result.success {
                test_error = result.error.clone();
                step_results.push(result);
                break; // Stop on first failure
            }

            step_results.push(result);
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close browser for {}: {}", spec.name, e);
        }

        Ok(TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps: step_results,
            error: test_error,
        })
    }

    /// Execute one step, folding errors into the step result
    async fn execute_step(&self, session: &PlaywrightSession, step: &TestStep) -> StepResult {
        let start = Instant::now();
        let step_name = step.name();

        debug!("Executing step: {}", step_name);

        let outcome = self.run_step(session, step).await;
        step_result(step_name, start.elapsed().as_millis() as u64, outcome)
    }

    async fn run_step(&self, session: &PlaywrightSession, step: &TestStep) -> E2eResult<StepArtifacts> {
        match step {
            TestStep::Navigate { url, wait_until, max_status } => {
                let status = session.goto(url, *wait_until).await?;
                if let (Some(status), Some(max)) = (status, max_status) {
                    if status >= *max {
                        return Err(E2eError::StepFailed {
                            step: step.name(),
                            reason: format!("response status {} (expected below {})", status, max),
                        });
                    }
                }
            }
            TestStep::Click { selector, timeout_ms } => {
                session.locator(selector.as_str()).click(*timeout_ms).await?;
            }
            TestStep::Fill { selector, value } => {
                session.fill(selector, value).await?;
            }
            TestStep::Press { selector, key } => {
                session.press(selector.as_deref(), key).await?;
            }
            TestStep::WaitForLoadState { state } => {
                session.wait_for_load_state(*state).await?;
            }
            TestStep::GoBack { wait_until } => {
                session.go_back(*wait_until).await?;
            }
            TestStep::Assert {
                selector,
                visible,
                enabled,
                text,
                text_contains,
                attribute,
                count,
                min_count,
                timeout_ms,
            } => {
                let wait = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| session.expect_timeout());
                let expectations = element_expectations(
                    selector,
                    *visible,
                    *enabled,
                    text.as_deref(),
                    text_contains.as_deref(),
                    attribute.as_ref(),
                    *count,
                    *min_count,
                );
                for expectation in &expectations {
                    expect_eventually(session, expectation, wait).await?;
                }
            }
            TestStep::AssertTitle { title } => {
                let expectation = Expectation::Title(title.clone());
                expect_eventually(session, &expectation, session.expect_timeout()).await?;
            }
            TestStep::AssertUrl { pattern } => {
                let expectation = Expectation::Url(Regex::new(pattern)?);
                expect_eventually(session, &expectation, session.expect_timeout()).await?;
            }
            TestStep::AssertNoConsoleErrors { ignore } => {
                let critical = critical_errors(session.console_errors().await?, ignore);
                if !critical.is_empty() {
                    return Err(E2eError::AssertionFailed(format!(
                        "{} console error(s): {}",
                        critical.len(),
                        critical.join(" | ")
                    )));
                }
                info!("No critical console errors found");
            }
            TestStep::DismissIfPresent { selector, timeout_ms } => {
                match session.try_acquire(selector, Duration::from_millis(*timeout_ms)).await? {
                    Some(element) => {
                        info!("{} found, closing it", selector);
                        element.click(None).await?;
                    }
                    None => info!("{} not present, continuing", selector),
                }
            }
            TestStep::Screenshot { name, full_page } => {
                let path = session.screenshot(name, *full_page).await?;
                return Ok(StepArtifacts {
                    screenshot_path: Some(path),
                    sort_mismatch: None,
                });
            }
            TestStep::VerifyPriceSort { selector, direction, failure_screenshot } => {
                return self
                    .verify_price_sort(session, selector, *direction, failure_screenshot.as_deref())
                    .await;
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", message);
            }
        }

        Ok(StepArtifacts::default())
    }

    async fn verify_price_sort(
        &self,
        session: &PlaywrightSession,
        selector: &str,
        direction: SortDirection,
        failure_screenshot: Option<&str>,
    ) -> E2eResult<StepArtifacts> {
        info!("Verifying prices are sorted from {}", direction);

        let elements = session.locator(selector).all().await?;
        if elements.is_empty() {
            warn!("No elements match {}", selector);
        }

        match self.verifier.check(&elements, direction).await? {
            SortVerdict::Sorted(_) => Ok(StepArtifacts::default()),
            SortVerdict::Mismatch(mismatch) => {
                let base = failure_screenshot_base(failure_screenshot, direction);
                let name = artifact_name(&base, Utc::now());

                let screenshot_path = match session.screenshot(&name, true).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("Could not capture failure screenshot {}: {}", name, e);
                        None
                    }
                };

                Ok(StepArtifacts {
                    screenshot_path,
                    sort_mismatch: Some(mismatch),
                })
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a step outcome into its reported result. A sort mismatch fails the
/// step even though the step itself ran to completion.
fn step_result(step_name: String, duration_ms: u64, outcome: E2eResult<StepArtifacts>) -> StepResult {
    match outcome {
        Ok(artifacts) => StepResult {
            success: artifacts.sort_mismatch.is_none(),
            step_name,
            duration_ms,
            error: artifacts.sort_mismatch.as_ref().map(|m| m.to_string()),
            screenshot_path: artifacts.screenshot_path,
            sort_mismatch: artifacts.sort_mismatch,
        },
        Err(e) => StepResult {
            success: false,
            step_name,
            duration_ms,
            error: Some(e.to_string()),
            screenshot_path: None,
            sort_mismatch: None,
        },
    }
}

/// Screenshot base name for a failed sort check
fn failure_screenshot_base(custom: Option<&str>, direction: SortDirection) -> String {
    custom
        .map(String::from)
        .unwrap_or_else(|| format!("price-sorting-{}-failed", direction.slug()))
}

/// `<base>-<ISO-8601 timestamp>` with colons swapped for dashes so the name
/// is a valid file name everywhere
pub fn artifact_name(base: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        base,
        at.to_rfc3339_opts(SecondsFormat::Millis, true).replace(':', "-")
    )
}

/// Console errors not matching any ignored substring
fn critical_errors(errors: Vec<String>, ignore: &[String]) -> Vec<String> {
    errors
        .into_iter()
        .filter(|e| !ignore.iter().any(|i| e.contains(i.as_str())))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn element_expectations(
    selector: &str,
    visible: Option<bool>,
    enabled: Option<bool>,
    text: Option<&str>,
    text_contains: Option<&str>,
    attribute: Option<&AttributeAssertion>,
    count: Option<usize>,
    min_count: Option<usize>,
) -> Vec<Expectation> {
    let selector = selector.to_string();
    let mut expectations = Vec::new();

    if let Some(visible) = visible {
        expectations.push(Expectation::Visible { selector: selector.clone(), visible });
    }
    if let Some(enabled) = enabled {
        expectations.push(Expectation::Enabled { selector: selector.clone(), enabled });
    }
    if let Some(text) = text {
        expectations.push(Expectation::Text { selector: selector.clone(), text: text.to_string() });
    }
    if let Some(text) = text_contains {
        expectations.push(Expectation::TextContains { selector: selector.clone(), text: text.to_string() });
    }
    if let Some(attr) = attribute {
        expectations.push(Expectation::Attribute {
            selector: selector.clone(),
            name: attr.name.clone(),
            value: attr.value.clone(),
            contains: attr.contains.clone(),
        });
    }
    if let Some(count) = count {
        expectations.push(Expectation::Count { selector: selector.clone(), count });
    }
    if let Some(min) = min_count {
        expectations.push(Expectation::MinCount { selector, min });
    }

    expectations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::Price;
    use crate::sort::{verify, PriceList};
    use chrono::TimeZone;

    fn mismatch(values: &[f64], direction: SortDirection) -> SortMismatch {
        let prices: PriceList = values.iter().map(|v| Price::new(*v).unwrap()).collect();
        verify(&prices, direction).unwrap_err()
    }

    fn failed_sort_step() -> StepResult {
        let mismatch = mismatch(&[30.0, 10.0, 20.0], SortDirection::HighToLow);
        step_result(
            "verify_price_sort:high_to_low".to_string(),
            12,
            Ok(StepArtifacts {
                screenshot_path: Some(PathBuf::from("shots/price-sorting-high-to-low-failed.png")),
                sort_mismatch: Some(mismatch),
            }),
        )
    }

    #[test]
    fn test_artifact_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            artifact_name("price-sorting-high-to-low-failed", at),
            "price-sorting-high-to-low-failed-2024-03-09T14-05-07.000Z"
        );
    }

    #[test]
    fn test_failure_screenshot_base() {
        assert_eq!(
            failure_screenshot_base(None, SortDirection::HighToLow),
            "price-sorting-high-to-low-failed"
        );
        assert_eq!(
            failure_screenshot_base(None, SortDirection::LowToHigh),
            "price-sorting-low-to-high-failed"
        );
        assert_eq!(
            failure_screenshot_base(Some("sale-listing"), SortDirection::LowToHigh),
            "sale-listing"
        );
    }

    #[test]
    fn test_sort_mismatch_fails_step() {
        let result = failed_sort_step();
        let expected = mismatch(&[30.0, 10.0, 20.0], SortDirection::HighToLow);

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(expected.to_string().as_str()));
        assert_eq!(result.sort_mismatch.as_ref(), Some(&expected));
        assert_eq!(
            result.sort_mismatch.unwrap().expected.values(),
            vec![30.0, 20.0, 10.0]
        );
        assert_eq!(
            result.screenshot_path,
            Some(PathBuf::from("shots/price-sorting-high-to-low-failed.png"))
        );
    }

    #[test]
    fn test_step_outcomes() {
        let ok = step_result("log".to_string(), 1, Ok(StepArtifacts::default()));
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert!(ok.sort_mismatch.is_none());

        let err = step_result(
            "click:button".to_string(),
            1,
            Err(E2eError::Timeout("button".to_string())),
        );
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("Timeout waiting for: button"));
        assert!(err.sort_mismatch.is_none());
    }

    #[test]
    fn test_critical_errors_ignores_noise() {
        let errors = vec![
            "Failed to load resource: 404".to_string(),
            "GET /favicon.ico failed".to_string(),
            "TypeError: cart is undefined".to_string(),
        ];
        let ignore = vec!["404".to_string(), "favicon".to_string()];
        assert_eq!(critical_errors(errors, &ignore), vec!["TypeError: cart is undefined"]);
    }

    #[test]
    fn test_element_expectations_order() {
        let expectations = element_expectations(
            "button[aria-label=\"Add to cart\"]",
            Some(true),
            Some(true),
            None,
            None,
            None,
            None,
            Some(1),
        );
        assert_eq!(expectations.len(), 3);
        assert!(matches!(expectations[0], Expectation::Visible { visible: true, .. }));
        assert!(matches!(expectations[1], Expectation::Enabled { enabled: true, .. }));
        assert!(matches!(expectations[2], Expectation::MinCount { min: 1, .. }));
    }

    #[test]
    fn test_suite_result_counts() {
        let result = |name: &str, success: bool| TestResult {
            name: name.to_string(),
            success,
            duration_ms: 1,
            steps: vec![],
            error: None,
        };
        let suite = TestSuiteResult::from_results(vec![result("a", true), result("b", false), result("c", true)], 9);
        assert_eq!((suite.total, suite.passed, suite.failed), (3, 2, 1));
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TestRunner::with_config(RunnerConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        });
        let path = runner.write_results(&TestSuiteResult::default()).unwrap();
        let written: TestSuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.total, 0);
    }

    #[test]
    fn test_write_results_keeps_sort_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TestRunner::with_config(RunnerConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        });

        let step = failed_sort_step();
        let suite = TestSuiteResult::from_results(
            vec![TestResult {
                name: "price-sort-high-to-low".to_string(),
                success: false,
                duration_ms: 12,
                error: step.error.clone(),
                steps: vec![step.clone()],
            }],
            12,
        );

        let path = runner.write_results(&suite).unwrap();
        let written: TestSuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(written.failed, 1);
        let written_step = &written.results[0].steps[0];
        assert!(!written_step.success);
        assert_eq!(written_step.error, step.error);
        assert_eq!(written_step.sort_mismatch, step.sort_mismatch);
        assert_eq!(written_step.screenshot_path, step.screenshot_path);
    }
}
