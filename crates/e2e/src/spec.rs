//! Declarative YAML test specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::sort::SortDirection;

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to the site base URL)
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: Option<LoadState>,
        /// Fail when the response status is at or above this value
        #[serde(default)]
        max_status: Option<u16>,
    },

    /// Click an element
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field
    Fill {
        selector: String,
        value: String,
    },

    /// Press a key, on an element or the page
    Press {
        #[serde(default)]
        selector: Option<String>,
        key: String,
    },

    /// Wait for the page to reach a load state
    WaitForLoadState {
        #[serde(default)]
        state: LoadState,
    },

    /// Go back in history
    GoBack {
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    /// Assert something about an element, retried until the timeout
    Assert {
        selector: String,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        min_count: Option<usize>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert the document title
    AssertTitle {
        title: String,
    },

    /// Assert the current URL matches a regex
    AssertUrl {
        pattern: String,
    },

    /// Fail if the page logged console errors, ignoring matching substrings
    AssertNoConsoleErrors {
        #[serde(default)]
        ignore: Vec<String>,
    },

    /// Click an element only if it shows up within the timeout
    DismissIfPresent {
        selector: String,
        #[serde(default = "default_dismiss_timeout")]
        timeout_ms: u64,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Check that the prices matched by `selector` are sorted
    VerifyPriceSort {
        selector: String,
        direction: SortDirection,
        /// Base name of the screenshot captured on mismatch
        #[serde(default)]
        failure_screenshot: Option<String>,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_dismiss_timeout() -> u64 {
    3000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    #[default]
    NetworkIdle,
}

impl LoadState {
    /// Name understood by Playwright's `waitForLoadState`
    pub fn as_playwright(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { selector, .. } => format!("click:{}", selector),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Press { key, .. } => format!("press:{}", key),
            TestStep::WaitForLoadState { state } => format!("wait_for_load_state:{}", state.as_playwright()),
            TestStep::GoBack { .. } => "go_back".to_string(),
            TestStep::Assert { selector, .. } => format!("assert:{}", selector),
            TestStep::AssertTitle { title } => format!("assert_title:{}", title),
            TestStep::AssertUrl { pattern } => format!("assert_url:{}", pattern),
            TestStep::AssertNoConsoleErrors { .. } => "assert_no_console_errors".to_string(),
            TestStep::DismissIfPresent { selector, .. } => format!("dismiss_if_present:{}", selector),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::VerifyPriceSort { direction, .. } => format!("verify_price_sort:{}", direction.slug()),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: TestSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Reject specs that would only fail at run time
    fn validate(&self) -> E2eResult<()> {
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: no steps", self.name)));
        }

        for step in &self.steps {
            if let TestStep::AssertUrl { pattern } = step {
                regex::Regex::new(pattern)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regression_spec() {
        let yaml = r#"
name: price-sort-high-to-low
description: Listing sorted by price descending
tags:
  - regression
steps:
  - action: navigate
    url: /
  - action: click
    selector: 'a:has-text("Price: High to low")'
  - action: wait_for_load_state
  - action: verify_price_sort
    selector: p.text-white
    direction: high_to_low
    failure_screenshot: price-sorting-high-to-low-failed
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "price-sort-high-to-low");
        assert_eq!(spec.steps.len(), 4);
        assert!(spec.viewport.is_none());

        match &spec.steps[2] {
            TestStep::WaitForLoadState { state } => assert_eq!(*state, LoadState::NetworkIdle),
            other => panic!("unexpected step {:?}", other),
        }
        match &spec.steps[3] {
            TestStep::VerifyPriceSort { selector, direction, failure_screenshot } => {
                assert_eq!(selector, "p.text-white");
                assert_eq!(*direction, SortDirection::HighToLow);
                assert_eq!(failure_screenshot.as_deref(), Some("price-sorting-high-to-low-failed"));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_assertions_and_toast() {
        let yaml = r#"
name: add-to-cart
viewport:
  width: 1920
  height: 1080
steps:
  - action: assert
    selector: 'button[aria-label="Add to cart"]'
    visible: true
    enabled: true
  - action: dismiss_if_present
    selector: 'button[aria-label="Close toast"]'
  - action: assert_url
    pattern: '.*/shirts'
  - action: screenshot
    name: checkout
    full_page: true
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.viewport, Some(Viewport { width: 1920, height: 1080 }));
        match &spec.steps[1] {
            TestStep::DismissIfPresent { timeout_ms, .. } => assert_eq!(*timeout_ms, 3000),
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(spec.steps[3].name(), "screenshot:checkout");
    }

    #[test]
    fn test_rejects_bad_url_pattern() {
        let yaml = r#"
name: broken
steps:
  - action: assert_url
    pattern: '(unclosed'
"#;
        assert!(matches!(TestSpec::from_yaml(yaml), Err(E2eError::Regex(_))));
    }

    #[test]
    fn test_rejects_empty_steps() {
        let yaml = "name: empty\nsteps: []\n";
        assert!(matches!(TestSpec::from_yaml(yaml), Err(E2eError::SpecParse(_))));
    }

    #[test]
    fn test_filter_by_tag() {
        let specs = vec![
            TestSpec::from_yaml("name: a\ntags: [smoke]\nsteps:\n  - action: log\n    message: hi\n").unwrap(),
            TestSpec::from_yaml("name: b\ntags: [regression]\nsteps:\n  - action: log\n    message: hi\n").unwrap(),
        ];
        let smoke = TestSpec::filter_by_tag(&specs, "smoke");
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].name, "a");
    }
}
