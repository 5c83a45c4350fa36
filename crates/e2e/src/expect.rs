//! Retrying assertions against the live page

use std::time::{Duration, Instant};

use regex::Regex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightSession;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A condition on the page that should eventually hold
#[derive(Debug, Clone)]
pub enum Expectation {
    Visible { selector: String, visible: bool },
    Enabled { selector: String, enabled: bool },
    Text { selector: String, text: String },
    TextContains { selector: String, text: String },
    Attribute {
        selector: String,
        name: String,
        value: Option<String>,
        contains: Option<String>,
    },
    Count { selector: String, count: usize },
    MinCount { selector: String, min: usize },
    Title(String),
    Url(Regex),
}

impl Expectation {
    /// `Ok(None)` when satisfied, otherwise what was observed instead.
    async fn observe(&self, session: &PlaywrightSession) -> E2eResult<Option<String>> {
        let mismatch = match self {
            Expectation::Visible { selector, visible } => {
                let actual = session.locator(selector.as_str()).is_visible().await?;
                (actual != *visible).then(|| format!("visible={}", actual))
            }
            Expectation::Enabled { selector, enabled } => {
                let actual = session.locator(selector.as_str()).is_enabled().await?;
                (actual != *enabled).then(|| format!("enabled={}", actual))
            }
            Expectation::Text { selector, text } => {
                let actual = normalize_text(&session.locator(selector.as_str()).text_content().await?);
                (actual != normalize_text(&Some(text.clone()))).then(|| format!("text {:?}", actual))
            }
            Expectation::TextContains { selector, text } => {
                let actual = normalize_text(&session.locator(selector.as_str()).text_content().await?);
                (!actual.contains(text.as_str())).then(|| format!("text {:?}", actual))
            }
            Expectation::Attribute { selector, name, value, contains } => {
                let actual = session.locator(selector.as_str()).get_attribute(name).await?;
                (!attribute_matches(actual.as_deref(), value.as_deref(), contains.as_deref()))
                    .then(|| format!("{}={:?}", name, actual))
            }
            Expectation::Count { selector, count } => {
                let actual = session.locator(selector.as_str()).count().await?;
                (actual != *count).then(|| format!("count={}", actual))
            }
            Expectation::MinCount { selector, min } => {
                let actual = session.locator(selector.as_str()).count().await?;
                (actual < *min).then(|| format!("count={}", actual))
            }
            Expectation::Title(title) => {
                let actual = session.title().await?;
                (actual != *title).then(|| format!("title {:?}", actual))
            }
            Expectation::Url(pattern) => {
                let actual = session.url().await?;
                (!pattern.is_match(&actual)).then(|| format!("url {}", actual))
            }
        };
        Ok(mismatch)
    }

    pub fn describe(&self) -> String {
        match self {
            Expectation::Visible { selector, visible: true } => format!("{} to be visible", selector),
            Expectation::Visible { selector, visible: false } => format!("{} to be hidden", selector),
            Expectation::Enabled { selector, enabled: true } => format!("{} to be enabled", selector),
            Expectation::Enabled { selector, enabled: false } => format!("{} to be disabled", selector),
            Expectation::Text { selector, text } => format!("{} to have text {:?}", selector, text),
            Expectation::TextContains { selector, text } => format!("{} to contain text {:?}", selector, text),
            Expectation::Attribute { selector, name, value, contains } => match (value, contains) {
                (Some(v), _) => format!("{} to have {}={:?}", selector, name, v),
                (None, Some(c)) => format!("{} to have {} containing {:?}", selector, name, c),
                (None, None) => format!("{} to have attribute {}", selector, name),
            },
            Expectation::Count { selector, count } => format!("{} to match {} element(s)", selector, count),
            Expectation::MinCount { selector, min } => format!("{} to match at least {} element(s)", selector, min),
            Expectation::Title(title) => format!("title {:?}", title),
            Expectation::Url(pattern) => format!("url matching {}", pattern),
        }
    }
}

/// Re-check `expectation` until it holds or `wait` elapses.
///
/// Driver errors such as a missing element count as "not yet"; a dead driver
/// or a round-trip timeout fails immediately.
pub async fn expect_eventually(
    session: &PlaywrightSession,
    expectation: &Expectation,
    wait: Duration,
) -> E2eResult<()> {
    let start = Instant::now();

    loop {
        let last = match expectation.observe(session).await {
            Ok(None) => return Ok(()),
            Ok(Some(actual)) => actual,
            Err(e @ (E2eError::DriverExited | E2eError::Timeout(_) | E2eError::Io(_))) => return Err(e),
            Err(e) => e.to_string(),
        };

        if start.elapsed() >= wait {
            return Err(E2eError::AssertionFailed(format!(
                "expected {}, got {} after {} ms",
                expectation.describe(),
                last,
                wait.as_millis()
            )));
        }

        debug!("Waiting for {} ({})", expectation.describe(), last);
        sleep(POLL_INTERVAL).await;
    }
}

/// Collapse runs of whitespace the way Playwright's text matchers do
pub fn normalize_text(text: &Option<String>) -> String {
    text.as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn attribute_matches(actual: Option<&str>, value: Option<&str>, contains: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    value.map_or(true, |v| actual == v) && contains.map_or(true, |c| actual.contains(c))
}
