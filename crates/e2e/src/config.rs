//! Runner configuration loading
//!
//! Precedence, lowest first: built-in defaults, an optional TOML file,
//! `ACME_E2E_*` environment variables, then whatever the caller sets from
//! command-line flags.

use std::path::Path;

use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::runner::RunnerConfig;

pub const ENV_BASE_URL: &str = "ACME_E2E_BASE_URL";
pub const ENV_BROWSER: &str = "ACME_E2E_BROWSER";
pub const ENV_HEADLESS: &str = "ACME_E2E_HEADLESS";
pub const ENV_LIVE: &str = "ACME_E2E_LIVE";

impl RunnerConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults, overlaid with `path` when given, then the environment
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading runner config from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, normally the process environment
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> E2eResult<()> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.site.base_url = url;
        }

        if let Some(browser) = lookup(ENV_BROWSER) {
            self.playwright.browser = browser.parse()?;
        }

        if let Some(headless) = lookup(ENV_HEADLESS) {
            self.playwright.headless = parse_flag(&headless)
                .ok_or_else(|| E2eError::Config(format!("{}={} is not a boolean", ENV_HEADLESS, headless)))?;
        }

        Ok(())
    }
}

/// Whether `ACME_E2E_LIVE` asks for a real browser run
pub fn live_requested(lookup: impl Fn(&str) -> Option<String>) -> E2eResult<bool> {
    match lookup(ENV_LIVE) {
        Some(value) => parse_flag(&value)
            .ok_or_else(|| E2eError::Config(format!("{}={} is not a boolean", ENV_LIVE, value))),
        None => Ok(false),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
