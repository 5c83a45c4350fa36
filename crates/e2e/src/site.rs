//! Site reachability - probing the storefront before launching browsers

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Where the storefront under test lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL every relative `navigate` step resolves against
    pub base_url: String,

    /// Probe the site before running specs
    pub probe: bool,

    /// Give up probing after this long
    pub probe_timeout_ms: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://demo.vercel.store".to_string(),
            probe: true,
            probe_timeout_ms: 30_000,
        }
    }
}

/// Poll the base URL until it answers below 400, returning that status
pub async fn wait_until_reachable(config: &SiteConfig) -> E2eResult<u16> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let deadline = Duration::from_millis(config.probe_timeout_ms);
    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(&config.base_url).send().await {
            Ok(resp) if resp.status().as_u16() < 400 => {
                info!("Site is reachable at {} ({})", config.base_url, resp.status());
                return Ok(resp.status().as_u16());
            }
            Ok(resp) => {
                warn!("Site probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {}...", config.base_url);
                }
                if !e.is_connect() {
                    warn!("Site probe error: {}", e);
                }
            }
        }

        if start.elapsed() >= deadline {
            return Err(E2eError::SiteUnreachable {
                url: config.base_url.clone(),
                attempts,
            });
        }

        sleep(Duration::from_millis(250)).await;
    }
}
