//! Playwright browser automation
//!
//! A small Node driver owns the browser and page. It reads one JSON command
//! per line on stdin and answers with one JSON reply per line on stdout:
//!
//! ```text
//! -> {"id":3,"op":"text_content","selector":"p.text-white","nth":0}
//! <- {"id":3,"ok":true,"value":"$20.00 USD"}
//! ```
//!
//! Reply `0` is sent once the browser is up.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::collector::TextSource;
use crate::error::{E2eError, E2eResult};
use crate::spec::{LoadState, Viewport};

const DRIVER_JS: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const config = JSON.parse(process.argv[2]);

function reply(id, body) {
  process.stdout.write(JSON.stringify(Object.assign({ id }, body)) + '\n');
}

(async () => {
  const browser = await playwright[config.browser].launch({ headless: config.headless });
  const context = await browser.newContext({
    baseURL: config.base_url,
    viewport: { width: config.viewport.width, height: config.viewport.height },
  });
  context.setDefaultTimeout(config.action_timeout_ms);
  const page = await context.newPage();

  const consoleErrors = [];
  page.on('console', (msg) => {
    if (msg.type() === 'error') consoleErrors.push(msg.text());
  });

  const navigation = (cmd) => (cmd.wait_until ? { waitUntil: cmd.wait_until } : {});
  const status = (response) => (response ? response.status() : null);

  const handlers = {
    goto: async (cmd) => status(await page.goto(cmd.url, navigation(cmd))),
    go_back: async (cmd) => status(await page.goBack(navigation(cmd))),
    click: (cmd) => page.locator(cmd.selector).click(cmd.timeout_ms ? { timeout: cmd.timeout_ms } : {}),
    fill: (cmd) => page.locator(cmd.selector).fill(cmd.value),
    press: (cmd) =>
      cmd.selector ? page.locator(cmd.selector).press(cmd.key) : page.keyboard.press(cmd.key),
    wait_for_load_state: (cmd) => page.waitForLoadState(cmd.state),
    count: (cmd) => page.locator(cmd.selector).count(),
    text_content: (cmd) => page.locator(cmd.selector).nth(cmd.nth).textContent(),
    is_visible: (cmd) => page.locator(cmd.selector).isVisible(),
    is_enabled: (cmd) => page.locator(cmd.selector).isEnabled(),
    get_attribute: (cmd) => page.locator(cmd.selector).getAttribute(cmd.name),
    title: () => page.title(),
    url: () => page.url(),
    screenshot: async (cmd) => {
      await page.screenshot({ path: cmd.path, fullPage: cmd.full_page });
      return cmd.path;
    },
    console_errors: () => consoleErrors.slice(),
    close: () => null,
  };

  reply(0, { ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      continue;
    }
    try {
      const handler = handlers[cmd.op];
      if (!handler) throw new Error('unknown op ' + cmd.op);
      const value = await handler(cmd);
      reply(cmd.id, { ok: true, value: value === undefined ? null : value });
    } catch (error) {
      reply(cmd.id, { ok: false, error: error.message });
    }
    if (cmd.op === 'close') break;
  }

  await browser.close();
})().catch((error) => {
  reply(0, { ok: false, error: error.message });
  process.exit(1);
});
"#;

/// Interval between visibility probes in [`PlaywrightSession::try_acquire`]
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::Config(format!("unknown browser: {}", other))),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,

    /// Where screenshots are written
    pub screenshot_dir: PathBuf,

    /// `node_modules` directory holding the `playwright` package
    pub node_path: Option<PathBuf>,

    /// Default timeout for Playwright actions inside the driver
    pub action_timeout_ms: u64,

    /// Upper bound on a single driver round trip
    pub command_timeout_ms: u64,

    /// How long assertions are retried before failing
    pub expect_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            node_path: None,
            action_timeout_ms: 10_000,
            command_timeout_ms: 60_000,
            expect_timeout_ms: 5_000,
        }
    }
}

/// Commands understood by the driver script
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverCommand {
    Goto { url: String, wait_until: Option<&'static str> },
    GoBack { wait_until: Option<&'static str> },
    Click { selector: String, timeout_ms: Option<u64> },
    Fill { selector: String, value: String },
    Press { selector: Option<String>, key: String },
    WaitForLoadState { state: &'static str },
    Count { selector: String },
    TextContent { selector: String, nth: usize },
    IsVisible { selector: String },
    IsEnabled { selector: String },
    GetAttribute { selector: String, name: String },
    Title,
    Url,
    Screenshot { path: String, full_page: bool },
    ConsoleErrors,
    Close,
}

impl DriverCommand {
    fn op(&self) -> &'static str {
        match self {
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::GoBack { .. } => "go_back",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::Press { .. } => "press",
            DriverCommand::WaitForLoadState { .. } => "wait_for_load_state",
            DriverCommand::Count { .. } => "count",
            DriverCommand::TextContent { .. } => "text_content",
            DriverCommand::IsVisible { .. } => "is_visible",
            DriverCommand::IsEnabled { .. } => "is_enabled",
            DriverCommand::GetAttribute { .. } => "get_attribute",
            DriverCommand::Title => "title",
            DriverCommand::Url => "url",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::ConsoleErrors => "console_errors",
            DriverCommand::Close => "close",
        }
    }

    /// Serialize as a single protocol line
    pub fn to_line(&self, id: u64) -> E2eResult<String> {
        let mut payload = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert("id".to_string(), id.into());
        }
        let mut line = serde_json::to_string(&payload)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct DriverLaunch<'a> {
    browser: &'static str,
    headless: bool,
    base_url: &'a str,
    viewport: Viewport,
    action_timeout_ms: u64,
}

struct DriverIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl DriverIo {
    async fn read_reply(&mut self, id: u64) -> E2eResult<DriverReply> {
        while let Some(line) = self.stdout.next_line().await? {
            match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.id == id => return Ok(reply),
                Ok(reply) => warn!("Discarding stale driver reply {}", reply.id),
                Err(_) => debug!("[driver] {}", line),
            }
        }
        Err(E2eError::DriverExited)
    }
}

/// A live browser page driven through the Node driver
pub struct PlaywrightSession {
    io: Mutex<DriverIo>,
    screenshot_dir: PathBuf,
    command_timeout: Duration,
    expect_timeout: Duration,
    _workdir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Launch a browser pointed at `base_url`
    pub async fn launch(config: &PlaywrightConfig, base_url: &str, viewport: Viewport) -> E2eResult<Self> {
        Self::check_playwright_installed()?;

        std::fs::create_dir_all(&config.screenshot_dir)?;
        let screenshot_dir = config.screenshot_dir.canonicalize()?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_JS)?;

        let launch = DriverLaunch {
            browser: config.browser.as_str(),
            headless: config.headless,
            base_url,
            viewport,
            action_timeout_ms: config.action_timeout_ms,
        };

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .arg(serde_json::to_string(&launch)?)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(node_path) = Self::resolve_node_path(config.node_path.as_deref()) {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[driver stderr] {}", line);
                }
            });
        }

        let mut io = DriverIo {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        let command_timeout = Duration::from_millis(config.command_timeout_ms);
        let ready = timeout(command_timeout, io.read_reply(0))
            .await
            .map_err(|_| E2eError::Timeout("browser launch".to_string()))??;
        if !ready.ok {
            return Err(E2eError::Playwright(format!(
                "Browser launch failed: {}",
                ready.error.unwrap_or_default()
            )));
        }

        info!("Launched {} against {}", config.browser.as_str(), base_url);

        Ok(Self {
            io: Mutex::new(io),
            screenshot_dir,
            command_timeout,
            expect_timeout: Duration::from_millis(config.expect_timeout_ms),
            _workdir: workdir,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Configured node path, or `./node_modules` when present
    fn resolve_node_path(configured: Option<&Path>) -> Option<PathBuf> {
        match configured {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .map(|dir| dir.join("node_modules"))
                .filter(|dir| dir.is_dir()),
        }
    }

    /// Send one command and wait for its reply
    pub async fn send(&self, command: DriverCommand) -> E2eResult<serde_json::Value> {
        let op = command.op();
        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let line = command.to_line(id)?;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let reply = timeout(self.command_timeout, io.read_reply(id))
            .await
            .map_err(|_| E2eError::Timeout(format!("driver command {}", op)))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(E2eError::Playwright(format!(
                "{}: {}",
                op,
                reply.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    async fn send_for<T: DeserializeOwned>(&self, command: DriverCommand) -> E2eResult<T> {
        let value = self.send(command).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn expect_timeout(&self) -> Duration {
        self.expect_timeout
    }

    pub fn locator(&self, selector: impl Into<String>) -> Locator<'_> {
        Locator {
            session: self,
            selector: selector.into(),
        }
    }

    /// Navigate, returning the response status when there is one
    pub async fn goto(&self, url: &str, wait_until: Option<LoadState>) -> E2eResult<Option<u16>> {
        self.send_for(DriverCommand::Goto {
            url: url.to_string(),
            wait_until: wait_until.map(|s| s.as_playwright()),
        })
        .await
    }

    pub async fn go_back(&self, wait_until: Option<LoadState>) -> E2eResult<Option<u16>> {
        self.send_for(DriverCommand::GoBack {
            wait_until: wait_until.map(|s| s.as_playwright()),
        })
        .await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.send(DriverCommand::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn press(&self, selector: Option<&str>, key: &str) -> E2eResult<()> {
        self.send(DriverCommand::Press {
            selector: selector.map(String::from),
            key: key.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.send(DriverCommand::WaitForLoadState {
            state: state.as_playwright(),
        })
        .await?;
        Ok(())
    }

    pub async fn title(&self) -> E2eResult<String> {
        self.send_for(DriverCommand::Title).await
    }

    pub async fn url(&self) -> E2eResult<String> {
        self.send_for(DriverCommand::Url).await
    }

    /// Console messages of type `error` seen since launch
    pub async fn console_errors(&self) -> E2eResult<Vec<String>> {
        self.send_for(DriverCommand::ConsoleErrors).await
    }

    /// Full or viewport screenshot saved as `<screenshot_dir>/<name>.png`
    pub async fn screenshot(&self, name: &str, full_page: bool) -> E2eResult<PathBuf> {
        let path = self.screenshot_dir.join(format!("{}.png", name));
        self.send(DriverCommand::Screenshot {
            path: path.to_string_lossy().to_string(),
            full_page,
        })
        .await?;
        info!("Screenshot saved: {}", path.display());
        Ok(path)
    }

    /// Wait up to `wait` for `selector` to become visible.
    ///
    /// Returns `None` when it never shows up; absence is not an error.
    pub async fn try_acquire(&self, selector: &str, wait: Duration) -> E2eResult<Option<Locator<'_>>> {
        let locator = self.locator(selector);
        let start = Instant::now();

        loop {
            if locator.is_visible().await? {
                return Ok(Some(locator));
            }
            if start.elapsed() >= wait {
                return Ok(None);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Ask the driver to close the browser, then reap the process
    pub async fn close(self) -> E2eResult<()> {
        if let Err(e) = self.send(DriverCommand::Close).await {
            warn!("Driver close failed: {}", e);
        }

        let mut io = self.io.into_inner();
        match timeout(Duration::from_secs(5), io.child.wait()).await {
            Ok(status) => {
                debug!("Driver exited with {}", status?);
            }
            Err(_) => {
                warn!("Driver did not exit, terminating");
                Self::terminate(&mut io.child).await;
            }
        }
        Ok(())
    }

    async fn terminate(child: &mut Child) {
        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    sleep(Duration::from_millis(500)).await;
                }
            }
        }

        let _ = child.kill().await;
    }
}

/// Lazily resolved selector on the session's page
pub struct Locator<'a> {
    session: &'a PlaywrightSession,
    selector: String,
}

impl<'a> Locator<'a> {
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub async fn count(&self) -> E2eResult<usize> {
        self.session
            .send_for(DriverCommand::Count {
                selector: self.selector.clone(),
            })
            .await
    }

    /// One handle per element currently matching, in document order
    pub async fn all(&self) -> E2eResult<Vec<ElementHandle<'a>>> {
        let count = self.count().await?;
        Ok((0..count)
            .map(|nth| ElementHandle {
                session: self.session,
                selector: self.selector.clone(),
                nth,
            })
            .collect())
    }

    pub async fn click(&self, timeout_ms: Option<u64>) -> E2eResult<()> {
        self.session
            .send(DriverCommand::Click {
                selector: self.selector.clone(),
                timeout_ms,
            })
            .await?;
        Ok(())
    }

    pub async fn is_visible(&self) -> E2eResult<bool> {
        self.session
            .send_for(DriverCommand::IsVisible {
                selector: self.selector.clone(),
            })
            .await
    }

    pub async fn is_enabled(&self) -> E2eResult<bool> {
        self.session
            .send_for(DriverCommand::IsEnabled {
                selector: self.selector.clone(),
            })
            .await
    }

    /// Text of the first match
    pub async fn text_content(&self) -> E2eResult<Option<String>> {
        self.session
            .send_for(DriverCommand::TextContent {
                selector: self.selector.clone(),
                nth: 0,
            })
            .await
    }

    pub async fn get_attribute(&self, name: &str) -> E2eResult<Option<String>> {
        self.session
            .send_for(DriverCommand::GetAttribute {
                selector: self.selector.clone(),
                name: name.to_string(),
            })
            .await
    }
}

/// The `nth` element matching a selector
pub struct ElementHandle<'a> {
    session: &'a PlaywrightSession,
    selector: String,
    nth: usize,
}

#[async_trait]
impl<'a> TextSource for ElementHandle<'a> {
    async fn text_content(&self) -> E2eResult<Option<String>> {
        self.session
            .send_for(DriverCommand::TextContent {
                selector: self.selector.clone(),
                nth: self.nth,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_format() {
        let line = DriverCommand::TextContent {
            selector: "p.text-white".to_string(),
            nth: 2,
        }
        .to_line(7)
        .unwrap();

        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["op"], "text_content");
        assert_eq!(value["selector"], "p.text-white");
        assert_eq!(value["nth"], 2);
    }

    #[test]
    fn test_unit_command_format() {
        let line = DriverCommand::ConsoleErrors.to_line(1).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["op"], "console_errors");
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_load_state_in_command() {
        let line = DriverCommand::Goto {
            url: "/".to_string(),
            wait_until: Some(LoadState::NetworkIdle.as_playwright()),
        }
        .to_line(3)
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["wait_until"], "networkidle");
    }

    #[test]
    fn test_parse_reply() {
        let ok: DriverReply = serde_json::from_str(r#"{"id":4,"ok":true,"value":"$20.00"}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(ok.value, serde_json::json!("$20.00"));

        let err: DriverReply =
            serde_json::from_str(r#"{"id":5,"ok":false,"error":"strict mode violation"}"#).unwrap();
        assert!(!err.ok);
        assert!(err.value.is_null());
        assert_eq!(err.error.as_deref(), Some("strict mode violation"));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("Chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }

    #[test]
    fn test_driver_script_handles_every_command() {
        for op in [
            "goto", "go_back", "click", "fill", "press", "wait_for_load_state", "count",
            "text_content", "is_visible", "is_enabled", "get_attribute", "title", "url",
            "screenshot", "console_errors", "close",
        ] {
            assert!(DRIVER_JS.contains(&format!("    {}:", op)), "driver lacks {}", op);
        }
    }
}
