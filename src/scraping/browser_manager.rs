//! Native browser management using `chromiumoxide`.
//!
//! This module is the **single source of truth** for:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Launching a headless browser session with stealth defaults.
//! * The [`ChromeLauncher`] / [`ChromeSession`] implementation of the
//!   browser capability used for engine searches and the rendering fallback.
//!
//! Every session owns its own browser process; nothing is pooled, so one
//! engine's session can never leak state into another's.

use super::session::{within, BrowserLauncher, BrowserSession, Element, SUBMIT_KEY};
use crate::antibot;
use crate::core::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LOCATE_POLL: Duration = Duration::from_millis(250);
const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    // 1. Explicit env override
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    // 2. PATH scan (Linux / macOS / Windows package managers)
    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    // 3. Platform-specific well-known paths
    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag; the UA is drawn from the shared rotation pool.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig, BrowserError> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", antibot::get_random_user_agent()))
        .build()
        .map_err(|e| BrowserError::Launch(format!("Failed to build browser config: {}", e)))
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Launches one headless browser per session.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    exe: Option<String>,
    page_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(exe: impl Into<String>) -> Self {
        Self {
            exe: Some(exe.into()),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    /// Bound for page loads, including the navigation after a submit.
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    /// Use the auto-discovered executable. Launching fails later (per
    /// session, recoverably) when no browser is installed.
    pub fn auto() -> Self {
        let exe = find_chrome_executable();
        if exe.is_none() {
            warn!("No browser found. Install Brave, Chrome, or Chromium. Set CHROME_EXECUTABLE if installed in a non-standard location.");
        }
        Self {
            exe,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn is_available(&self) -> bool {
        self.exe.is_some()
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let exe = self
            .exe
            .as_deref()
            .ok_or_else(|| BrowserError::Launch("no Chromium-family browser installed".into()))?;

        info!("🚀 Launching headless browser ({})", exe);
        let config = build_headless_config(exe, 1280, 900)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(format!("Failed to launch browser ({}): {}", exe, e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(BrowserError::Launch(format!("Failed to open tab: {}", e)));
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
            page_timeout: self.page_timeout,
            closed: false,
        }))
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    page_timeout: Duration,
    closed: bool,
}

impl ChromeSession {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        debug!("🌐 navigate {}", url);
        let page = &self.page;
        within(self.page_timeout, &format!("navigate {}", url), async {
            page.goto(url)
                .await
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation(format!("{}: {}", url, e)))
        })
        .await
    }

    async fn locate(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, BrowserError> {
        self.ensure_open()?;
        let start = Instant::now();
        loop {
            if let Ok(el) = self.page.find_element(selector).await {
                let outer_html = el.outer_html().await.ok().flatten();
                return Ok(Some(Element {
                    selector: selector.to_string(),
                    tag: None,
                    outer_html,
                }));
            }
            if start.elapsed() >= timeout {
                debug!("locate: '{}' not found after {}ms", selector, timeout.as_millis());
                return Ok(None);
            }
            tokio::time::sleep(LOCATE_POLL).await;
        }
    }

    async fn send_keys(&mut self, element: &Element, text: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let (body, submit) = match text.strip_suffix(SUBMIT_KEY) {
            Some(body) => (body, true),
            None => (text, false),
        };
        let el = self
            .page
            .find_element(element.selector.as_str())
            .await
            .map_err(|e| BrowserError::Protocol(format!("element '{}' vanished: {}", element.selector, e)))?;
        el.click()
            .await
            .map_err(|e| BrowserError::Protocol(format!("click failed: {}", e)))?;
        el.type_str(body)
            .await
            .map_err(|e| BrowserError::Protocol(format!("typing failed: {}", e)))?;
        if submit {
            el.press_key("Enter")
                .await
                .map_err(|e| BrowserError::Protocol(format!("submit failed: {}", e)))?;
            // Navigation after submit is best-effort; the result-list wait covers slow pages.
            match tokio::time::timeout(self.page_timeout, self.page.wait_for_navigation()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("wait_for_navigation after submit: {}", e),
                Err(_) => debug!(
                    "wait_for_navigation after submit timed out after {}ms",
                    self.page_timeout.as_millis()
                ),
            }
        }
        Ok(())
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Protocol(format!("Failed to get page content: {}", e)))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Protocol(format!("Browser close error: {}", e)));
        self.handler_task.abort();
        result
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // The browser process itself is killed by chromiumoxide's own Drop.
        self.handler_task.abort();
    }
}
