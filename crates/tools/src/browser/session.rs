//! Browser process launch and the CDP connection to its page target.

use super::cdp::{CdpClient, CdpEvent};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrover_core::config::BrowserConfig;
use webrover_core::Paths;

/// Lifecycle events the navigation watcher consumes.
pub const LIFECYCLE_EVENTS: &[&str] = &[
    "Page.loadEventFired",
    "Page.frameStartedLoading",
    "Page.frameStoppedLoading",
    "Page.downloadWillBegin",
    "Network.requestWillBeSent",
    "Network.loadingFinished",
    "Network.loadingFailed",
    "Network.responseReceived",
];

/// One Chrome process with a CDP connection to its first page.
pub struct BrowserSession {
    pub debug_port: u16,
    chrome_process: Child,
    pub cdp: CdpClient,
    pub user_data_dir: PathBuf,
    pub headless: bool,
    /// Lifecycle events in arrival order.
    pub events: mpsc::UnboundedReceiver<CdpEvent>,
}

impl BrowserSession {
    /// Launch Chrome and attach to its page target.
    pub async fn launch(config: &BrowserConfig, paths: &Paths) -> Result<Self, String> {
        let browser_path = match &config.executable_path {
            Some(path) => path.clone(),
            None => find_browser_binary()
                .ok_or_else(|| "Chrome/Chromium not found. Install it or set browser.executablePath.".to_string())?,
        };

        let user_data_dir = paths.browser_profile_dir();
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| format!("Failed to create user data dir: {}", e))?;
        let downloads_dir = paths.downloads_dir();
        std::fs::create_dir_all(&downloads_dir)
            .map_err(|e| format!("Failed to create downloads dir: {}", e))?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &user_data_dir, config);

        info!(
            port = debug_port,
            headless = config.headless,
            browser = %browser_path,
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to launch {}: {}", browser_path, e))?;

        wait_for_cdp_ready(debug_port, config.launch_timeout_secs).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;

        // Subscribe before enabling domains so no early event is lost.
        let events = cdp.subscribe_events(LIFECYCLE_EVENTS).await;

        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("DOM").await?;
        cdp.enable_domain("Network").await?;
        cdp.set_viewport(config.window_width, config.window_height, 1.0).await?;
        cdp.set_download_behavior(&downloads_dir.display().to_string()).await?;

        info!(ws_url = %page_ws_url, "CDP connection established (page target)");

        Ok(Self {
            debug_port,
            chrome_process: child,
            cdp,
            user_data_dir,
            headless: config.headless,
            events,
        })
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.cdp.send_command("Browser.close", json!({})).await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        let _ = self.chrome_process.kill().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let _ = self.chrome_process.start_kill();
    }
}

fn build_browser_args(debug_port: u16, user_data_dir: &Path, config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--safebrowsing-disable-auto-update".to_string(),
        "--password-store=basic".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", config.window_width, config.window_height));
    args.push("about:blank".to_string());
    args
}

/// Locate a Chrome/Chromium binary.
pub fn find_browser_binary() -> Option<String> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until it responds, up to `timeout_secs`.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<String, String> {
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!("Chrome CDP not ready after {}s on port {}", timeout_secs, port));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

/// The first "page" target from /json/list. Retries since the target may
/// not appear immediately.
async fn get_page_ws_url(port: u16) -> Result<String, String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }

        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };

        let page = targets.iter().find_map(|target| {
            (target.get("type").and_then(|v| v.as_str()) == Some("page"))
                .then(|| target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
                .flatten()
        });
        if let Some(ws_url) = page {
            return Ok(ws_url.to_string());
        }
    }

    Err("No page target found after retries".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_flag_follows_config() {
        let mut config = BrowserConfig::default();
        config.headless = true;
        let args = build_browser_args(9222, Path::new("/tmp/profile"), &config);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        config.headless = false;
        let args = build_browser_args(9222, Path::new("/tmp/profile"), &config);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_window_size_from_config() {
        let mut config = BrowserConfig::default();
        config.window_width = 1024;
        config.window_height = 768;
        let args = build_browser_args(1, Path::new("/tmp/p"), &config);
        assert!(args.contains(&"--window-size=1024,768".to_string()));
    }

    #[tokio::test]
    async fn test_find_free_port_is_nonzero() {
        assert!(find_free_port().await.unwrap() > 0);
    }
}
