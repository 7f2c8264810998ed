//! The page capability the agent consumes, and its CDP implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use webrover_core::config::{BrowserConfig, FocusStrategy};
use webrover_core::{Error, Paths, Result};

use super::cdp::CdpEvent;
use super::session::BrowserSession;

/// What the page reports about one focused element. `handle` is stamped
/// into the DOM as `data-wr-handle` and stays valid until the next
/// traversal begins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElementProbe {
    pub handle: String,
    pub tag: String,
    #[serde(default)]
    pub attrs: Vec<(String, String)>,
    #[serde(default)]
    pub text: String,
    pub visible: bool,
    /// Whether the element matches the traversal's selector filter.
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigateOutcome {
    Started,
    /// Chrome refused or aborted the navigation; carries its error text.
    Aborted(String),
}

/// Header fields of a main-frame document response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentResponse {
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    LoadFired,
    NavigationStarted,
    NavigationStopped,
    RequestStarted(String),
    RequestFinished(String),
    Response(DocumentResponse),
    DownloadStarted,
}

/// Browser control surface used by the indexer, the watcher and the agent loop.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<NavigateOutcome>;

    async fn current_url(&mut self) -> Result<String>;

    /// Markup of the whole document.
    async fn body_html(&mut self) -> Result<String>;

    /// Reset focus to the top of the document and clear ids left by the
    /// previous traversal. Element handles stay valid for the life of the
    /// document.
    async fn begin_traversal(&mut self, selector: &str, strategy: FocusStrategy) -> Result<()>;

    /// Move focus forward one step. `None` once focus has left the document.
    async fn focus_next(&mut self) -> Result<Option<ElementProbe>>;

    /// Stamp `data-wr-id` on the element so distilled content can refer to it.
    async fn assign_id(&mut self, handle: &str, id: u32) -> Result<()>;

    async fn click(&mut self, handle: &str) -> Result<()>;

    async fn type_into(&mut self, handle: &str, text: &str) -> Result<()>;

    /// Submit the form owning the element, or press Enter in it when it has none.
    async fn submit_form(&mut self, handle: &str) -> Result<()>;

    /// Lifecycle events received since the previous call.
    async fn drain_lifecycle(&mut self) -> Result<Vec<LifecycleEvent>>;

    async fn close(&mut self) -> Result<()>;
}

fn cdp_err(e: String) -> Error {
    Error::Browser(e)
}

/// Shared by both traversal strategies.
const DESCRIBE_JS: &str = r#"
function __wrDescribe(el, selector) {
  if (!el || el === document.body || el === document.documentElement) return null;
  if (!el.hasAttribute('data-wr-handle')) {
    window.__wrSeq = (window.__wrSeq || 0) + 1;
    el.setAttribute('data-wr-handle', String(window.__wrSeq));
  }
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  const visible = rect.width > 1 && rect.height > 1
    && style.display !== 'none'
    && style.visibility !== 'hidden'
    && style.visibility !== 'collapse';
  const attrs = [];
  for (const name of ['href', 'type', 'placeholder', 'title', 'role', 'value']) {
    let v;
    if (name === 'href') {
      v = el.hasAttribute('href') && typeof el.href === 'string' ? el.href : null;
    } else if (name === 'value') {
      v = ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName) ? el.value : el.getAttribute('value');
    } else {
      v = el.getAttribute(name);
    }
    if (v !== null && v !== undefined && v !== '') attrs.push([name, String(v)]);
  }
  const text = (el.innerText || el.textContent || el.getAttribute('aria-label') || '')
    .replace(/\s+/g, ' ').trim();
  return {
    handle: el.getAttribute('data-wr-handle'),
    tag: el.tagName.toLowerCase(),
    attrs: attrs,
    text: text,
    visible: visible,
    matches: !!(selector && el.matches(selector)),
  };
}
"#;

const CLEAR_STAMPS_JS: &str = r#"
document.querySelectorAll('[data-wr-id]').forEach(e => e.removeAttribute('data-wr-id'));
document.querySelectorAll('[data-wr-start]').forEach(e => e.remove());
"#;

/// Put the sequential focus navigation starting point at the top of the body.
const KEYBOARD_START_JS: &str = r#"
if (document.activeElement && document.activeElement.blur) document.activeElement.blur();
if (document.body) {
  const start = document.createElement('span');
  start.setAttribute('data-wr-start', '');
  start.tabIndex = -1;
  document.body.insertBefore(start, document.body.firstChild);
  start.focus({preventScroll: true});
}
window.scrollTo(0, 0);
"#;

/// Sequential navigation order: positive tabindex ascending, then document order.
const SCRIPT_START_JS: &str = r#"
const focusable = Array.from(document.querySelectorAll(
  'a[href], area[href], button, input, select, textarea, summary, iframe, [tabindex], [contenteditable="true"]'
)).filter(el => !el.disabled && el.tabIndex >= 0 && !(el.tagName === 'INPUT' && el.type === 'hidden'));
const positive = focusable.filter(el => el.tabIndex > 0).sort((a, b) => a.tabIndex - b.tabIndex);
window.__wrOrder = positive.concat(focusable.filter(el => el.tabIndex === 0));
window.__wrCursor = 0;
"#;

fn find_js(handle: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll('[data-wr-handle]')).find(e => e.getAttribute('data-wr-handle') === {})",
        Value::String(handle.to_string())
    )
}

/// Map a raw CDP event to the watcher's vocabulary. Sub-frame activity
/// is ignored.
pub fn translate_event(event: &CdpEvent, main_frame_id: Option<&str>) -> Option<LifecycleEvent> {
    let params = &event.params;
    let frame_id = params.get("frameId").and_then(|v| v.as_str());
    let in_main_frame = match (frame_id, main_frame_id) {
        (Some(frame), Some(main)) => frame == main,
        _ => true,
    };
    let request_id = || {
        params
            .get("requestId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    match event.method.as_str() {
        "Page.loadEventFired" => Some(LifecycleEvent::LoadFired),
        "Page.frameStartedLoading" if in_main_frame => Some(LifecycleEvent::NavigationStarted),
        "Page.frameStoppedLoading" if in_main_frame => Some(LifecycleEvent::NavigationStopped),
        "Page.downloadWillBegin" => Some(LifecycleEvent::DownloadStarted),
        "Network.requestWillBeSent" => request_id().map(LifecycleEvent::RequestStarted),
        "Network.loadingFinished" | "Network.loadingFailed" => {
            request_id().map(LifecycleEvent::RequestFinished)
        }
        "Network.responseReceived" if in_main_frame => {
            if params.get("type").and_then(|v| v.as_str()) != Some("Document") {
                return None;
            }
            let headers = params.get("response").and_then(|r| r.get("headers"))?;
            let header = |name: &str| {
                headers.as_object().and_then(|map| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .and_then(|(_, v)| v.as_str())
                        .map(|s| s.to_string())
                })
            };
            Some(LifecycleEvent::Response(DocumentResponse {
                content_disposition: header("content-disposition"),
                content_length: header("content-length").and_then(|v| v.trim().parse().ok()),
                content_type: header("content-type"),
            }))
        }
        _ => None,
    }
}

/// [`PageDriver`] over a live Chrome page.
pub struct CdpPage {
    session: BrowserSession,
    main_frame_id: Option<String>,
    selector: String,
    strategy: FocusStrategy,
}

impl CdpPage {
    pub async fn launch(config: &BrowserConfig, paths: &Paths) -> Result<Self> {
        let session = BrowserSession::launch(config, paths).await.map_err(cdp_err)?;
        let main_frame_id = session
            .cdp
            .send_command("Page.getFrameTree", json!({}))
            .await
            .ok()
            .and_then(|tree| {
                tree.get("frameTree")
                    .and_then(|t| t.get("frame"))
                    .and_then(|f| f.get("id"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            });
        if main_frame_id.is_none() {
            warn!("Could not resolve main frame id, sub-frame events will not be filtered");
        }
        Ok(Self {
            session,
            main_frame_id,
            selector: String::new(),
            strategy: FocusStrategy::default(),
        })
    }

    async fn eval(&self, expression: &str) -> Result<Value> {
        self.session.cdp.evaluate_js(expression).await.map_err(cdp_err)
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn navigate(&mut self, url: &str) -> Result<NavigateOutcome> {
        let result = self.session.cdp.navigate(url).await.map_err(cdp_err)?;
        match result.get("errorText").and_then(|v| v.as_str()) {
            Some(error_text) if !error_text.is_empty() => {
                info!(url = %url, error = %error_text, "Navigation aborted");
                Ok(NavigateOutcome::Aborted(error_text.to_string()))
            }
            _ => Ok(NavigateOutcome::Started),
        }
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.eval("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn body_html(&mut self) -> Result<String> {
        let value = self
            .eval("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn begin_traversal(&mut self, selector: &str, strategy: FocusStrategy) -> Result<()> {
        self.selector = selector.to_string();
        self.strategy = strategy;
        let start = match strategy {
            FocusStrategy::Keyboard => KEYBOARD_START_JS,
            FocusStrategy::Script => SCRIPT_START_JS,
        };
        self.eval(&format!("(() => {{ {} {} return true; }})()", CLEAR_STAMPS_JS, start))
            .await?;
        debug!(selector = %selector, strategy = ?strategy, "Traversal started");
        Ok(())
    }

    async fn focus_next(&mut self) -> Result<Option<ElementProbe>> {
        let selector = Value::String(self.selector.clone());
        let script = match self.strategy {
            FocusStrategy::Keyboard => {
                self.session.cdp.press_key("Tab", "Tab", 9).await.map_err(cdp_err)?;
                format!(
                    "(() => {{ {} let el = document.activeElement; \
                     while (el && el.shadowRoot && el.shadowRoot.activeElement) el = el.shadowRoot.activeElement; \
                     return __wrDescribe(el, {}); }})()",
                    DESCRIBE_JS, selector
                )
            }
            FocusStrategy::Script => format!(
                "(() => {{ {} const order = window.__wrOrder || []; \
                 while (window.__wrCursor < order.length) {{ \
                   const el = order[window.__wrCursor++]; \
                   if (el.isConnected) return __wrDescribe(el, {}); \
                 }} return null; }})()",
                DESCRIBE_JS, selector
            ),
        };
        let value = self.eval(&script).await?;
        if value.is_null() {
            return Ok(None);
        }
        let probe = serde_json::from_value(value)?;
        Ok(Some(probe))
    }

    async fn assign_id(&mut self, handle: &str, id: u32) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return false; el.setAttribute('data-wr-id', '{}'); return true; }})()",
            find_js(handle),
            id
        );
        if self.eval(&script).await?.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("element {} is gone", handle)))
        }
    }

    async fn click(&mut self, handle: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return null; \
             el.scrollIntoView({{block: 'center', inline: 'center'}}); \
             const r = el.getBoundingClientRect(); \
             const x = r.left + r.width / 2, y = r.top + r.height / 2; \
             const top = document.elementFromPoint(x, y); \
             return {{x: x, y: y, w: r.width, h: r.height, hit: !!top && (top === el || el.contains(top))}}; }})()",
            find_js(handle)
        );
        let target = self.eval(&script).await?;
        if target.is_null() {
            return Err(Error::NotFound(format!("element {} is gone", handle)));
        }

        let (x, y) = (
            target.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0),
            target.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0),
        );
        let width = target.get("w").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let height = target.get("h").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if width <= 1.0 || height <= 1.0 {
            return Err(Error::Browser(format!("element {} is not visible", handle)));
        }

        if target.get("hit").and_then(|v| v.as_bool()) == Some(true) {
            let cdp = &self.session.cdp;
            cdp.dispatch_mouse_event("mouseMoved", x, y, "none", 0).await.map_err(cdp_err)?;
            cdp.dispatch_mouse_event("mousePressed", x, y, "left", 1).await.map_err(cdp_err)?;
            cdp.dispatch_mouse_event("mouseReleased", x, y, "left", 1).await.map_err(cdp_err)?;
            debug!(handle = %handle, x, y, "Clicked via mouse events");
        } else {
            // Covered by an overlay: let the element handle the click itself.
            let script = format!(
                "(() => {{ const el = {}; if (!el) return false; el.click(); return true; }})()",
                find_js(handle)
            );
            if self.eval(&script).await?.as_bool() != Some(true) {
                return Err(Error::NotFound(format!("element {} is gone", handle)));
            }
            debug!(handle = %handle, "Clicked via element.click()");
        }
        Ok(())
    }

    async fn type_into(&mut self, handle: &str, text: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return null; const t = {}; \
             el.scrollIntoView({{block: 'center'}}); el.focus(); \
             if (el.tagName === 'SELECT') {{ \
               const opt = Array.from(el.options).find(o => o.text.trim() === t || o.value === t); \
               if (!opt) return 'no_option'; \
               el.value = opt.value; \
               el.dispatchEvent(new Event('input', {{bubbles: true}})); \
               el.dispatchEvent(new Event('change', {{bubbles: true}})); \
               return 'selected'; \
             }} \
             if (typeof el.setSelectionRange === 'function') {{ \
               try {{ const n = (el.value || '').length; el.setSelectionRange(n, n); }} catch (e) {{}} \
             }} \
             return document.activeElement === el ? 'focused' : 'unfocused'; }})()",
            find_js(handle),
            Value::String(text.to_string())
        );
        match self.eval(&script).await?.as_str() {
            None => Err(Error::NotFound(format!("element {} is gone", handle))),
            Some("selected") => Ok(()),
            Some("focused") => self.session.cdp.insert_text(text).await.map_err(cdp_err),
            Some("no_option") => Err(Error::Browser(format!("no option \"{}\" in select", text))),
            Some(other) => Err(Error::Browser(format!("element {} cannot take input ({})", handle, other))),
        }
    }

    async fn submit_form(&mut self, handle: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return null; \
             const form = el.form || el.closest('form'); \
             if (!form) {{ el.focus(); return 'no_form'; }} \
             if (typeof form.requestSubmit === 'function') form.requestSubmit(); else form.submit(); \
             return 'submitted'; }})()",
            find_js(handle)
        );
        match self.eval(&script).await?.as_str() {
            None => Err(Error::NotFound(format!("element {} is gone", handle))),
            Some("no_form") => self
                .session
                .cdp
                .press_key("Enter", "Enter", 13)
                .await
                .map_err(cdp_err),
            Some(_) => Ok(()),
        }
    }

    async fn drain_lifecycle(&mut self) -> Result<Vec<LifecycleEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = self.session.events.try_recv() {
            if let Some(translated) = translate_event(&event, self.main_frame_id.as_deref()) {
                events.push(translated);
            }
        }
        Ok(events)
    }

    async fn close(&mut self) -> Result<()> {
        self.session.close().await;
        info!("Browser closed");
        Ok(())
    }
}
