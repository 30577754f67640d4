//! Chromium session driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{BrowserError, BrowserLauncher, BrowserResult, BrowserSession, Locator};

/// Mirrors the usual "is displayed" rule: rendered, not hidden by style,
/// with a non-empty box.
const DISPLAYED_FN: &str = "function() { \
const style = window.getComputedStyle(this); \
if (style.visibility === 'hidden' || style.display === 'none') { return false; } \
return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length); }";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Launches headless Chromium with the flags the portal tolerates (its TLS
/// certificate chain does not validate).
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    args: Vec<String>,
    window: (u32, u32),
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        let args = [
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--ignore-certificate-errors",
            "--ignore-ssl-errors",
        ]
        .into_iter()
        .map(String::from)
        .chain(std::iter::once(format!("--user-agent={DEFAULT_USER_AGENT}")))
        .collect();

        Self {
            args,
            window: (1920, 1080),
            headless: true,
        }
    }

    /// Show the browser window, useful when debugging selectors.
    pub fn with_head(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window = (width, height);
        self
    }
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> BrowserResult<ChromiumSession> {
        let mut builder = BrowserConfig::builder().window_size(self.window.0, self.window.1);
        if !self.headless {
            builder = builder.with_head();
        }
        for arg in &self.args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    log::debug!("devtools handler stopped: {err}");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(driver_fault)?;
        log::debug!("chromium session ready");

        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
            closed: false,
        })
    }
}

/// One Chromium tab plus the browser process that owns it.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: bool,
}

impl ChromiumSession {
    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = Element;

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        self.page.goto(url).await.map_err(driver_fault)?;
        Ok(())
    }

    async fn find(&mut self, locator: &Locator) -> BrowserResult<Option<Element>> {
        self.ensure_open()?;
        let result = match locator {
            Locator::Css(selector) => self.page.find_element(selector.as_str()).await,
            Locator::XPath(expression) => self.page.find_xpath(expression.as_str()).await,
        };
        match result {
            Ok(element) => Ok(Some(element)),
            Err(err) if is_driver_fault(&err) => Err(driver_fault(err)),
            Err(err) => {
                log::trace!("{locator} not found: {err}");
                Ok(None)
            }
        }
    }

    async fn is_displayed(&mut self, element: &Element) -> BrowserResult<bool> {
        self.ensure_open()?;
        let returns = match element.call_js_fn(DISPLAYED_FN, false).await {
            Ok(returns) => returns,
            Err(err) if is_driver_fault(&err) => return Err(driver_fault(err)),
            Err(err) => {
                log::trace!("visibility check failed: {err}");
                return Ok(false);
            }
        };
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn screenshot(&mut self, element: &Element) -> BrowserResult<Vec<u8>> {
        self.ensure_open()?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(interaction_error)
    }

    async fn page_screenshot(&mut self) -> BrowserResult<Vec<u8>> {
        self.ensure_open()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page.screenshot(params).await.map_err(driver_fault)
    }

    async fn fill(&mut self, element: &Element, text: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(interaction_error)?;
        element.focus().await.map_err(interaction_error)?;
        element.type_str(text).await.map_err(interaction_error)?;
        Ok(())
    }

    async fn click(&mut self, element: &Element) -> BrowserResult<()> {
        self.ensure_open()?;
        element.click().await.map_err(interaction_error)?;
        Ok(())
    }

    async fn page_source(&mut self) -> BrowserResult<String> {
        self.ensure_open()?;
        self.page.content().await.map_err(driver_fault)
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        self.closed = true;

        let closed = self.browser.close().await.map_err(driver_fault);
        if let Err(err) = self.browser.wait().await {
            log::debug!("chromium process wait failed: {err}");
        }
        self.handler_task.abort();
        closed.map(|_| ())
    }
}

/// Transport-level failures mean the browser itself is gone; everything else
/// (no node, stale node, script errors) reads as "element not found".
fn is_driver_fault(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

fn driver_fault(err: CdpError) -> BrowserError {
    BrowserError::Driver(err.to_string())
}

/// Failures while acting on an element. Only transport errors count as
/// driver faults.
fn interaction_error(err: CdpError) -> BrowserError {
    if is_driver_fault(&err) {
        driver_fault(err)
    } else {
        BrowserError::Element(err.to_string())
    }
}
