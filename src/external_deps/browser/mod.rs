//! Browser automation infrastructure.
//!
//! Provides the session trait consumed by the retrieval state machine and the
//! launcher trait used by the batch orchestrator, along with the Chromium
//! implementation driven over the DevTools protocol.
//!
//! Element lookups distinguish "not found" (`Ok(None)`) from genuine driver
//! faults (`Err`). Missing elements are routine on this portal; a driver that
//! stopped answering is not. Interactions with an element that cannot take
//! them (hidden, detached, zero-size) fail with [`BrowserError::Element`],
//! which callers treat as transient.

mod chromium;

pub use chromium::{ChromiumLauncher, ChromiumSession};

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Strategy used to locate an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Locator::Css(selector) | Locator::XPath(selector) => selector,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css:{selector}"),
            Locator::XPath(expression) => write!(f, "xpath:{expression}"),
        }
    }
}

/// Failures produced by the browser driver.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser driver fault: {0}")]
    Driver(String),
    #[error("element interaction failed: {0}")]
    Element(String),
    #[error("browser session is closed")]
    Closed,
}

impl BrowserError {
    /// `false` only for element-level failures; the session itself is still
    /// usable after those.
    pub fn is_fault(&self) -> bool {
        !matches!(self, BrowserError::Element(_))
    }
}

/// Convenience alias for driver results.
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Capability surface of one live browser tab.
///
/// A session is used by at most one logical attempt at a time, hence the
/// `&mut self` receivers.
#[async_trait]
pub trait BrowserSession: Send {
    type Element: Send + Sync;

    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Resolve `locator` on the current page. `Ok(None)` means the element is
    /// simply absent.
    async fn find(&mut self, locator: &Locator) -> BrowserResult<Option<Self::Element>>;

    /// Whether the element is rendered and takes up space on the page.
    async fn is_displayed(&mut self, element: &Self::Element) -> BrowserResult<bool>;

    /// PNG capture of the element's rendered box.
    async fn screenshot(&mut self, element: &Self::Element) -> BrowserResult<Vec<u8>>;

    /// PNG capture of the whole page.
    async fn page_screenshot(&mut self) -> BrowserResult<Vec<u8>>;

    /// Clear the input and type `text` into it.
    async fn fill(&mut self, element: &Self::Element, text: &str) -> BrowserResult<()>;

    async fn click(&mut self, element: &Self::Element) -> BrowserResult<()>;

    async fn page_source(&mut self) -> BrowserResult<String>;

    /// Shut the session down. Further calls fail with [`BrowserError::Closed`].
    async fn close(&mut self) -> BrowserResult<()>;
}

/// Factory for browser sessions, one per batch run.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> BrowserResult<Self::Session>;
}

/// Try each candidate in order and return the first element that resolves,
/// together with the locator that matched.
pub async fn find_first<'a, S>(
    session: &mut S,
    candidates: &'a [Locator],
) -> BrowserResult<Option<(S::Element, &'a Locator)>>
where
    S: BrowserSession,
{
    for locator in candidates {
        if let Some(element) = session.find(locator).await? {
            log::debug!("resolved element with {locator}");
            return Ok(Some((element, locator)));
        }
    }
    Ok(None)
}

/// Like [`find_first`], but skips candidates that resolve to hidden elements.
pub async fn find_first_visible<'a, S>(
    session: &mut S,
    candidates: &'a [Locator],
) -> BrowserResult<Option<(S::Element, &'a Locator)>>
where
    S: BrowserSession,
{
    for locator in candidates {
        let Some(element) = session.find(locator).await? else {
            continue;
        };
        if session.is_displayed(&element).await? {
            log::debug!("resolved visible element with {locator}");
            return Ok(Some((element, locator)));
        }
        log::debug!("{locator} matched a hidden element");
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct ProbeSession {
        present: HashSet<String>,
        hidden: HashSet<String>,
        probed: Vec<String>,
    }

    #[async_trait]
    impl BrowserSession for ProbeSession {
        type Element = String;

        async fn navigate(&mut self, _url: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn find(&mut self, locator: &Locator) -> BrowserResult<Option<String>> {
            self.probed.push(locator.as_str().to_string());
            if locator.as_str() == "boom" {
                return Err(BrowserError::Driver("socket closed".into()));
            }
            Ok(self
                .present
                .contains(locator.as_str())
                .then(|| locator.as_str().to_string()))
        }

        async fn is_displayed(&mut self, element: &String) -> BrowserResult<bool> {
            Ok(!self.hidden.contains(element))
        }

        async fn screenshot(&mut self, _element: &String) -> BrowserResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn page_screenshot(&mut self) -> BrowserResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn fill(&mut self, _element: &String, _text: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn click(&mut self, _element: &String) -> BrowserResult<()> {
            Ok(())
        }

        async fn page_source(&mut self) -> BrowserResult<String> {
            Ok(String::new())
        }

        async fn close(&mut self) -> BrowserResult<()> {
            Ok(())
        }
    }

    fn session(present: &[&str]) -> ProbeSession {
        ProbeSession {
            present: present.iter().map(|s| s.to_string()).collect(),
            hidden: HashSet::new(),
            probed: Vec::new(),
        }
    }

    #[tokio::test]
    async fn find_first_stops_at_first_match() {
        let mut probe = session(&["b", "c"]);
        let candidates = [Locator::css("a"), Locator::css("b"), Locator::css("c")];
        let (element, locator) = find_first(&mut probe, &candidates).await.unwrap().unwrap();
        assert_eq!(element, "b");
        assert_eq!(locator, &Locator::css("b"));
        assert_eq!(probe.probed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn find_first_reports_absence() {
        let mut probe = session(&[]);
        let candidates = [Locator::css("a"), Locator::xpath("//b")];
        assert!(find_first(&mut probe, &candidates).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn driver_faults_propagate() {
        let mut probe = session(&["c"]);
        let candidates = [Locator::css("boom"), Locator::css("c")];
        let err = find_first(&mut probe, &candidates).await.unwrap_err();
        assert!(matches!(err, BrowserError::Driver(_)));
    }

    #[tokio::test]
    async fn hidden_matches_fall_through_to_the_next_candidate() {
        let mut probe = session(&["input[id*='rfc']", "#entradaRFC"]);
        probe.hidden.insert("input[id*='rfc']".to_string());
        let candidates = [Locator::css("input[id*='rfc']"), Locator::css("#entradaRFC")];

        let (element, _) = find_first_visible(&mut probe, &candidates)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(element, "#entradaRFC");

        // The unchecked lookup still takes the hidden one.
        let (element, _) = find_first(&mut probe, &candidates).await.unwrap().unwrap();
        assert_eq!(element, "input[id*='rfc']");
    }

    #[tokio::test]
    async fn only_hidden_matches_count_as_absent() {
        let mut probe = session(&["a"]);
        probe.hidden.insert("a".to_string());
        let candidates = [Locator::css("a")];
        assert!(find_first_visible(&mut probe, &candidates).await.unwrap().is_none());
    }

    #[test]
    fn element_failures_are_not_faults() {
        assert!(!BrowserError::Element("node is not visible".into()).is_fault());
        assert!(BrowserError::Driver("socket closed".into()).is_fault());
        assert!(BrowserError::Closed.is_fault());
    }

    #[test]
    fn locator_display_names_strategy() {
        assert_eq!(Locator::css("img").to_string(), "css:img");
        assert_eq!(Locator::xpath("//input").to_string(), "xpath://input");
    }
}
