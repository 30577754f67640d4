//! Diagnostic helpers behind the auxiliary CLI subcommands.
//!
//! - capture one challenge image from the live portal,
//! - fetch the raw portal HTML over plain HTTP,
//! - run every prompt variant against saved challenge images.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;

use crate::challenges::core::{PauseKind, PauseSchedule, PromptVariant, check_response};
use crate::config::SelectorSet;
use crate::external_deps::browser::{BrowserResult, BrowserSession, find_first};
use crate::external_deps::captcha::OracleProvider;

const FETCH_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Image grabbed by [`capture_challenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedChallenge {
    pub bytes: Vec<u8>,
    /// The challenge element could not be located; `bytes` is a full-page
    /// screenshot instead.
    pub full_page: bool,
}

/// Open the lookup form and screenshot its challenge image.
pub async fn capture_challenge<S: BrowserSession>(
    session: &mut S,
    url: &str,
    selectors: &SelectorSet,
    pauses: &PauseSchedule,
) -> BrowserResult<CapturedChallenge> {
    log::info!("Navigating to {url}...");
    session.navigate(url).await?;
    pauses.wait(PauseKind::AfterNavigation).await;

    if let Some(button) = session.find(&selectors.return_button).await? {
        log::info!("Found 'Regresar' button, clicking to go to input form...");
        session.click(&button).await?;
        pauses.wait(PauseKind::AfterRecovery).await;
    }

    match find_first(session, &selectors.challenge_image).await? {
        Some((element, locator)) => {
            log::info!("Found captcha with selector: {}", locator.as_str());
            Ok(CapturedChallenge {
                bytes: session.screenshot(&element).await?,
                full_page: false,
            })
        }
        None => {
            log::warn!("Could not find captcha element, taking full page screenshot...");
            Ok(CapturedChallenge {
                bytes: session.page_screenshot().await?,
                full_page: true,
            })
        }
    }
}

/// Download the page body. Certificate verification is disabled because the
/// portal's chain does not validate.
pub async fn fetch_page(url: &str, timeout: Duration) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .user_agent(FETCH_USER_AGENT)
        .build()?;
    client.get(url).send().await?.error_for_status()?.text().await
}

/// Saved challenge images in `dir`, sorted by name.
pub fn collect_images(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    images.sort();
    Ok(images)
}

/// One prompt variant tried against one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTrial {
    pub image: String,
    pub prompt: &'static str,
    /// Trimmed oracle response, or `ERROR: <message>`.
    pub response: String,
    pub valid: bool,
}

/// Run every variant against every image, one call each.
pub async fn evaluate_prompts(
    provider: &dyn OracleProvider,
    prompts: &[PromptVariant],
    images: &[(String, Vec<u8>)],
) -> Vec<PromptTrial> {
    let mut trials = Vec::with_capacity(prompts.len() * images.len());
    for (image, bytes) in images {
        log::info!("Image: {image}");
        for prompt in prompts {
            let (response, valid) = match provider.solve(bytes, prompt.text).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    let valid = check_response(&text).is_ok();
                    (text, valid)
                }
                Err(err) => (format!("ERROR: {err}"), false),
            };
            log::info!(
                "  {} {}: {}",
                if valid { "✓" } else { "?" },
                prompt.name,
                response.chars().take(60).collect::<String>()
            );
            trials.push(PromptTrial {
                image: image.clone(),
                prompt: prompt.name,
                response,
                valid,
            });
        }
    }
    trials
}

/// Plain-text report grouped by image.
pub fn render_report(trials: &[PromptTrial]) -> String {
    let rule = "=".repeat(60);
    let mut report = format!(
        "Prompt Testing Results - {}\n{rule}\n\n",
        Local::now().format("%Y-%m-%dT%H:%M:%S")
    );

    let mut current: Option<&str> = None;
    for trial in trials {
        if current != Some(trial.image.as_str()) {
            if current.is_some() {
                report.push('\n');
            }
            let _ = writeln!(report, "Image: {}\n{}", trial.image, "-".repeat(40));
            current = Some(trial.image.as_str());
        }
        let _ = writeln!(
            report,
            "\n[{}] {}\nResponse: {}",
            trial.prompt,
            if trial.valid { "valid" } else { "invalid" },
            trial.response
        );
    }

    let valid = trials.iter().filter(|trial| trial.valid).count();
    let _ = writeln!(report, "\n{rule}\n{valid}/{} valid response(s)", trials.len());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::DEFAULT_PROMPTS;
    use crate::external_deps::browser::Locator;
    use crate::external_deps::captcha::{OracleError, OracleResult};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StaticPage {
        has_challenge: bool,
    }

    #[async_trait]
    impl BrowserSession for StaticPage {
        type Element = ();

        async fn navigate(&mut self, _url: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn find(&mut self, locator: &Locator) -> BrowserResult<Option<()>> {
            Ok((self.has_challenge && locator.as_str().starts_with("img")).then_some(()))
        }

        async fn is_displayed(&mut self, _element: &()) -> BrowserResult<bool> {
            Ok(true)
        }

        async fn screenshot(&mut self, _element: &()) -> BrowserResult<Vec<u8>> {
            Ok(b"element".to_vec())
        }

        async fn page_screenshot(&mut self) -> BrowserResult<Vec<u8>> {
            Ok(b"page".to_vec())
        }

        async fn fill(&mut self, _element: &(), _text: &str) -> BrowserResult<()> {
            Ok(())
        }

        async fn click(&mut self, _element: &()) -> BrowserResult<()> {
            Ok(())
        }

        async fn page_source(&mut self) -> BrowserResult<String> {
            Ok(String::new())
        }

        async fn close(&mut self) -> BrowserResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn capture_falls_back_to_full_page() {
        let selectors = SelectorSet::default();
        let pauses = PauseSchedule::none();

        let mut page = StaticPage { has_challenge: true };
        let captured = capture_challenge(&mut page, "https://portal.test", &selectors, &pauses)
            .await
            .unwrap();
        assert_eq!(captured.bytes, b"element");
        assert!(!captured.full_page);

        let mut page = StaticPage { has_challenge: false };
        let captured = capture_challenge(&mut page, "https://portal.test", &selectors, &pauses)
            .await
            .unwrap();
        assert_eq!(captured.bytes, b"page");
        assert!(captured.full_page);
    }

    struct EchoOracle;

    #[async_trait]
    impl OracleProvider for EchoOracle {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn solve(&self, image: &[u8], prompt: &str) -> OracleResult {
            if prompt.contains("Oracle of Symbols") {
                return Err(OracleError::Other("rate limited".into()));
            }
            Ok(format!(" {} ", String::from_utf8_lossy(image)))
        }
    }

    #[tokio::test]
    async fn evaluates_every_prompt_on_every_image() {
        let images = vec![
            ("a.png".to_string(), b"Xy7k".to_vec()),
            ("b.png".to_string(), b"this is far too long".to_vec()),
        ];
        let trials = evaluate_prompts(&EchoOracle, DEFAULT_PROMPTS, &images).await;

        assert_eq!(trials.len(), 6);
        assert_eq!(trials[0].response, "Xy7k");
        assert!(trials[0].valid);
        assert!(!trials[3].valid);
        let failed = trials
            .iter()
            .find(|trial| trial.prompt == "oracle_vision")
            .unwrap();
        assert_eq!(failed.response, "ERROR: oracle error: rate limited");
        assert!(!failed.valid);

        let report = render_report(&trials);
        assert!(report.contains("Image: a.png"));
        assert!(report.contains("[ancient_scribe] valid\nResponse: Xy7k"));
        assert!(report.trim_end().ends_with("2/6 valid response(s)"));
    }

    #[test]
    fn collects_only_png_files_in_order() {
        let dir = tempdir().unwrap();
        for name in ["b_attempt1.png", "a_attempt2.PNG", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let images = collect_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_attempt2.PNG", "b_attempt1.png"]);
    }
}
