//! Retrieval state machine.
//!
//! Drives one identifier through the lookup form: navigate, recover from a
//! stray results page, capture the challenge, solve it, submit, classify.
//! Every transient failure (no challenge image, unsolved challenge, missing
//! form controls, an element that refused a click or keystrokes, wrong answer)
//! abandons the current attempt and the loop starts over with a fresh
//! challenge. Only driver faults and artifact I/O errors escape.

use std::io;
use std::path::PathBuf;

use chrono::Local;
use thiserror::Error;

use crate::challenges::core::{ChallengeImage, PauseKind, PauseSchedule};
use crate::challenges::detectors::{PageState, classify_page};
use crate::challenges::solvers::{ChallengeSolver, RotationCursor};
use crate::config::{Defaults, SelectorSet};
use crate::external_deps::browser::{
    BrowserError, BrowserSession, find_first, find_first_visible,
};
use crate::modules::events::{
    AttemptEvent, CaptureEvent, EventDispatcher, ExhaustedEvent, LookupEvent, SolveEvent,
    SubmissionEvent, WarningEvent,
};

/// Persists captured challenge images.
pub trait ChallengeArchive: Send + Sync {
    fn store(&self, image: &ChallengeImage) -> io::Result<PathBuf>;
}

/// Collaborators borrowed for one retrieval.
#[derive(Default, Clone, Copy)]
pub struct PipelineContext<'a> {
    pub events: Option<&'a EventDispatcher>,
    pub archive: Option<&'a dyn ChallengeArchive>,
}

/// Final page reached for one identifier.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub html: String,
    /// Image from the latest attempt that got as far as capturing one.
    pub last_challenge: Option<ChallengeImage>,
    pub attempts: usize,
    pub state: PageState,
}

impl RetrievalOutcome {
    pub fn reached_results(&self) -> bool {
        self.state.is_results()
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("failed to store challenge image: {0}")]
    Archive(#[from] io::Error),
}

/// How a single attempt ended.
enum AttemptOutcome {
    Results(String),
    Retry,
}

/// Bounded-retry lookup flow for one identifier at a time.
pub struct RetrievalPipeline {
    target_url: String,
    max_attempts: usize,
    selectors: SelectorSet,
    pauses: PauseSchedule,
    solver: ChallengeSolver,
}

impl RetrievalPipeline {
    pub fn new(target_url: impl Into<String>, solver: ChallengeSolver) -> Self {
        Self {
            target_url: target_url.into(),
            max_attempts: Defaults::MAX_ATTEMPTS,
            selectors: SelectorSet::default(),
            pauses: PauseSchedule::default(),
            solver,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_pauses(mut self, pauses: PauseSchedule) -> Self {
        self.pauses = pauses;
        self
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn pauses(&self) -> &PauseSchedule {
        &self.pauses
    }

    pub fn solver(&self) -> &ChallengeSolver {
        &self.solver
    }

    /// Run up to `max_attempts` attempts for `identifier`.
    ///
    /// Returns the results page on success. After the last failed attempt
    /// the current page source is returned instead, classified as such.
    pub async fn retrieve<S: BrowserSession>(
        &self,
        session: &mut S,
        identifier: &str,
        cursor: &mut RotationCursor,
        context: PipelineContext<'_>,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        let mut last_challenge = None;

        for attempt in 1..=self.max_attempts {
            emit(
                &context,
                LookupEvent::Attempt(AttemptEvent {
                    identifier: identifier.to_string(),
                    attempt,
                    max_attempts: self.max_attempts,
                    timestamp: Local::now(),
                }),
            );

            let outcome = match self
                .attempt(session, identifier, attempt, cursor, &context, &mut last_challenge)
                .await
            {
                Err(RetrievalError::Browser(err)) if !err.is_fault() => {
                    warn(&context, identifier, attempt, &err.to_string());
                    continue;
                }
                outcome => outcome?,
            };
            if let AttemptOutcome::Results(html) = outcome {
                return Ok(RetrievalOutcome {
                    html,
                    last_challenge,
                    attempts: attempt,
                    state: PageState::ResultsPage,
                });
            }
        }

        emit(
            &context,
            LookupEvent::Exhausted(ExhaustedEvent {
                identifier: identifier.to_string(),
                attempts: self.max_attempts,
                timestamp: Local::now(),
            }),
        );

        let html = session.page_source().await?;
        let state = classify_page(&html);
        Ok(RetrievalOutcome {
            html,
            last_challenge,
            attempts: self.max_attempts,
            state,
        })
    }

    async fn attempt<S: BrowserSession>(
        &self,
        session: &mut S,
        identifier: &str,
        attempt: usize,
        cursor: &mut RotationCursor,
        context: &PipelineContext<'_>,
        last_challenge: &mut Option<ChallengeImage>,
    ) -> Result<AttemptOutcome, RetrievalError> {
        // Navigating
        session.navigate(&self.target_url).await?;
        self.pauses.wait(PauseKind::AfterNavigation).await;

        if let Some(button) = session.find(&self.selectors.return_button).await? {
            log::debug!("{identifier}: leaving stale results page");
            match session.click(&button).await {
                Ok(()) => self.pauses.wait(PauseKind::AfterRecovery).await,
                Err(err) if !err.is_fault() => {
                    log::debug!("{identifier}: return button not clickable: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }

        // CaptureChallenge
        let Some((image_element, _)) = find_first(session, &self.selectors.challenge_image).await?
        else {
            warn(context, identifier, attempt, "No captcha found");
            return Ok(AttemptOutcome::Retry);
        };
        let bytes = session.screenshot(&image_element).await?;
        let image = ChallengeImage::new(identifier, attempt, bytes);
        let archived_at = match context.archive {
            Some(archive) => Some(archive.store(&image)?),
            None => None,
        };
        emit(
            context,
            LookupEvent::Capture(CaptureEvent {
                identifier: identifier.to_string(),
                attempt,
                bytes: image.len(),
                archived_at,
                timestamp: Local::now(),
            }),
        );
        *last_challenge = Some(image.clone());

        // Solving
        log::info!("  Solving captcha...");
        let solved = self.solver.solve(image.as_bytes(), cursor).await;
        emit(
            context,
            LookupEvent::Solve(SolveEvent {
                identifier: identifier.to_string(),
                attempt,
                answer: solved.as_ref().ok().map(|solved| solved.answer.clone()),
                timestamp: Local::now(),
            }),
        );
        let answer = match solved {
            Ok(solved) => solved.answer,
            Err(err) => {
                log::debug!("{identifier}: {err}");
                return Ok(AttemptOutcome::Retry);
            }
        };

        // Submitting
        let identifier_input =
            find_first_visible(session, &self.selectors.identifier_input).await?;
        let answer_input = find_first_visible(session, &self.selectors.answer_input).await?;
        let submit_button = find_first_visible(session, &self.selectors.submit_button).await?;
        let (Some((identifier_input, _)), Some((answer_input, _)), Some((submit_button, _))) =
            (identifier_input, answer_input, submit_button)
        else {
            warn(context, identifier, attempt, "Missing form elements");
            return Ok(AttemptOutcome::Retry);
        };

        session.fill(&identifier_input, identifier).await?;
        session.fill(&answer_input, &answer).await?;
        session.click(&submit_button).await?;
        self.pauses.wait(PauseKind::AfterSubmit).await;

        // Classifying
        let html = session.page_source().await?;
        let accepted = classify_page(&html).is_results();
        emit(
            context,
            LookupEvent::Submission(SubmissionEvent {
                identifier: identifier.to_string(),
                attempt,
                accepted,
                timestamp: Local::now(),
            }),
        );

        Ok(if accepted {
            AttemptOutcome::Results(html)
        } else {
            AttemptOutcome::Retry
        })
    }
}

fn emit(context: &PipelineContext<'_>, event: LookupEvent) {
    if let Some(events) = context.events {
        events.dispatch(event);
    }
}

fn warn(context: &PipelineContext<'_>, identifier: &str, attempt: usize, message: &str) {
    emit(
        context,
        LookupEvent::Warning(WarningEvent {
            identifier: identifier.to_string(),
            attempt,
            message: message.to_string(),
            timestamp: Local::now(),
        }),
    );
}
