//! Batch orchestration.
//!
//! [`CertLookup`] owns everything that lives for a whole run: the browser
//! session, the prompt rotation cursor, the run record and the event
//! handlers. Identifiers are processed strictly one after another; a failure
//! for one identifier becomes an `ERROR:` row and the batch moves on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;

use crate::challenges::core::{PauseKind, PauseSchedule};
use crate::challenges::pipeline::{PipelineContext, RetrievalError, RetrievalPipeline};
use crate::challenges::solvers::{ChallengeSolver, RotationCursor};
use crate::config::{ConfigError, Defaults, ProviderConfig, SelectorSet, load_identifiers};
use crate::external_deps::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::external_deps::captcha::OracleProvider;
use crate::modules::events::{
    CompletedEvent, ErrorEvent, EventDispatcher, EventHandler, IdentifierEvent, LoggingHandler,
    LookupEvent, RecordEvent, StatsHandler,
};
use crate::modules::metrics::{RunStats, StatsCollector};
use crate::modules::run_record::{RunLog, RunRecord, RunRecordError};
use crate::results::{CertificateRecord, extract_certificates};

/// Result alias used by the orchestration layer.
pub type LookupResult<T> = Result<T, LookupError>;

/// Failures that stop a whole run.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no oracle provider configured")]
    MissingProvider,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    RunRecord(#[from] RunRecordError),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub url: String,
    pub output_root: PathBuf,
    pub max_attempts: usize,
    pub pauses: PauseSchedule,
    pub selectors: SelectorSet,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: Defaults::URL.to_string(),
            output_root: PathBuf::from(Defaults::OUTPUT_ROOT),
            max_attempts: Defaults::MAX_ATTEMPTS,
            pauses: PauseSchedule::default(),
            selectors: SelectorSet::default(),
        }
    }
}

/// Fluent builder for [`CertLookup`].
#[derive(Default)]
pub struct LookupBuilder {
    config: LookupConfig,
    provider: Option<Arc<dyn OracleProvider>>,
    provider_label: Option<&'static str>,
    provider_config: Option<ProviderConfig>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl LookupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: LookupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.output_root = root.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    pub fn with_pauses(mut self, pauses: PauseSchedule) -> Self {
        self.config.pauses = pauses;
        self
    }

    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.config.selectors = selectors;
        self
    }

    /// Use an already constructed oracle.
    pub fn with_provider(mut self, provider: Arc<dyn OracleProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build the oracle from resolved credentials when the lookup is built.
    pub fn with_provider_config(mut self, config: ProviderConfig) -> Self {
        self.provider_label = Some(config.kind.display_name());
        self.provider_config = Some(config);
        self
    }

    /// Register an additional event handler for every run.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build<L: BrowserLauncher>(self, launcher: L) -> LookupResult<CertLookup<L>> {
        let provider = match (self.provider, &self.provider_config) {
            (Some(provider), _) => provider,
            (None, Some(config)) => config.build()?,
            (None, None) => return Err(LookupError::MissingProvider),
        };

        let mut solver = ChallengeSolver::new(provider);
        if let Some(label) = self.provider_label {
            solver = solver.with_label(label);
        }

        let pipeline = RetrievalPipeline::new(self.config.url.clone(), solver)
            .with_max_attempts(self.config.max_attempts)
            .with_selectors(self.config.selectors.clone())
            .with_pauses(self.config.pauses);

        Ok(CertLookup {
            config: self.config,
            pipeline,
            launcher,
            handlers: self.handlers,
        })
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_dir: PathBuf,
    pub csv_path: PathBuf,
    pub records: Vec<CertificateRecord>,
    pub stats: RunStats,
}

/// Certificate lookup over a batch of identifiers.
pub struct CertLookup<L: BrowserLauncher> {
    config: LookupConfig,
    pipeline: RetrievalPipeline,
    launcher: L,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl<L: BrowserLauncher> CertLookup<L> {
    pub fn builder() -> LookupBuilder {
        LookupBuilder::new()
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &RetrievalPipeline {
        &self.pipeline
    }

    /// Read identifiers from an input CSV and run them.
    pub async fn run_file(&self, input: impl AsRef<Path>) -> LookupResult<BatchReport> {
        let input = input.as_ref();
        let identifiers = load_identifiers(input)?;
        self.run_batch(&identifiers, Some(input)).await
    }

    pub async fn run(&self, identifiers: &[String]) -> LookupResult<BatchReport> {
        self.run_batch(identifiers, None).await
    }

    async fn run_batch(
        &self,
        identifiers: &[String],
        input: Option<&Path>,
    ) -> LookupResult<BatchReport> {
        let record = RunRecord::create(&self.config.output_root)?;
        let run_log = record.log();
        let stats = StatsCollector::new();
        let events = self.dispatcher(&run_log, &stats);

        say(&run_log, format!("Run folder: {}", record.run_dir().display()));
        if let Some(input) = input {
            say(&run_log, format!("Input file: {}", input.display()));
        }
        say(&run_log, format!("Processing {} RFC(s)", identifiers.len()));
        say(&run_log, "");

        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(err) => {
                run_log.error(format!("Browser launch failed: {err}"));
                record.finish()?;
                return Err(err.into());
            }
        };

        let context = PipelineContext {
            events: Some(&events),
            archive: Some(&record),
        };
        let records = self
            .process_all(&mut session, identifiers, &events, context, &stats)
            .await;

        if let Err(err) = session.close().await {
            log::warn!("failed to close browser session: {err}");
        }

        let csv_path = match record.write_csv(&records) {
            Ok(path) => path,
            Err(err) => {
                run_log.error(format!("Failed to write results: {err}"));
                record.finish()?;
                return Err(err.into());
            }
        };
        say(
            &run_log,
            format!("Results: {} ({} records)", csv_path.display(), records.len()),
        );

        let snapshot = stats.snapshot();
        say(&run_log, format!("Summary: {snapshot}"));
        record.finish()?;
        log::info!("All files saved to: {}", record.run_dir().display());

        Ok(BatchReport {
            run_dir: record.run_dir().to_path_buf(),
            csv_path,
            records,
            stats: snapshot,
        })
    }

    async fn process_all(
        &self,
        session: &mut L::Session,
        identifiers: &[String],
        events: &EventDispatcher,
        context: PipelineContext<'_>,
        stats: &StatsCollector,
    ) -> Vec<CertificateRecord> {
        let mut cursor = RotationCursor::new();
        let mut records = Vec::new();
        let total = identifiers.len();

        for (index, raw) in identifiers.iter().enumerate() {
            let position = index + 1;
            let identifier = raw.trim();
            if identifier.is_empty() {
                continue;
            }

            events.dispatch(LookupEvent::Identifier(IdentifierEvent {
                identifier: identifier.to_string(),
                position,
                timestamp: Local::now(),
            }));

            let before = records.len();
            match self
                .lookup_one(session, identifier, &mut cursor, context)
                .await
            {
                Ok(found) => {
                    for certificate in &found {
                        events.dispatch(LookupEvent::Record(RecordEvent {
                            identifier: identifier.to_string(),
                            serial: certificate.serial_number.clone(),
                            status: certificate.status.clone(),
                            timestamp: Local::now(),
                        }));
                    }
                    records.extend(found);
                }
                Err(err) => {
                    events.dispatch(LookupEvent::Error(ErrorEvent {
                        identifier: identifier.to_string(),
                        error: err.to_string(),
                        timestamp: Local::now(),
                    }));
                    let failed = CertificateRecord::error(identifier, &err);
                    stats.record_status(&failed.status);
                    records.push(failed);
                }
            }

            events.dispatch(LookupEvent::Completed(CompletedEvent {
                identifier: identifier.to_string(),
                records: records.len() - before,
                timestamp: Local::now(),
            }));
            if position < total {
                self.config.pauses.wait(PauseKind::BetweenIdentifiers).await;
            }
        }

        records
    }

    async fn lookup_one(
        &self,
        session: &mut L::Session,
        identifier: &str,
        cursor: &mut RotationCursor,
        context: PipelineContext<'_>,
    ) -> Result<Vec<CertificateRecord>, RetrievalError> {
        let outcome = self
            .pipeline
            .retrieve(session, identifier, cursor, context)
            .await?;
        Ok(extract_certificates(&outcome.html, identifier))
    }

    fn dispatcher(&self, run_log: &Arc<RunLog>, stats: &StatsCollector) -> EventDispatcher {
        let mut events = EventDispatcher::new();
        events.register_handler(Arc::new(LoggingHandler));
        events.register_handler(run_log.clone());
        events.register_handler(Arc::new(StatsHandler::new(stats.clone())));
        for handler in &self.handlers {
            events.register_handler(handler.clone());
        }
        events
    }
}

/// Console and run-log line outside the event stream.
fn say(run_log: &RunLog, message: impl AsRef<str>) {
    let message = message.as_ref();
    log::info!("{message}");
    run_log.info(message);
}
