//! # certlookup-rs
//!
//! Batch retrieval of digital-certificate metadata for RFC tax identifiers
//! from the SAT certificate recovery portal.
//!
//! The portal gates every lookup behind an image challenge. The crate drives
//! a headless Chromium session through the lookup form, reads the challenge
//! with a vision oracle (OpenAI or Anthropic), submits, and parses the
//! results page into CSV rows.
//!
//! ## Features
//!
//! - Bounded-retry retrieval loop that absorbs wrong answers and flaky pages
//! - Prompt rotation across the whole run with response validation
//! - One provider per run, resolved from the environment at startup
//! - Run directory with a timestamped log, challenge images and results CSV
//!
//! ## Example
//!
//! ```no_run
//! use certlookup_rs::{ChromiumLauncher, LookupBuilder, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lookup = LookupBuilder::new()
//!         .with_output_root("outputs")
//!         .with_provider_config(ProviderConfig::from_env()?)
//!         .build(ChromiumLauncher::new())?;
//!     let report = lookup.run(&["ABC010101AAA".to_string()]).await?;
//!     println!("{} record(s) in {}", report.records.len(), report.csv_path.display());
//!     Ok(())
//! }
//! ```

mod lookup;

pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod modules;
pub mod results;
pub mod tools;

pub use crate::lookup::{
    BatchReport,
    CertLookup,
    LookupBuilder,
    LookupConfig,
    LookupError,
    LookupResult,
};

pub use crate::challenges::core::{
    ChallengeImage,
    DEFAULT_PROMPTS,
    PauseKind,
    PauseSchedule,
    PromptVariant,
    ValidationRejection,
    check_response,
    is_valid_response,
    prompt_by_name,
};

pub use crate::challenges::detectors::{PageState, classify_page};

pub use crate::challenges::pipeline::{
    ChallengeArchive,
    PipelineContext,
    RetrievalError,
    RetrievalOutcome,
    RetrievalPipeline,
};

pub use crate::challenges::solvers::{
    AttemptRejection,
    ChallengeSolver,
    RotationCursor,
    SolveError,
    SolvedChallenge,
};

pub use crate::config::{ConfigError, Defaults, ProviderConfig, SelectorSet, load_identifiers};

pub use crate::external_deps::browser::{
    BrowserError,
    BrowserLauncher,
    BrowserResult,
    BrowserSession,
    ChromiumLauncher,
    ChromiumSession,
    Locator,
};

pub use crate::external_deps::captcha::{
    AnthropicProvider,
    OpenAiProvider,
    OracleConfig,
    OracleError,
    OracleProvider,
    OracleResult,
    ProviderKind,
};

pub use crate::modules::{
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    LookupEvent,
    RunLog,
    RunRecord,
    RunRecordError,
    RunStats,
    StatsCollector,
};

pub use crate::results::{CertificateRecord, CSV_FIELDNAMES, extract_certificates};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
