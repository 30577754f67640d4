//! Configuration: portal defaults, element selectors, provider credentials
//! and the identifier input file.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::external_deps::browser::Locator;
use crate::external_deps::captcha::{OracleConfig, OracleError, OracleProvider, ProviderKind};

/// Built-in defaults for the command line and the lookup builder.
pub struct Defaults;

impl Defaults {
    pub const URL: &'static str =
        "https://portalsat.plataforma.sat.gob.mx/RecuperacionDeCertificados/faces/recuperaRFC.xhtml";
    pub const INPUT: &'static str = "input/rfcs.csv";
    pub const OUTPUT_ROOT: &'static str = "outputs";
    pub const MAX_ATTEMPTS: usize = 5;
    pub const CHALLENGE_DIR: &'static str = "captchas";
}

/// Errors raised while resolving configuration or reading input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Set OPENAI_API_KEY or ANTHROPIC_API_KEY environment variable.")]
    MissingCredentials,
    #[error("{} not found", .0.display())]
    MissingInput(PathBuf),
    #[error("input file has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse input: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Ordered element candidates for the lookup form. The first candidate that
/// resolves wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub challenge_image: Vec<Locator>,
    pub identifier_input: Vec<Locator>,
    pub answer_input: Vec<Locator>,
    pub submit_button: Vec<Locator>,
    /// Button left on screen by a previous results page.
    pub return_button: Locator,
}

impl Default for SelectorSet {
    fn default() -> Self {
        fn css(selectors: &[&str]) -> Vec<Locator> {
            selectors.iter().map(|s| Locator::css(*s)).collect()
        }

        Self {
            challenge_image: css(&[
                "img[src*='captcha']",
                "img[src*='Captcha']",
                "img[src*='jcaptcha']",
            ]),
            identifier_input: css(&[
                "input[id='consultaCertificados:entradaRFC']",
                "input[id*='entradaRFC']",
                "input[id*='rfc']",
            ]),
            answer_input: css(&[
                "input[id='consultaCertificados:verCaptchaRFC']",
                "input[id*='verCaptcha']",
                "input[id*='Captcha'][type='text']",
            ]),
            submit_button: css(&[
                "input[id='consultaCertificados:botonRFC']",
                "input[id*='botonRFC']",
            ]),
            return_button: Locator::xpath("//input[@value='Regresar']"),
        }
    }
}

/// Oracle vendor, credentials and model resolved once at startup.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub oracle: OracleConfig,
}

impl ProviderConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve through an arbitrary variable lookup. The first vendor in
    /// [`ProviderKind::PRIORITY`] with a non-blank key wins.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        for kind in ProviderKind::PRIORITY {
            if let Some(api_key) = present(kind.api_key_var()) {
                let model = present(kind.model_var())
                    .unwrap_or_else(|| kind.default_model().to_string());
                return Ok(Self {
                    kind,
                    api_key: api_key.trim().to_string(),
                    model,
                    oracle: OracleConfig::default(),
                });
            }
        }
        Err(ConfigError::MissingCredentials)
    }

    pub fn with_oracle_config(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    /// Instantiate the adapter for the resolved vendor.
    pub fn build(&self) -> Result<Arc<dyn OracleProvider>, ConfigError> {
        Ok(self
            .kind
            .build(self.api_key.clone(), self.model.clone(), self.oracle.clone())?)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("oracle", &self.oracle)
            .finish()
    }
}

const IDENTIFIER_COLUMN: &str = "rfc";

#[derive(Debug, Deserialize)]
struct InputRow {
    #[serde(default)]
    rfc: Option<String>,
}

/// Read the `rfc` column of an input CSV.
///
/// Every data row yields one entry, blank ones included, so positions line
/// up with the file. Callers skip the blanks.
pub fn load_identifiers(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let identifiers = read_identifiers(file)?;
    log::debug!("loaded {} row(s) from {}", identifiers.len(), path.display());
    Ok(identifiers)
}

/// Reader-level variant of [`load_identifiers`].
pub fn read_identifiers<R: std::io::Read>(reader: R) -> Result<Vec<String>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    if !reader.headers()?.iter().any(|header| header == IDENTIFIER_COLUMN) {
        return Err(ConfigError::MissingColumn(IDENTIFIER_COLUMN));
    }

    let mut identifiers = Vec::new();
    for row in reader.deserialize::<InputRow>() {
        let row = row?;
        identifiers.push(row.rfc.unwrap_or_default());
    }
    Ok(identifiers)
}
