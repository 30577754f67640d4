use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;

use certlookup_rs::tools::{
    capture_challenge, collect_images, evaluate_prompts, fetch_page, render_report,
};
use certlookup_rs::{
    BrowserLauncher, BrowserSession, ChromiumLauncher, ConfigError, DEFAULT_PROMPTS, Defaults,
    LookupBuilder, PauseSchedule, ProviderConfig, SelectorSet,
};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "certlookup")]
#[command(author, version, about = "Look up SAT certificates for RFCs.", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    batch: BatchArgs,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// CSV with an `rfc` column
    #[arg(short, long, default_value = Defaults::INPUT)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = Defaults::OUTPUT_ROOT)]
    output: PathBuf,

    /// SAT page URL
    #[arg(long, default_value = Defaults::URL)]
    url: String,

    /// Attempts per RFC before giving up
    #[arg(long, default_value_t = Defaults::MAX_ATTEMPTS)]
    max_attempts: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Capture one challenge image from the portal
    Capture {
        #[arg(long, default_value = Defaults::URL)]
        url: String,

        /// Where to save the PNG
        #[arg(short, long, default_value = "outputs/captcha.png")]
        output: PathBuf,
    },

    /// Print the raw portal HTML
    Fetch {
        #[arg(long, default_value = Defaults::URL)]
        url: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 15)]
        timeout: u64,
    },

    /// Try every prompt variant against saved challenge images
    Prompts {
        /// Directory containing challenge PNGs
        #[arg(short, long, default_value = Defaults::OUTPUT_ROOT)]
        images: PathBuf,

        /// Report file
        #[arg(short, long, default_value = "outputs/prompt_test_results.txt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // A missing .env file is fine; the variables may come from the shell.
    let _ = dotenvy::dotenv();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .filter_module("chromiumoxide", LevelFilter::Warn)
        .init();
}

async fn run(cli: Cli) -> CliResult {
    match cli.command {
        None => run_batch(cli.batch).await,
        Some(Command::Capture { url, output }) => capture(&url, &output).await,
        Some(Command::Fetch { url, timeout }) => {
            let html = fetch_page(&url, Duration::from_secs(timeout)).await?;
            println!("{html}");
            Ok(())
        }
        Some(Command::Prompts { images, output }) => prompts(&images, &output).await,
    }
}

async fn run_batch(args: BatchArgs) -> CliResult {
    if !args.input.exists() {
        return Err(ConfigError::MissingInput(args.input).into());
    }

    let provider = ProviderConfig::from_env()?;
    log::info!("Using {} ({})", provider.kind, provider.model);

    let lookup = LookupBuilder::new()
        .with_url(args.url)
        .with_output_root(args.output)
        .with_max_attempts(args.max_attempts)
        .with_provider_config(provider)
        .build(ChromiumLauncher::new())?;

    let report = lookup.run_file(&args.input).await?;
    println!("\nAll files saved to: {}", report.run_dir.display());
    println!("Done!");
    Ok(())
}

async fn capture(url: &str, output: &Path) -> CliResult {
    let pauses = PauseSchedule::default()
        .with_after_navigation(Duration::from_secs(3))
        .with_after_recovery(Duration::from_secs(3));

    let mut session = ChromiumLauncher::new().launch().await?;
    let captured = capture_challenge(&mut session, url, &SelectorSet::default(), &pauses).await;
    if let Err(err) = session.close().await {
        log::warn!("failed to close browser session: {err}");
    }
    let captured = captured?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &captured.bytes)?;
    if captured.full_page {
        println!("Full page screenshot saved to: {}", output.display());
    } else {
        println!("Captcha saved to: {}", output.display());
    }
    Ok(())
}

async fn prompts(images: &Path, output: &Path) -> CliResult {
    let provider = ProviderConfig::from_env()?;
    let oracle = provider.build()?;

    let paths = collect_images(images)?;
    if paths.is_empty() {
        log::warn!("No captcha images found in {}", images.display());
        return Ok(());
    }
    log::info!(
        "Found {} captcha image(s), testing {} prompt(s) with {}",
        paths.len(),
        DEFAULT_PROMPTS.len(),
        provider.kind
    );

    let mut loaded = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        loaded.push((name, fs::read(path)?));
    }

    let trials = evaluate_prompts(oracle.as_ref(), DEFAULT_PROMPTS, &loaded).await;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, render_report(&trials))?;
    println!("Results saved to: {}", output.display());
    Ok(())
}
