use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use callguard::config::CallguardConfig;
use callguard::error::{classify_value, ClassifiedError, ErrorKind};
use callguard::logging::{init_logging, LoggingConfig};
use callguard::notifier::ErrorCategory;
use callguard::retry::{CallProfile, RetryPolicy};

/// Which retry ceiling to inspect
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum CliProfile {
    /// Idempotent reads
    #[default]
    Query,
    /// Writes
    Mutation,
}

impl From<CliProfile> for CallProfile {
    fn from(profile: CliProfile) -> Self {
        match profile {
            CliProfile::Query => CallProfile::Query,
            CliProfile::Mutation => CallProfile::Mutation,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "callguard")]
#[command(version)]
#[command(about = "Inspect error classification and retry schedules")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a failure given as JSON and print the result
    Classify {
        /// The raw failure, e.g. '{"code":"TOKEN_EXPIRED","message":"jwt expired"}'
        json: String,
    },
    /// Print the retry schedule for an error kind
    Backoff {
        /// Error kind, e.g. network or service_unavailable
        #[arg(long, short)]
        kind: ErrorKind,

        /// Call profile
        #[arg(long, short, default_value = "query", value_enum)]
        profile: CliProfile,
    },
}

/// Exit codes for the CLI
mod exit_codes {
    use std::process::ExitCode;

    /// Input could not be parsed (matches clap's usage error code)
    pub fn invalid_input() -> ExitCode {
        ExitCode::from(2)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyReport<'a> {
    #[serde(flatten)]
    error: &'a ClassifiedError,
    category: ErrorCategory,
    retryable: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match CallguardConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {}", err);
                return exit_codes::invalid_input();
            }
        },
        None => CallguardConfig::default(),
    };

    init_logging(LoggingConfig::from_settings(&config.logging, cli.verbose));
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Classify { json } => run_classify(&json, &config),
        Commands::Backoff { kind, profile } => run_backoff(kind, profile.into(), &config),
    }
}

fn run_classify(json: &str, config: &CallguardConfig) -> ExitCode {
    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("error: input is not valid JSON: {}", err);
            return exit_codes::invalid_input();
        }
    };

    let error = classify_value(&value);
    let policy = RetryPolicy::from_settings(&config.retry, CallProfile::Query);
    let report = ClassifyReport {
        error: &error,
        category: ErrorCategory::from_kind(error.kind()),
        retryable: policy.should_retry(error.kind()),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: failed to serialize classification: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_backoff(kind: ErrorKind, profile: CallProfile, config: &CallguardConfig) -> ExitCode {
    let policy = RetryPolicy::from_settings(&config.retry, profile);
    let schedule = policy.schedule(kind);

    if schedule.is_empty() {
        println!("{} is not retried ({} profile)", kind, profile);
        return ExitCode::SUCCESS;
    }

    println!(
        "{} ({} profile): {} attempts total",
        kind,
        profile,
        schedule.len() + 1
    );
    for (index, delay) in schedule.iter().enumerate() {
        println!("  retry {} after {} ms", index + 1, delay.as_millis());
    }
    ExitCode::SUCCESS
}
