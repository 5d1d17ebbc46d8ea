//! integrity-check: audit an EC2 fleet for policy violations
//!
//! Runs every compiled-in check concurrently against one AWS account and
//! prints the findings. Exits non-zero when any check could not complete.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use integrity_check::aws::{AwsContext, Ec2Client, get_current_account_id};
use integrity_check::checks::{self, PartialFindings};
use integrity_check::config::{
    AwsConfig, ExecutionConfig, OutputConfig, OutputFormat, PolicyConfig, RunConfig,
};
use integrity_check::{AuditReport, Checker, output};
use integrity_common::AggregateError;
use integrity_common::defaults::{DEFAULT_HOME_REGION, DEFAULT_REGION};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "integrity-check")]
#[command(about = "Audit an EC2 fleet for policy violations")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Arguments for the run command (extracted to reduce enum size)
#[derive(clap::Args, Debug)]
struct RunArgs {
    /// AWS region the client connects to
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,

    /// The only region instances may run in
    #[arg(long, default_value = DEFAULT_HOME_REGION)]
    home_region: String,

    /// Approved AMI name family (repeatable; replaces the default list)
    #[arg(long = "allowed-ami-family", value_name = "FAMILY")]
    allowed_ami_families: Vec<String>,

    /// Maximum concurrent provider calls per check (unbounded if unset)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Whether findings are still reported when some calls of a check failed
    #[arg(long, value_enum, default_value_t)]
    partial_findings: PartialFindings,

    /// Report format written to stdout
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Run only this check (repeatable)
    #[arg(long, value_name = "CHECK")]
    only: Vec<String>,

    /// Skip this check (repeatable)
    #[arg(long, value_name = "CHECK")]
    skip: Vec<String>,
}

impl From<RunArgs> for RunConfig {
    fn from(args: RunArgs) -> Self {
        let mut policy = PolicyConfig {
            home_region: args.home_region,
            ..Default::default()
        };
        if !args.allowed_ami_families.is_empty() {
            policy.allowed_ami_families = args.allowed_ami_families;
        }

        Self {
            aws: AwsConfig {
                region: args.region,
                aws_profile: args.aws_profile,
            },
            policy,
            execution: ExecutionConfig {
                max_concurrency: args.max_concurrency,
                partial_findings: args.partial_findings,
                only: args.only,
                skip: args.skip,
            },
            output: OutputConfig {
                format: args.format,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the checks against the account and print the findings
    Run(Box<RunArgs>),

    /// List the available checks
    ListChecks {
        /// Home region used to name the region check
        #[arg(long, default_value = DEFAULT_HOME_REGION)]
        home_region: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    // Only print backtrace hint if not already showing
    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        // Print backtrace if available and requested
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Print the failures of an audit, followed by any known hints
fn print_audit_error(error: &AggregateError) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {error}");
    for hint in output::error_hints(error) {
        let _ = writeln!(stderr, "  \x1b[36mHint:\x1b[0m {hint}");
    }
}

/// Log filter used when RUST_LOG is unset; AWS SDK internals only show warnings
const DEFAULT_LOG_FILTER: &str =
    "info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_ec2=warn,aws_sdk_sts=warn";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    // stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Run(run_args) => {
            let config: RunConfig = (*run_args).into();
            let report = audit(&config).await?;
            emit(&report, config.output.format)
        }
        Command::ListChecks { home_region } => {
            let policy = PolicyConfig {
                home_region,
                ..Default::default()
            };
            list_checks(&policy);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn audit(config: &RunConfig) -> Result<AuditReport> {
    if let Some(profile) = &config.aws.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let aws = AwsContext::new(&config.aws.region, config.aws.aws_profile.as_deref()).await;
    get_current_account_id(&aws.sts_client())
        .await
        .context("resolving the caller's AWS account")?;

    let provider = Arc::new(Ec2Client::from_context(&aws));
    let all = checks::all(provider, &config.policy, &config.execution.check_settings());
    let selected = checks::select(all, &config.execution.only, &config.execution.skip)?;

    info!(
        region = %config.aws.region,
        home_region = %config.policy.home_region,
        checks = selected.len(),
        max_concurrency = ?config.execution.max_concurrency,
        "Starting audit"
    );

    Ok(Checker::new(selected).run_all().await)
}

fn emit(report: &AuditReport, format: OutputFormat) -> Result<ExitCode> {
    match format {
        OutputFormat::Text => print!("{}", output::render_text(report)),
        OutputFormat::Json => println!("{}", output::render_json(report, chrono::Utc::now())?),
    }

    info!(notices = report.notices.len(), "Audit finished");

    match &report.error {
        None => Ok(ExitCode::SUCCESS),
        Some(error) => {
            warn!(failed = error.len(), "Some checks could not complete");
            print_audit_error(error);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list_checks(policy: &PolicyConfig) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Check", "Description"]);

    for (name, description) in checks::catalog(policy) {
        table.add_row(vec![name, description.to_string()]);
    }

    println!("{table}");
}
