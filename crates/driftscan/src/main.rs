//! driftscan: find AWS resources that CloudFormation does not manage
//!
//! Scans an account for unmanaged resources, audits stacks whose branch is
//! gone, lists per-stack resource types, checks Lambda packages and
//! summarises recent submissions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use driftscan::config::{
    self, AuditConfig, CommonConfig, LambdaPackagesConfig, ResourceTypesConfig, ScanConfig,
    SubmissionsConfig,
};
use driftscan::submissions::App;
use driftscan::{audit, lambda_packages, resource_types, scan, submissions};
use driftscan_common::defaults::{
    DEFAULT_EXCLUDED_STACK_PREFIX, DEFAULT_GITHUB_OWNER, DEFAULT_KIND_CONCURRENCY,
    DEFAULT_OUTPUT_DIR, DEFAULT_REGION, DEFAULT_RESOURCE_TYPE_STACK_FILTERS,
    DEFAULT_STACK_EXCEPTIONS, DEFAULT_SUBMISSION_DAYS,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "driftscan")]
#[command(about = "Find AWS resources not managed by CloudFormation")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true)]
    aws_profile: Option<String>,

    /// Directory for report files
    #[arg(long, global = true, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Initial backoff after a rate-limited call, in milliseconds
    #[arg(long, global = true)]
    retry_base_ms: Option<u64>,

    /// Maximum backoff between retries, in milliseconds
    #[arg(long, global = true)]
    retry_max_ms: Option<u64>,

    /// Retries of one rate-limited page before giving up
    #[arg(long, global = true)]
    max_retries: Option<usize>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl From<CommonArgs> for CommonConfig {
    fn from(args: CommonArgs) -> Self {
        Self {
            region: args.region,
            aws_profile: args.aws_profile,
            output_dir: args.output_dir,
            retry: config::retry_policy(args.retry_base_ms, args.retry_max_ms, args.max_retries),
        }
    }
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Scan profile JSON (default: the built-in profile)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Exit with status 2 when unmanaged resources are found
    #[arg(long)]
    fail_on_unmanaged: bool,

    /// Number of resource kinds collected at once
    #[arg(long, default_value_t = DEFAULT_KIND_CONCURRENCY)]
    concurrency: usize,
}

#[derive(clap::Args, Debug)]
struct AuditArgs {
    /// Repository whose branches are matched against stack names
    repo: String,

    /// GitHub organisation owning the repository
    #[arg(long, default_value = DEFAULT_GITHUB_OWNER)]
    owner: String,

    /// Stacks starting with this prefix (any case) are never orphans
    #[arg(long, default_value = DEFAULT_EXCLUDED_STACK_PREFIX)]
    exclude_prefix: String,

    /// Stack name that is never an orphan (repeatable; default: cbj-delete-snapshot)
    #[arg(long = "exception")]
    exceptions: Vec<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ResourceTypesArgs {
    /// Stack name fragment to select (repeatable; default: main, master, val, prod)
    #[arg(long = "filter")]
    filters: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct LambdaPackagesArgs {
    /// Stack whose Lambda functions are checked
    stack: String,
}

#[derive(clap::Args, Debug)]
struct SubmissionsArgs {
    /// Application to query
    #[arg(value_enum)]
    app: App,

    /// Environment (branch) name, e.g. main or production
    environment: String,

    /// Look-back window in days
    #[arg(long, default_value_t = DEFAULT_SUBMISSION_DAYS)]
    days: i64,
}

fn or_defaults(values: Vec<String>, defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        values
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report resources neither declared by a stack nor excluded
    Scan(ScanArgs),

    /// Report stacks with no matching branch in a GitHub repository
    AuditStacks(AuditArgs),

    /// Write the resource types of selected stacks, one file per stack
    ResourceTypes(ResourceTypesArgs),

    /// Flag Lambda zip packages of a stack that hold only node_modules
    LambdaPackages(LambdaPackagesArgs),

    /// Summarise an application's recent submissions
    Submissions(SubmissionsArgs),
}

/// How a successful run should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Clean,
    /// Unmanaged resources or broken packages were reported
    Findings,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(RunStatus::Clean) => {}
        Ok(RunStatus::Findings) => std::process::exit(2),
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

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
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Log filter: `RUST_LOG` when set, otherwise info (debug with `-v`) with the
/// SDK internals held at warn
fn log_filter(verbose: bool, rust_log: Option<&str>) -> Result<EnvFilter> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let builder = EnvFilter::builder().with_default_directive(level.into());

    match rust_log {
        Some(directives) if !directives.trim().is_empty() => Ok(builder.parse_lossy(directives)),
        // SDK internals are noisy at info
        _ => Ok(builder
            .parse_lossy("")
            .add_directive("aws_config=warn".parse()?)
            .add_directive("aws_smithy_runtime=warn".parse()?)
            .add_directive("aws_sdk=warn".parse()?)),
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(verbose, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
    Ok(())
}

async fn run() -> Result<RunStatus> {
    let args = Args::parse();
    init_tracing(args.common.verbose)?;

    if let Some(profile) = &args.common.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }
    let common = CommonConfig::from(args.common);

    match args.command {
        Command::Scan(scan_args) => {
            let config = ScanConfig {
                common,
                profile_path: scan_args.profile,
                fail_on_unmanaged: scan_args.fail_on_unmanaged,
                kind_concurrency: scan_args.concurrency,
            };
            let outcome = scan::scan(&config).await?;
            if config.fail_on_unmanaged && outcome.unmanaged_total() > 0 {
                return Ok(RunStatus::Findings);
            }
        }

        Command::AuditStacks(audit_args) => {
            let config = AuditConfig {
                common,
                repo: audit_args.repo,
                owner: audit_args.owner,
                github_token: audit_args.github_token.unwrap_or_default(),
                excluded_prefix: audit_args.exclude_prefix,
                exceptions: or_defaults(audit_args.exceptions, DEFAULT_STACK_EXCEPTIONS),
            };
            audit::audit_stacks(&config).await?;
        }

        Command::ResourceTypes(types_args) => {
            let config = ResourceTypesConfig {
                common,
                stack_filters: or_defaults(types_args.filters, DEFAULT_RESOURCE_TYPE_STACK_FILTERS),
            };
            resource_types::list_resource_types(&config).await?;
        }

        Command::LambdaPackages(package_args) => {
            let config = LambdaPackagesConfig {
                common,
                stack: package_args.stack,
            };
            let summary = lambda_packages::check_lambda_packages(&config).await?;
            if !summary.offenders().is_empty() {
                return Ok(RunStatus::Findings);
            }
        }

        Command::Submissions(submission_args) => {
            let config = SubmissionsConfig {
                common,
                app: submission_args.app,
                environment: submission_args.environment,
                days: submission_args.days,
            };
            submissions::query_submissions(&config).await?;
        }
    }

    Ok(RunStatus::Clean)
}
