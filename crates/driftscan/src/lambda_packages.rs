//! Lambda deployment packages that hold nothing but `node_modules`
//!
//! A zip whose only top-level entry is `node_modules` was bundled without
//! its handler code. Every function declared by one stack is fetched and
//! its package inspected; functions packaged as container images are
//! skipped.

use std::collections::BTreeSet;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use aws_sdk_lambda::types::PackageType;
use backon::Retryable;
use driftscan_common::identity::sanitize_file_component;
use futures::TryStreamExt;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::aws::context::AwsContext;
use crate::aws::error::AwsError;
use crate::aws::paginate::RetryPolicy;
use crate::aws::stacks::StackCatalog;
use crate::config::LambdaPackagesConfig;
use crate::report::ReportWriter;

const LAMBDA_FUNCTION_TYPE: &str = "AWS::Lambda::Function";

/// Deployment package of one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Package {
    /// Downloaded zip archive
    Zip(Vec<u8>),
    /// Any other package type, by name
    Other(String),
}

/// Functions of a stack and their packages
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait FunctionSource: Send + Sync {
    async fn stack_functions(&self, stack: &str) -> Result<Vec<String>>;
    async fn package(&self, function: &str) -> Result<Package>;
}

/// Fetches packages through GetFunction and the presigned code URL
#[derive(Debug, Clone)]
pub struct LambdaPackageSource {
    catalog: StackCatalog,
    lambda: aws_sdk_lambda::Client,
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl LambdaPackageSource {
    pub fn new(ctx: &AwsContext, policy: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("driftscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            catalog: StackCatalog::new(ctx, policy),
            lambda: ctx.lambda_client(),
            http,
            policy,
        })
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(location)
            .send()
            .await
            .context("Failed to download code")?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} downloading code", status.as_u16());
        }
        let bytes = response.bytes().await.context("Failed to read code archive")?;
        Ok(bytes.to_vec())
    }
}

impl FunctionSource for LambdaPackageSource {
    async fn stack_functions(&self, stack: &str) -> Result<Vec<String>> {
        self.catalog
            .resources(stack)
            .try_filter_map(|r| async move {
                Ok((r.resource_type == LAMBDA_FUNCTION_TYPE)
                    .then_some(r.physical_id)
                    .flatten())
            })
            .try_collect()
            .await
            .with_context(|| format!("Failed to list resources of {stack}"))
    }

    async fn package(&self, function: &str) -> Result<Package> {
        let out = (|| async {
            self.lambda
                .get_function()
                .function_name(function)
                .send()
                .await
                .map_err(AwsError::from_sdk)
        })
        .retry(self.policy.backoff())
        .when(AwsError::is_retryable)
        .await
        .with_context(|| format!("GetFunction failed for {function}"))?;

        let package_type = out.configuration().and_then(|c| c.package_type());
        if package_type != Some(&PackageType::Zip) {
            let name = package_type.map_or("unknown", |p| p.as_str());
            return Ok(Package::Other(name.to_string()));
        }
        let Some(location) = out.code().and_then(|c| c.location()) else {
            bail!("GetFunction returned no code location");
        };
        debug!(function = %function, "Downloading code");
        Ok(Package::Zip(self.download(location).await?))
    }
}

/// True if the archive's only top-level entry is `node_modules`.
///
/// Leading `./` and `/` are ignored and both separators split paths. An
/// empty archive is not flagged.
pub fn only_node_modules(archive: &[u8]) -> Result<bool, ZipError> {
    let zip = ZipArchive::new(Cursor::new(archive))?;
    let top_level: BTreeSet<&str> = zip.file_names().filter_map(top_level_entry).collect();
    Ok(top_level.len() == 1 && top_level.contains("node_modules"))
}

fn top_level_entry(name: &str) -> Option<&str> {
    let clean = name
        .strip_prefix('.')
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(name)
        .trim_start_matches('/');
    clean.split(['/', '\\']).next().filter(|top| !top.is_empty())
}

/// Verdict on one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageCheck {
    Clean,
    OnlyNodeModules,
    Ignored(String),
    Failed(String),
}

impl PackageCheck {
    pub fn from_package(package: Result<Package>) -> Self {
        match package {
            Ok(Package::Zip(bytes)) => match only_node_modules(&bytes) {
                Ok(true) => PackageCheck::OnlyNodeModules,
                Ok(false) => PackageCheck::Clean,
                Err(e) => PackageCheck::Failed(format!("Unreadable code archive: {e}")),
            },
            Ok(Package::Other(kind)) => PackageCheck::Ignored(format!(
                "This only checks zip file package types, this function is a {kind}"
            )),
            Err(e) => PackageCheck::Failed(format!("{e:#}")),
        }
    }

    /// Report line for `function`
    pub fn line(&self, function: &str) -> String {
        match self {
            PackageCheck::Clean => format!("OK  {function}"),
            PackageCheck::OnlyNodeModules => format!("ONLY_NODE_MODULES  {function}"),
            PackageCheck::Ignored(reason) => format!("IGNORING  {function}  {reason}"),
            PackageCheck::Failed(error) => format!("ERROR     {function}  {error}"),
        }
    }
}

/// Checked functions in stack order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSummary {
    pub checks: Vec<(String, PackageCheck)>,
}

impl PackageSummary {
    /// Functions whose package holds only `node_modules`
    pub fn offenders(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, check)| *check == PackageCheck::OnlyNodeModules)
            .map(|(function, _)| function.as_str())
            .collect()
    }
}

/// `lambda-packages-<sanitized stack>.txt`
pub fn packages_file_name(stack: &str) -> String {
    format!("lambda-packages-{}.txt", sanitize_file_component(stack))
}

/// Check every function of `stack` and write one line each, then a summary.
///
/// A function that cannot be fetched or read gets an ERROR line and the
/// rest are still checked. Failing to list the stack ends the run.
pub async fn write_package_report(
    source: &impl FunctionSource,
    stack: &str,
    report: &mut ReportWriter,
) -> Result<PackageSummary> {
    report.line(format!("Stack: {stack}"))?;
    let functions = source.stack_functions(stack).await?;
    let mut summary = PackageSummary::default();
    if functions.is_empty() {
        report.line("No Lambda functions found in this stack.")?;
        return Ok(summary);
    }

    for function in functions {
        let check = PackageCheck::from_package(source.package(&function).await);
        match &check {
            PackageCheck::Failed(error) => warn!(function = %function, error = %error, "Package check failed"),
            PackageCheck::OnlyNodeModules => warn!(function = %function, "Package holds only node_modules"),
            _ => debug!(function = %function, verdict = ?check, "Checked package"),
        }
        report.line(check.line(&function))?;
        summary.checks.push((function, check));
    }

    let offenders = summary.offenders();
    report.lines([
        String::new(),
        "Summary".to_string(),
        format!("  Total functions:   {}", summary.checks.len()),
        format!("  Problem functions: {}", offenders.len()),
    ])?;
    if !offenders.is_empty() {
        report.lines([String::new(), "Functions with only node_modules:".to_string()])?;
        report.lines(offenders.iter().map(|function| format!("  - {function}")))?;
    }
    report.blank()?;
    report.line(format!("Report saved to: {}", report.path().display()))?;
    Ok(summary)
}

/// The `lambda-packages` command
pub async fn check_lambda_packages(config: &LambdaPackagesConfig) -> Result<PackageSummary> {
    config.validate()?;

    let ctx = config.common.aws_context().await;
    let source = LambdaPackageSource::new(&ctx, config.common.retry)?;
    let mut report =
        ReportWriter::create(&config.common.output_dir, &packages_file_name(&config.stack))?;

    let summary = write_package_report(&source, &config.stack, &mut report).await?;
    let path = report.finish()?;
    info!(
        functions = summary.checks.len(),
        offenders = summary.offenders().len(),
        path = %path.display(),
        "Lambda package check complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Zip holding `entries`; names ending in `/` become directories
    fn archive(entries: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in entries {
            if entry.ends_with('/') {
                writer.add_directory(*entry, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*entry, SimpleFileOptions::default()).unwrap();
                writer.write_all(b"module.exports = {};").unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_only_node_modules_is_flagged() {
        let bundle = archive(&[
            "node_modules/",
            "node_modules/aws-sdk/index.js",
            "./node_modules/uuid/index.js",
        ]);
        assert!(only_node_modules(&bundle).unwrap());

        let windows = archive(&["node_modules\\lodash\\index.js"]);
        assert!(only_node_modules(&windows).unwrap());
    }

    #[test]
    fn test_handler_code_is_not_flagged() {
        let bundle = archive(&["index.js", "node_modules/uuid/index.js"]);
        assert!(!only_node_modules(&bundle).unwrap());

        let dist = archive(&["dist/handler.js"]);
        assert!(!only_node_modules(&dist).unwrap());

        assert!(!only_node_modules(&archive(&[])).unwrap());
    }

    #[test]
    fn test_top_level_entry() {
        assert_eq!(top_level_entry("./node_modules/a.js"), Some("node_modules"));
        assert_eq!(top_level_entry("//node_modules"), Some("node_modules"));
        assert_eq!(top_level_entry(".eslintrc"), Some(".eslintrc"));
        assert_eq!(top_level_entry("./"), None);
    }

    #[test]
    fn test_unreadable_archive_is_an_error() {
        assert!(only_node_modules(b"not a zip").is_err());
        assert!(matches!(
            PackageCheck::from_package(Ok(Package::Zip(b"not a zip".to_vec()))),
            PackageCheck::Failed(_)
        ));
    }

    #[test]
    fn test_packages_file_name() {
        assert_eq!(packages_file_name("seds/main app"), "lambda-packages-seds-main-app.txt");
    }

    #[tokio::test]
    async fn test_report_flags_offenders_and_keeps_going() {
        let mut source = MockFunctionSource::new();
        source
            .expect_stack_functions()
            .times(1)
            .returning(|_| Ok(vec!["api".into(), "worker".into(), "image-fn".into(), "gone".into()]));
        source.expect_package().times(4).returning(|function| match function {
            "api" => Ok(Package::Zip(archive(&["index.js", "node_modules/x.js"]))),
            "worker" => Ok(Package::Zip(archive(&["node_modules/x.js"]))),
            "image-fn" => Ok(Package::Other("Image".into())),
            _ => Err(anyhow::anyhow!("HTTP 403 downloading code")),
        });

        let tmp = TempDir::new().unwrap();
        let mut report = ReportWriter::create(tmp.path(), "lambda-packages-seds-main.txt")
            .unwrap()
            .quiet();
        let summary = write_package_report(&source, "seds-main", &mut report).await.unwrap();
        let content = std::fs::read_to_string(report.finish().unwrap()).unwrap();

        assert_eq!(summary.offenders(), vec!["worker"]);
        assert_eq!(summary.checks.len(), 4);
        assert!(content.starts_with("Stack: seds-main\nOK  api\nONLY_NODE_MODULES  worker\n"));
        assert!(content.contains(
            "IGNORING  image-fn  This only checks zip file package types, this function is a Image\n"
        ));
        assert!(content.contains("ERROR     gone  HTTP 403 downloading code\n"));
        assert!(content.contains("  Total functions:   4\n  Problem functions: 1\n"));
        assert!(content.contains("Functions with only node_modules:\n  - worker\n"));
    }

    #[tokio::test]
    async fn test_stack_without_functions() {
        let mut source = MockFunctionSource::new();
        source.expect_stack_functions().returning(|_| Ok(vec![]));
        source.expect_package().never();

        let tmp = TempDir::new().unwrap();
        let mut report = ReportWriter::create(tmp.path(), "out.txt").unwrap().quiet();
        let summary = write_package_report(&source, "empty", &mut report).await.unwrap();
        let content = std::fs::read_to_string(report.finish().unwrap()).unwrap();

        assert!(summary.offenders().is_empty());
        assert_eq!(content, "Stack: empty\nNo Lambda functions found in this stack.\n");
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let mut source = MockFunctionSource::new();
        source
            .expect_stack_functions()
            .returning(|stack| Err(anyhow::anyhow!("Stack with id {stack} does not exist")));

        let tmp = TempDir::new().unwrap();
        let mut report = ReportWriter::create(tmp.path(), "out.txt").unwrap().quiet();
        let err = write_package_report(&source, "missing", &mut report).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
