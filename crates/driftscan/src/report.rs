//! Report output
//!
//! Every report line goes to stdout and to a run-scoped file at the same
//! time. Failing to write the file ends the run; the report is the product.

use std::fs::{self, File};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use driftscan_common::ReconciliationResult;
use thiserror::Error;
use tracing::debug;

/// Report file failures
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to create output directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create report file {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write report file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to echo report to stdout")]
    Stdout(#[source] io::Error),
}

/// Tees report lines to stdout and a file
pub struct ReportWriter {
    file: LineWriter<File>,
    path: PathBuf,
    /// Echo target; dropped once the reader goes away
    echo: Option<Box<dyn Write + Send>>,
}

impl ReportWriter {
    /// Create (or truncate) `dir/file_name`, creating `dir` if needed
    pub fn create(dir: &Path, file_name: &str) -> Result<Self, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(file_name);
        let file = File::create(&path).map_err(|source| ReportError::Create {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Opened report file");

        Ok(Self {
            file: LineWriter::new(file),
            path,
            echo: Some(Box::new(io::stdout())),
        })
    }

    /// Stop echoing lines to stdout
    pub fn quiet(mut self) -> Self {
        self.echo = None;
        self
    }

    /// Echo lines to `out` instead of stdout
    pub fn echo_to(mut self, out: impl Write + Send + 'static) -> Self {
        self.echo = Some(Box::new(out));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> Result<(), ReportError> {
        let text = text.as_ref();
        if let Some(out) = self.echo.as_mut() {
            match writeln!(out, "{text}") {
                Ok(()) => {}
                // Output piped into a reader that exited; keep writing the file
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("stdout closed, no longer echoing report");
                    self.echo = None;
                }
                Err(e) => return Err(ReportError::Stdout(e)),
            }
        }
        writeln!(self.file, "{text}").map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn blank(&mut self) -> Result<(), ReportError> {
        self.line("")
    }

    pub fn lines<I, S>(&mut self, lines: I) -> Result<(), ReportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines.into_iter().try_for_each(|l| self.line(l))
    }

    /// Flush and close the file, returning its path
    pub fn finish(mut self) -> Result<PathBuf, ReportError> {
        self.file.flush().map_err(|source| ReportError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.path)
    }
}

impl std::fmt::Debug for ReportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportWriter")
            .field("path", &self.path)
            .field("echo", &self.echo.is_some())
            .finish_non_exhaustive()
    }
}

/// Lines of one kind's report section
pub fn scan_section(result: &ReconciliationResult) -> Vec<String> {
    let mut lines = vec![
        format!("{} (total: {})", result.label, result.total),
        format!("Managed by CloudFormation: {}", result.managed),
    ];

    for count in result.excluded.iter().filter(|c| c.placed > 0) {
        let mut line = format!("Excluded for {}: {}", count.rule.reason(), count.placed);
        if count.matched != count.placed {
            line.push_str(&format!(" (matches {} overall)", count.matched));
        }
        lines.push(line);
    }

    if result.is_clean() {
        lines.push("✅ All are managed by CloudFormation or excluded.".to_string());
    } else {
        lines.push("❌ Unmanaged:".to_string());
        lines.extend(result.unmanaged.iter().map(|id| format!("- {id}")));
    }
    lines.push(String::new());
    lines
}

/// Lines standing in for a kind whose inventory could not be listed
pub fn failure_section(label: &str, error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    vec![
        format!("{label} (total: unknown)"),
        format!("Failed to list {label}: {}", error_chain(error)),
        String::new(),
    ]
}

/// An error and all its sources, joined with `: `
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
