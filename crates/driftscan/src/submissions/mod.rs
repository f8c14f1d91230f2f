//! Recent submissions of one application
//!
//! Scans each of the application's DynamoDB tables, keeps items with the
//! submitted status and a recent enough date, and prints one table per
//! report type.

pub mod apps;
pub mod query;
pub mod records;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tracing::{info, warn};

pub use apps::{App, ReportType, StatusMatch};
pub use records::{SubmissionRecord, SubmissionSummary};

use crate::config::SubmissionsConfig;
use crate::report::{ReportWriter, error_chain};

const RULE_WIDTH: usize = 120;

/// Submissions found in one report type's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTypeResult {
    pub report_type: String,
    pub table: String,
    pub outcome: std::result::Result<Vec<SubmissionSummary>, String>,
}

impl ReportTypeResult {
    pub fn count(&self) -> usize {
        self.outcome.as_ref().map_or(0, Vec::len)
    }
}

/// Keep the recent submitted items of `report_type` and format them
pub fn summarize(
    app: App,
    report_type: &ReportType,
    items: Vec<serde_json::Value>,
    since: DateTime<Utc>,
) -> Vec<SubmissionSummary> {
    items
        .into_iter()
        .filter(|item| records::is_recent_submission(item, report_type, since))
        .map(|item| {
            let submitted = item
                .get(report_type.date_field)
                .and_then(records::parse_timestamp);
            let record = SubmissionRecord::decode(app, item).unwrap_or_else(|e| {
                warn!(table = %report_type.table, error = %e, "Undecodable submission, showing placeholders");
                SubmissionRecord::placeholder(app)
            });
            record.summary(report_type.name, submitted)
        })
        .collect()
}

fn submissions_table(summaries: &[SubmissionSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("State"),
            Cell::new("Report Type"),
            Cell::new("Report Name"),
            Cell::new("Date"),
            Cell::new("Submitter"),
            Cell::new("Email"),
            Cell::new("Notes"),
        ]);

    for s in summaries {
        table.add_row(vec![
            Cell::new(&s.state),
            Cell::new(&s.report_type),
            Cell::new(&s.report_name),
            Cell::new(&s.submission_date),
            Cell::new(&s.submitted_by),
            Cell::new(&s.email),
            Cell::new(s.notes.as_deref().unwrap_or("")),
        ]);
    }
    table
}

/// Report lines for one application's results
pub fn render(app: App, results: &[ReportTypeResult], since: DateTime<Utc>) -> Vec<String> {
    let rule = "=".repeat(RULE_WIDTH);
    let since = since.format("%Y-%m-%d");
    let total: usize = results.iter().map(ReportTypeResult::count).sum();

    let mut lines = vec![
        rule.clone(),
        "SUBMISSION/CERTIFICATION SUMMARY".to_string(),
        rule.clone(),
        String::new(),
        format!("{} Application:", app.name()),
        format!("  {}", app.description()),
        format!("  Total: {total}"),
    ];

    for result in results {
        match &result.outcome {
            Ok(summaries) if summaries.is_empty() => {}
            Ok(summaries) => {
                lines.push(String::new());
                lines.push(format!(
                    "  {} ({} submission(s)):",
                    result.report_type,
                    summaries.len()
                ));
                lines.extend(
                    submissions_table(summaries)
                        .to_string()
                        .lines()
                        .map(|l| format!("  {l}")),
                );
            }
            Err(error) => {
                lines.push(String::new());
                lines.push(format!("  Failed to scan {}: {error}", result.table));
            }
        }
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push(format!(
        "Grand Total: {total} submission(s)/certification(s) since {since}"
    ));
    lines.push(String::new());
    lines.push("IMPORTANT NOTES:".to_string());
    lines.extend(app.notes().iter().map(|n| format!("  - {n}")));
    lines.push(rule);
    lines
}

/// The `submissions` command
pub async fn query_submissions(config: &SubmissionsConfig) -> Result<Vec<ReportTypeResult>> {
    config.validate()?;

    let ctx = config.common.aws_context().await;
    let client = ctx.dynamodb_client();
    let since = Utc::now() - Duration::days(config.days);

    let file_name = format!(
        "submissions-{}-{}.txt",
        config.app.name().to_lowercase(),
        driftscan_common::identity::sanitize_file_component(&config.environment)
    );
    let mut report = ReportWriter::create(&config.common.output_dir, &file_name)?;
    report.line(format!(
        "Querying {} application for submissions in the last {} days (since {})",
        config.app.name(),
        config.days,
        since.format("%Y-%m-%d")
    ))?;
    report.line(format!("Environment: {}", config.environment))?;
    report.blank()?;

    let mut results = Vec::new();
    for report_type in config.app.report_types(&config.environment) {
        info!(table = %report_type.table, "Scanning table");
        let outcome = match query::scan_table(&client, &report_type.table, config.common.retry).await {
            Ok(items) => Ok(summarize(config.app, &report_type, items, since)),
            Err(e) => {
                warn!(table = %report_type.table, error = %e, "Table scan failed");
                Err(error_chain(&e))
            }
        };
        if let Ok(found) = &outcome {
            info!(table = %report_type.table, count = found.len(), "Found submissions");
        }
        results.push(ReportTypeResult {
            report_type: report_type.name.to_string(),
            table: report_type.table,
            outcome,
        });
    }

    report.lines(render(config.app, &results, since))?;
    let path = report.finish()?;
    info!(path = %path.display(), "Submissions report written");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_summarize_filters_and_formats() {
        let report_type = &App::Qmr.report_types("main")[0];
        let items = vec![
            json!({"submitted": true, "lastAltered": 1709856000000i64, "coreSet": "ACS", "year": 2024, "state": "VA"}),
            json!({"submitted": false, "lastAltered": 1709856000000i64, "coreSet": "CCS"}),
            json!({"submitted": true, "lastAltered": 1700000000000i64, "coreSet": "HHCS"}),
        ];
        let summaries = summarize(App::Qmr, report_type, items, since());
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].report_name, "ACS Core Set - 2024");
        assert_eq!(summaries[0].submission_date, "2024-03-08");
    }

    #[test]
    fn test_render_counts_and_failures() {
        let results = vec![
            ReportTypeResult {
                report_type: "mcpar".to_string(),
                table: "main-mcpar-reports".to_string(),
                outcome: Ok(vec![SubmissionSummary {
                    application: "MCR".to_string(),
                    report_type: "mcpar".to_string(),
                    report_name: "Plan A".to_string(),
                    state: "MN".to_string(),
                    submission_date: "2024-03-02".to_string(),
                    submitted_by: "Lee".to_string(),
                    email: "N/A (not fetched)".to_string(),
                    notes: None,
                }]),
            },
            ReportTypeResult {
                report_type: "mlr".to_string(),
                table: "main-mlr-reports".to_string(),
                outcome: Ok(vec![]),
            },
            ReportTypeResult {
                report_type: "naaar".to_string(),
                table: "main-naaar-reports".to_string(),
                outcome: Err("dynamodb:Scan(main-naaar-reports) failed: Not found: table".to_string()),
            },
        ];

        let lines = render(App::Mcr, &results, since());
        assert!(lines.contains(&"  Total: 1".to_string()));
        assert!(lines.contains(&"  mcpar (1 submission(s)):".to_string()));
        assert!(!lines.iter().any(|l| l.contains("mlr (")));
        assert!(lines.iter().any(|l| l.contains("Plan A")));
        assert!(lines.contains(
            &"  Failed to scan main-naaar-reports: dynamodb:Scan(main-naaar-reports) failed: Not found: table"
                .to_string()
        ));
        assert!(lines.contains(
            &"Grand Total: 1 submission(s)/certification(s) since 2024-03-01".to_string()
        ));
    }
}
