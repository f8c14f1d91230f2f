//! Submission records and their display summaries
//!
//! Items come out of DynamoDB as attribute maps. They are converted to JSON
//! and decoded into one record shape per application, each with its own
//! formatter. Missing or mistyped fields never fail decoding; they render
//! as `N/A`.

use std::collections::HashMap;
use std::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};

use super::apps::{App, ReportType};

const NOT_AVAILABLE: &str = "N/A";

/// Convert a DynamoDB attribute to JSON (numbers stay numbers, sets become arrays)
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(m) => item_to_json(m),
        AttributeValue::L(l) => Value::Array(l.iter().map(attribute_to_json).collect()),
        AttributeValue::Ss(ss) => Value::Array(ss.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(ns) => Value::Array(ns.iter().map(|n| parse_number(n)).collect()),
        _ => Value::Null,
    }
}

pub fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), attribute_to_json(v)))
            .collect::<Map<String, Value>>(),
    )
}

fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        return Value::Number(i.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(n.to_string()), Value::Number)
}

/// Timestamp of a date field: epoch milliseconds or a date string
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if millis == 0 {
                return None;
            }
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) if !s.is_empty() => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt.and_utc());
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
            s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
        }
        _ => None,
    }
}

/// True if `item` has the submitted status and a date on or after `since`
pub fn is_recent_submission(item: &Value, report_type: &ReportType, since: DateTime<Utc>) -> bool {
    let status_ok = report_type.status.matches(item.get(report_type.status_field));
    let date = item.get(report_type.date_field).and_then(parse_timestamp);
    status_ok && date.is_some_and(|d| d >= since)
}

/// A loosely typed scalar field (years and quarters are stored both ways)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Flag(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Flag(b) => write!(f, "{b}"),
        }
    }
}

/// Display a field, treating empty strings like missing ones
fn or_na<T: fmt::Display>(value: &Option<T>) -> String {
    or_else(value, NOT_AVAILABLE)
}

fn or_else<T: fmt::Display>(value: &Option<T>, fallback: &str) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// First non-empty of several candidate name fields
fn first_present(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .find_map(|c| c.as_deref().filter(|s| !s.is_empty()))
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// Decode one field, reading a value of the wrong type as missing
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// MCR and MFP reports
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StandardReport {
    #[serde(default, deserialize_with = "lenient")]
    pub submission_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub program_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub submitted_by: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub field_data_id: Option<String>,
}

/// HCBS reports, which also store the submitter's email
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HcbsReport {
    #[serde(default, deserialize_with = "lenient")]
    pub submission_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub program_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub submitted_by: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub submitted_by_email: Option<String>,
}

/// CARTS state certification
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartsStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub state_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient")]
    pub program_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub username: Option<String>,
}

/// SEDS form certification
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SedsForm {
    #[serde(default, deserialize_with = "lenient")]
    pub form: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub quarter: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient")]
    pub state_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub status_modified_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
    #[serde(default, deserialize_with = "lenient")]
    pub num_complete: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub num_available: Option<i64>,
}

/// QMR core set
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QmrCoreSet {
    #[serde(default, deserialize_with = "lenient")]
    pub core_set: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_altered_by: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub progress: Option<Progress>,
}

/// A submission decoded according to its application
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionRecord {
    Standard { app: App, report: StandardReport },
    Hcbs(HcbsReport),
    Carts(CartsStatus),
    Seds(SedsForm),
    Qmr(QmrCoreSet),
}

/// One row of the submissions table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub application: String,
    pub report_type: String,
    pub report_name: String,
    pub state: String,
    pub submission_date: String,
    pub submitted_by: String,
    pub email: String,
    pub notes: Option<String>,
}

impl SubmissionRecord {
    /// Decode an item of `app`.
    ///
    /// A field of the wrong type reads as missing and leaves the others
    /// intact; only an item that is not an object fails.
    pub fn decode(app: App, item: Value) -> Result<Self, serde_json::Error> {
        Ok(match app {
            App::Mcr | App::Mfp => SubmissionRecord::Standard {
                app,
                report: serde_json::from_value(item)?,
            },
            App::Hcbs => SubmissionRecord::Hcbs(serde_json::from_value(item)?),
            App::Carts => SubmissionRecord::Carts(serde_json::from_value(item)?),
            App::Seds => SubmissionRecord::Seds(serde_json::from_value(item)?),
            App::Qmr => SubmissionRecord::Qmr(serde_json::from_value(item)?),
        })
    }

    /// Record with every field missing
    pub fn placeholder(app: App) -> Self {
        match app {
            App::Mcr | App::Mfp => SubmissionRecord::Standard {
                app,
                report: StandardReport::default(),
            },
            App::Hcbs => SubmissionRecord::Hcbs(HcbsReport::default()),
            App::Carts => SubmissionRecord::Carts(CartsStatus::default()),
            App::Seds => SubmissionRecord::Seds(SedsForm::default()),
            App::Qmr => SubmissionRecord::Qmr(QmrCoreSet::default()),
        }
    }

    /// Table row for this record; `report_type` names the scanned table's type
    pub fn summary(&self, report_type: &str, submitted: Option<DateTime<Utc>>) -> SubmissionSummary {
        let submission_date = submitted
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        match self {
            SubmissionRecord::Standard { app, report } => SubmissionSummary {
                application: app.name().to_string(),
                report_type: report_type.to_string(),
                report_name: first_present(&[
                    &report.submission_name,
                    &report.name,
                    &report.program_name,
                ]),
                state: or_na(&report.state),
                submission_date,
                submitted_by: or_na(&report.submitted_by),
                email: "N/A (not fetched)".to_string(),
                notes: None,
            },
            SubmissionRecord::Hcbs(report) => SubmissionSummary {
                application: App::Hcbs.name().to_string(),
                report_type: report_type.to_string(),
                report_name: first_present(&[
                    &report.submission_name,
                    &report.name,
                    &report.program_name,
                ]),
                state: or_na(&report.state),
                submission_date,
                submitted_by: or_na(&report.submitted_by),
                email: or_na(&report.submitted_by_email),
                notes: None,
            },
            SubmissionRecord::Carts(status) => SubmissionSummary {
                application: App::Carts.name().to_string(),
                report_type: App::Carts.name().to_string(),
                report_name: format!(
                    "{} {} ({})",
                    or_na(&status.state_id),
                    or_na(&status.year),
                    or_na(&status.program_type)
                ),
                state: or_na(&status.state_id),
                submission_date,
                submitted_by: or_na(&status.username),
                email: "N/A (not stored)".to_string(),
                notes: None,
            },
            SubmissionRecord::Seds(form) => {
                let certification = match form.status_id {
                    Some(2) => "Provisional",
                    Some(3) => "Final",
                    _ => "Unknown",
                };
                SubmissionSummary {
                    application: App::Seds.name().to_string(),
                    report_type: App::Seds.name().to_string(),
                    report_name: format!(
                        "{} Q{} {}",
                        or_na(&form.form),
                        or_else(&form.quarter, "?"),
                        or_else(&form.year, "")
                    )
                    .trim_end()
                    .to_string(),
                    state: or_na(&form.state_id),
                    submission_date,
                    submitted_by: or_na(&form.status_modified_by),
                    email: "N/A (not fetched)".to_string(),
                    notes: Some(format!("{certification} Cert")),
                }
            }
            SubmissionRecord::Qmr(core_set) => {
                let core = or_na(&core_set.core_set);
                let progress = core_set.progress.clone().unwrap_or_default();
                SubmissionSummary {
                    application: App::Qmr.name().to_string(),
                    report_type: format!("{core} Core Set"),
                    report_name: format!("{core} Core Set - {}", or_na(&core_set.year)),
                    state: or_na(&core_set.state),
                    submission_date,
                    submitted_by: or_na(&core_set.last_altered_by),
                    email: "N/A (not stored)".to_string(),
                    notes: Some(format!(
                        "{}/{} measures",
                        progress.num_complete.unwrap_or(0),
                        progress.num_available.unwrap_or(0)
                    )),
                }
            }
        }
    }
}
