//! Where each application keeps its submissions

use std::fmt;

use serde_json::Value;

/// Applications whose submissions can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum App {
    Mcr,
    Mfp,
    Hcbs,
    Carts,
    Seds,
    Qmr,
}

/// Status an item must carry to count as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMatch {
    Text(&'static str),
    Flag(bool),
    /// Any of these integer codes (SEDS: 2 = Provisional, 3 = Final)
    OneOf(&'static [i64]),
}

impl StatusMatch {
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (StatusMatch::Text(expected), Some(Value::String(s))) => s == expected,
            (StatusMatch::Flag(expected), Some(Value::Bool(b))) => b == expected,
            (StatusMatch::OneOf(codes), Some(Value::Number(n))) => {
                n.as_i64().is_some_and(|n| codes.contains(&n))
            }
            _ => false,
        }
    }
}

/// One table of one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportType {
    pub name: &'static str,
    pub table: String,
    pub date_field: &'static str,
    pub status_field: &'static str,
    pub status: StatusMatch,
}

impl ReportType {
    fn submitted_reports(environment: &str, name: &'static str, date_field: &'static str) -> Self {
        Self {
            name,
            table: format!("{environment}-{name}-reports"),
            date_field,
            status_field: "status",
            status: StatusMatch::Text("Submitted"),
        }
    }
}

impl App {
    pub const ALL: [App; 6] = [App::Mcr, App::Mfp, App::Hcbs, App::Carts, App::Seds, App::Qmr];

    pub fn name(self) -> &'static str {
        match self {
            App::Mcr => "MCR",
            App::Mfp => "MFP",
            App::Hcbs => "HCBS",
            App::Carts => "CARTS",
            App::Seds => "SEDS",
            App::Qmr => "QMR",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            App::Mcr | App::Mfp | App::Hcbs => "Report submissions with clear submission dates",
            App::Carts => {
                "State certifications: lastChanged tracks ANY status change (username stored, email only in Cognito)"
            }
            App::Seds => "Form certifications: status_date tracks certification changes",
            App::Qmr => {
                "Core set submissions: lastAltered tracks ANY update (username stored, email only in Cognito)"
            }
        }
    }

    /// Tables to scan for `environment` (a branch name such as `main` or `production`)
    pub fn report_types(self, environment: &str) -> Vec<ReportType> {
        let reports = |names: &[&'static str], date_field: &'static str| -> Vec<ReportType> {
            names
                .iter()
                .map(|name| ReportType::submitted_reports(environment, *name, date_field))
                .collect()
        };

        match self {
            App::Mcr => reports(&["mcpar", "mlr", "naaar"], "submittedOnDate"),
            App::Mfp => reports(&["sar", "wp", "abcd"], "submittedOnDate"),
            App::Hcbs => reports(&["qms", "tacm", "ci", "pcp"], "submitted"),
            App::Carts => vec![ReportType {
                name: "state-status",
                table: format!("{environment}-state-status"),
                date_field: "lastChanged",
                status_field: "status",
                status: StatusMatch::Text("certified"),
            }],
            App::Seds => vec![ReportType {
                name: "state-forms",
                table: format!("{environment}-state-forms"),
                date_field: "status_date",
                status_field: "status_id",
                status: StatusMatch::OneOf(&[2, 3]),
            }],
            App::Qmr => vec![ReportType {
                name: "core-sets",
                table: format!("{environment}-coreSet"),
                date_field: "lastAltered",
                status_field: "submitted",
                status: StatusMatch::Flag(true),
            }],
        }
    }

    /// Caveats printed under the results
    pub fn notes(self) -> &'static [&'static str] {
        match self {
            App::Mcr | App::Mfp => &["MCR/MFP: Submission dates are stored; emails live in S3 field data and are not fetched"],
            App::Hcbs => &["HCBS: Submission dates and emails are stored in DynamoDB"],
            App::Seds => &["SEDS: Date shows when certification status changed; emails live in the auth-user table and are not fetched"],
            App::Carts => &[
                "CARTS: Date shows when status last changed (includes uncertify/recertify)",
                "Email not available: stored only in Cognito, not linked to certification records",
            ],
            App::Qmr => &[
                "QMR: Date shows when core set was last altered (includes any update)",
                "Email not available: stored only in Cognito, not linked to submission records",
            ],
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_names() {
        let mcr = App::Mcr.report_types("production");
        let tables: Vec<&str> = mcr.iter().map(|r| r.table.as_str()).collect();
        assert_eq!(
            tables,
            vec![
                "production-mcpar-reports",
                "production-mlr-reports",
                "production-naaar-reports"
            ]
        );
        assert_eq!(App::Hcbs.report_types("val").len(), 4);
        assert_eq!(App::Qmr.report_types("main")[0].table, "main-coreSet");
        assert_eq!(App::Carts.report_types("main")[0].table, "main-state-status");
    }

    #[test]
    fn test_status_matching() {
        let text = StatusMatch::Text("Submitted");
        assert!(text.matches(Some(&json!("Submitted"))));
        assert!(!text.matches(Some(&json!("In progress"))));
        assert!(!text.matches(None));

        let flag = StatusMatch::Flag(true);
        assert!(flag.matches(Some(&json!(true))));
        assert!(!flag.matches(Some(&json!("true"))));

        let codes = StatusMatch::OneOf(&[2, 3]);
        assert!(codes.matches(Some(&json!(3))));
        assert!(!codes.matches(Some(&json!(1))));
        assert!(!codes.matches(Some(&json!("3"))));
    }
}
