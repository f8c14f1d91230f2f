//! Account identity and report file naming

use crate::defaults::REPO_NAME_PREFIX;

/// Strongly-typed AWS account ID (12-digit string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, derive_more::Deref)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        AccountId(s.into())
    }
}

/// Who the run is reporting on, resolved once per run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentity {
    pub account_id: Option<AccountId>,
    pub alias: Option<String>,
}

impl AccountIdentity {
    pub fn new(account_id: Option<AccountId>, alias: Option<String>) -> Self {
        Self { account_id, alias }
    }

    /// Display name: alias, then account id, then `unknown-account`
    pub fn display_name(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|a| !a.is_empty())
            .or(self.account_id.as_deref().map(String::as_str))
            .unwrap_or("unknown-account")
    }

    /// Display name restricted to `[A-Za-z0-9_-]` for use in file names
    pub fn file_token(&self) -> String {
        self.display_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Report file for the unmanaged-resource scan
    pub fn scan_report_name(&self) -> String {
        format!("unmanaged-resources-{}.txt", self.file_token())
    }

    /// Report file for a stack/branch audit of `repo`.
    ///
    /// `timestamp` is an RFC 3339 string; `:` and `.` are replaced so the
    /// name is portable.
    pub fn audit_report_name(&self, repo: &str, timestamp: &str) -> String {
        let repo_ending = repo.strip_prefix(REPO_NAME_PREFIX).unwrap_or(repo);
        let timestamp = timestamp.replace([':', '.'], "-");
        format!(
            "orphaned-stacks-{}-{}-{}.txt",
            repo_ending,
            self.file_token(),
            timestamp
        )
    }
}

/// Make a stack name safe for a file name.
///
/// Keeps `[A-Za-z0-9._-]`, turns every other run of characters into a
/// single `-`, collapses repeated dashes and trims dashes at both ends.
pub fn sanitize_file_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        let c = if keep { c } else { '-' };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}
