//! Offline end-to-end scenarios
//!
//! Drive the index, reconciliation and report writer together without AWS.
//! Run with: cargo test --test scan_integration

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use driftscan::audit::OrphanFilter;
use driftscan::aws::{ManagedIndex, StackInfo, StackResource};
use driftscan::report::{ReportWriter, failure_section};
use driftscan::scan::{derived_log_groups, reconcile_kind};
use driftscan_common::{ResourceKind, ScanProfile};
use proptest::prelude::*;
use tempfile::TempDir;

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn declared(resource_type: &str, physical_id: &str) -> StackResource {
    StackResource {
        resource_type: resource_type.to_string(),
        physical_id: Some(physical_id.to_string()),
    }
}

#[test]
fn test_declared_table_is_managed() {
    let profile = ScanProfile::builtin().unwrap();
    let index = ManagedIndex::from_resources([declared("AWS::DynamoDB::Table", "T1")]);
    let tables = profile.kind(ResourceKind::DynamodbTable).unwrap();

    let report = reconcile_kind(
        tables,
        ids(&["T1", "T2"]),
        index.for_kind(ResourceKind::DynamodbTable),
        Some("123456789012"),
    );

    assert_eq!(report.result.managed, 1);
    assert_eq!(report.result.unmanaged, ids(&["T2"]));
    assert_eq!(
        report.lines,
        vec![
            format!("{} (total: 2)", tables.label()),
            "Managed by CloudFormation: 1".to_string(),
            "❌ Unmanaged:".to_string(),
            "- T2".to_string(),
            String::new(),
        ]
    );
}

#[test]
fn test_log_group_report_file() {
    let profile = ScanProfile::builtin().unwrap();
    let log_kind = profile.kind(ResourceKind::LogGroup).unwrap();
    let index = ManagedIndex::from_resources([
        declared("AWS::Lambda::Function", "seds-main-api"),
        declared("AWS::ApiGateway::RestApi", "a1b2c3"),
        declared("AWS::Logs::LogGroup", "/seds/main/app"),
    ]);
    let managed = derived_log_groups(&index, &[("a1b2c3".to_string(), ids(&["main"]))]);

    let inventory = ids(&[
        "/aws/lambda/seds-main-api",
        "API-Gateway-Execution-Logs_a1b2c3/main",
        "/seds/main/app",
        "/aws/ec2/instance-logs",
        "/aws/ec2/other",
        "amazon-ssm-agent.log",
        "/forgotten/group",
    ]);
    let report = reconcile_kind(log_kind, inventory, &managed, None);

    let tmp = TempDir::new().unwrap();
    let mut writer = ReportWriter::create(tmp.path(), "unmanaged-resources-test.txt")
        .unwrap()
        .quiet();
    writer.lines(&report.lines).unwrap();
    writer
        .lines(failure_section("KMS Keys", &std::io::Error::other("AccessDenied")))
        .unwrap();
    let path = writer.finish().unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("Managed by CloudFormation: 3\n"));
    assert!(content.contains("Excluded for prefix \"/aws/ec2\": 2\n"));
    assert!(content.contains("Excluded for exact \"amazon-ssm-agent.log\": 1\n"));
    assert!(content.contains("❌ Unmanaged:\n- /forgotten/group\n"));
    assert!(content.contains("KMS Keys (total: unknown)\nFailed to list KMS Keys: AccessDenied\n"));
}

#[test]
fn test_orphan_scenario() {
    let stack = |name: &str, day: u32| StackInfo {
        name: name.to_string(),
        creation_time: Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap(),
        status: "UPDATE_COMPLETE".to_string(),
    };
    let filter = OrphanFilter {
        excluded_prefix: "cms".to_string(),
        exceptions: vec![],
    };

    let orphans = filter.find_orphans(
        &[
            stack("app-main-db", 1),
            stack("app-feature-x-db", 2),
            stack("cms-shared", 3),
        ],
        &ids(&["main"]),
    );

    let names: Vec<&str> = orphans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["app-feature-x-db"]);
}

proptest! {
    /// Every listed bucket lands in exactly one bucket of the partition
    #[test]
    fn test_bucket_partition(
        names in prop::collection::vec("[a-z0-9-]{1,20}", 0..40),
        managed_mask in prop::collection::vec(any::<bool>(), 40),
    ) {
        let profile = ScanProfile::builtin().unwrap();
        let buckets = profile.kind(ResourceKind::S3Bucket).unwrap();
        let managed: HashSet<String> = names
            .iter()
            .zip(&managed_mask)
            .filter(|(_, m)| **m)
            .map(|(n, _)| n.clone())
            .collect();

        let first = reconcile_kind(buckets, names.clone(), &managed, Some("123456789012"));
        let again = reconcile_kind(buckets, names.clone(), &managed, Some("123456789012"));

        let result = &first.result;
        prop_assert_eq!(
            result.managed + result.excluded_total() + result.unmanaged.len(),
            result.total
        );
        prop_assert_eq!(first.lines, again.lines);
    }
}
