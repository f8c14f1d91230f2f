//! AWS test utilities
//!
//! Provides region detection and unique run ID generation for AWS integration tests.

use chrono::Utc;

/// Get the AWS region for tests.
///
/// Checks `AWS_REGION`, then `AWS_DEFAULT_REGION`, and falls back to
/// `us-east-1`, the region the scanned accounts live in.
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-1".to_string())
}

/// Generate a unique run ID, used to name scratch output directories.
///
/// Format: `test-{timestamp_ms}-{counter}`.
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let run_id = test_run_id();
        assert!(run_id.starts_with("test-"));
        let parts: Vec<&str> = run_id.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(test_run_id(), test_run_id());
    }

    #[test]
    fn test_region_is_non_empty() {
        assert!(!get_test_region().is_empty());
    }
}
