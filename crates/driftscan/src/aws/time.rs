//! SDK timestamp conversion

use aws_sdk_cloudformation::primitives::DateTime as SmithyDateTime;
use chrono::{DateTime, Utc};

/// Convert an SDK timestamp to chrono
pub fn to_chrono(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}
