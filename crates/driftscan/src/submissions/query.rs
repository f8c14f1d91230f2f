//! DynamoDB table scans

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use futures::TryStreamExt;
use serde_json::Value;
use tracing::debug;

use crate::aws::error::AwsError;
use crate::aws::paginate::{CollectError, Page, Paged, RetryPolicy, paginate};
use crate::submissions::records::item_to_json;

/// Last evaluated key of a scan page
type StartKey = HashMap<String, AttributeValue>;

/// Every item of `table`, as JSON
pub fn scan_items(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    policy: RetryPolicy,
) -> Paged<'static, Value, AwsError> {
    let client = client.clone();
    let table_name = table.to_string();
    paginate(
        format!("dynamodb:Scan({table})"),
        policy,
        move |start: Option<StartKey>| scan_page(client.clone(), table_name.clone(), start),
    )
}

pub async fn scan_table(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    policy: RetryPolicy,
) -> Result<Vec<Value>, CollectError<AwsError>> {
    let items: Vec<Value> = scan_items(client, table, policy).try_collect().await?;
    debug!(table = %table, count = items.len(), "Scanned table");
    Ok(items)
}

async fn scan_page(
    client: aws_sdk_dynamodb::Client,
    table: String,
    start: Option<StartKey>,
) -> Result<Page<Value, StartKey>, AwsError> {
    let out = client
        .scan()
        .table_name(table)
        .set_exclusive_start_key(start)
        .send()
        .await
        .map_err(AwsError::from_sdk)?;

    let items = out.items().iter().map(item_to_json).collect();
    let next = out.last_evaluated_key().filter(|k| !k.is_empty()).cloned();
    Ok(Page::new(items, next))
}
