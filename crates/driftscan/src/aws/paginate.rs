//! Paginated collector
//!
//! AWS and GitHub listing endpoints page in different ways: opaque next
//! tokens, markers, last-evaluated keys, page numbers. A fetch closure maps
//! one of those onto [`Page`], and [`paginate`] turns it into a lazy stream
//! of items that walks every page.
//!
//! A page that fails with a rate-limit error is retried in place with
//! capped exponential backoff, so the cursor position is never lost. Any
//! other failure ends the stream with [`CollectError::Upstream`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use driftscan_common::defaults::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can tell a rate-limit signal apart from a hard failure
pub trait Throttling {
    fn is_throttled(&self) -> bool;
}

/// One page of a listing: its items and the cursor of the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    pub items: Vec<T>,
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    pub fn new(items: Vec<T>, next: Option<C>) -> Self {
        Self { items, next }
    }

    /// A page with no successor
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Backoff applied to rate-limited pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RETRY_BASE,
            max_delay: DEFAULT_RETRY_MAX,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Doubling delays from `base_delay`, capped at `max_delay`, no jitter
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }
}

/// Failure of a collector invocation
#[derive(Debug, Error)]
pub enum CollectError<E> {
    /// The endpoint failed with a non-retryable error
    #[error("{operation} failed")]
    Upstream {
        operation: String,
        #[source]
        source: E,
    },

    /// The endpoint kept rate limiting after every retry
    #[error("{operation} still rate limited after {retries} retries")]
    RetriesExhausted {
        operation: String,
        retries: usize,
        #[source]
        source: E,
    },
}

impl<E> CollectError<E> {
    pub fn operation(&self) -> &str {
        match self {
            CollectError::Upstream { operation, .. }
            | CollectError::RetriesExhausted { operation, .. } => operation,
        }
    }

    /// The underlying endpoint error
    pub fn upstream(&self) -> &E {
        match self {
            CollectError::Upstream { source, .. }
            | CollectError::RetriesExhausted { source, .. } => source,
        }
    }
}

/// Lazy stream of collected items
pub type Paged<'a, T, E> = BoxStream<'a, Result<T, CollectError<E>>>;

/// Cursor from an optional string field, treating `""` as "no more pages"
pub fn next_cursor(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Fetch one page, retrying it in place while it is rate limited
pub async fn fetch_page<T, C, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    fetch: &F,
    cursor: Option<C>,
) -> Result<Page<T, C>, CollectError<E>>
where
    C: Clone,
    E: Throttling + std::fmt::Display,
    F: Fn(Option<C>) -> Fut,
    Fut: Future<Output = Result<Page<T, C>, E>>,
{
    let mut retries = 0usize;
    let result = (|| fetch(cursor.clone()))
        .retry(policy.backoff())
        .when(|e: &E| e.is_throttled())
        .notify(|e: &E, delay: Duration| {
            retries += 1;
            warn!(
                operation = %operation,
                attempt = retries,
                delay = ?delay,
                error = %e,
                "Rate limited, retrying page"
            );
        })
        .await;

    match result {
        Ok(page) => Ok(page),
        Err(source) if source.is_throttled() => Err(CollectError::RetriesExhausted {
            operation: operation.to_string(),
            retries,
            source,
        }),
        Err(source) => Err(CollectError::Upstream {
            operation: operation.to_string(),
            source,
        }),
    }
}

struct Cursor<F, C> {
    fetch: Arc<F>,
    operation: Arc<str>,
    policy: RetryPolicy,
    next: Option<C>,
    done: bool,
    pages: usize,
}

/// Walk every page of a listing as a lazy stream of items.
///
/// `fetch` receives `None` for the first page and the previous page's
/// `next` cursor afterwards. The stream ends after the first page without
/// a successor, or at the first error.
pub fn paginate<'a, T, C, E, F, Fut>(
    operation: impl Into<String>,
    policy: RetryPolicy,
    fetch: F,
) -> Paged<'a, T, E>
where
    T: Send + 'a,
    C: Clone + Send + Sync + 'a,
    E: Throttling + std::fmt::Display + Send + 'a,
    F: Fn(Option<C>) -> Fut + Send + Sync + 'a,
    Fut: Future<Output = Result<Page<T, C>, E>> + Send + 'a,
{
    let state = Cursor {
        fetch: Arc::new(fetch),
        operation: Arc::from(operation.into()),
        policy,
        next: None,
        done: false,
        pages: 0,
    };

    stream::try_unfold(state, |mut state| async move {
        if state.done {
            debug!(operation = %state.operation, pages = state.pages, "Listing complete");
            return Ok::<_, CollectError<E>>(None);
        }
        let page = fetch_page(
            &state.operation,
            &state.policy,
            state.fetch.as_ref(),
            state.next.take(),
        )
        .await?;
        state.pages += 1;
        state.done = page.next.is_none();
        state.next = page.next;
        let items = stream::iter(page.items.into_iter().map(Ok::<T, CollectError<E>>));
        Ok(Some((items, state)))
    })
    .try_flatten()
    .boxed()
}

/// Two-level pagination: every item of `outer` opens an inner listing,
/// and the inner listings are concatenated in outer order.
pub fn paginate_nested<'a, O, T, E, F>(outer: Paged<'a, O, E>, inner: F) -> Paged<'a, T, E>
where
    O: Send + 'a,
    T: Send + 'a,
    E: Send + 'a,
    F: FnMut(O) -> Paged<'a, T, E> + Send + 'a,
{
    outer.map_ok(inner).try_flatten().boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftscan_test_utils::{PagedBackend, SimulatedError, TokenStyle};

    impl Throttling for SimulatedError {
        fn is_throttled(&self) -> bool {
            SimulatedError::is_throttled(self)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            max_retries: 3,
        }
    }

    fn collect_from(backend: Arc<PagedBackend>, policy: RetryPolicy) -> Paged<'static, String, SimulatedError> {
        paginate("ListThings", policy, move |cursor: Option<String>| {
            let backend = backend.clone();
            async move {
                let page = backend.fetch(cursor.as_deref())?;
                Ok::<_, SimulatedError>(Page::new(page.items, page.next))
            }
        })
    }

    #[tokio::test]
    async fn test_pages_2_2_1_under_every_cursor_style() {
        for style in [TokenStyle::NextToken, TokenStyle::Marker, TokenStyle::StartKey] {
            let backend = Arc::new(PagedBackend::new(
                &["a", "b", "c", "d", "e"],
                &[2, 2, 1],
                style,
            ));
            let items: Vec<String> = collect_from(backend.clone(), fast_policy())
                .try_collect()
                .await
                .unwrap();
            assert_eq!(items, vec!["a", "b", "c", "d", "e"], "{style:?}");
            assert_eq!(backend.call_count(), 3);
        }
    }

    #[tokio::test]
    async fn test_page_number_cursor() {
        let backend = Arc::new(PagedBackend::numbered(7, 3, TokenStyle::PageNumber));
        let items: Vec<String> = collect_from(backend, fast_policy())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 7);
        assert_eq!(items[6], "item-6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_page_is_retried_in_place() {
        let backend = Arc::new(
            PagedBackend::new(&["a", "b", "c", "d", "e"], &[2, 2, 1], TokenStyle::Marker)
                .throttle_page(1, 2),
        );
        let started = tokio::time::Instant::now();
        let items: Vec<String> = collect_from(backend.clone(), fast_policy())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items, vec!["a", "b", "c", "d", "e"]);
        // Three pages plus exactly two retries of the throttled one
        assert_eq!(backend.call_count(), 5);
        let cursors = backend.requested_cursors();
        assert_eq!(cursors[1], cursors[2]);
        assert_eq!(cursors[2], cursors[3]);
        // Two delays: 1ms then 2ms
        assert!(started.elapsed() >= Duration::from_millis(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let backend = Arc::new(
            PagedBackend::new(&["a", "b"], &[1, 1], TokenStyle::NextToken).throttle_page(0, 10),
        );
        let err = collect_from(backend.clone(), fast_policy())
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();

        match err {
            CollectError::RetriesExhausted { retries, ref operation, .. } => {
                assert_eq!(retries, 3);
                assert_eq!(operation, "ListThings");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.call_count(), 4);
    }

    #[tokio::test]
    async fn test_hard_failure_is_not_retried() {
        let backend = Arc::new(
            PagedBackend::new(&["a", "b", "c"], &[1, 1, 1], TokenStyle::Marker).deny_page(1),
        );
        let mut stream = collect_from(backend.clone(), fast_policy());

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, CollectError::Upstream { source: SimulatedError::Denied(1), .. }));
        assert!(stream.next().await.is_none());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let backend = Arc::new(PagedBackend::new(&["a", "b", "c"], &[1, 1, 1], TokenStyle::NextToken));
        let first: Vec<String> = collect_from(backend.clone(), fast_policy())
            .take(1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, vec!["a"]);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let items: Vec<String> = paginate("ListNothing", fast_policy(), |_cursor: Option<String>| async {
            Ok::<_, SimulatedError>(Page::last(Vec::new()))
        })
        .try_collect()
        .await
        .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_nested_listing_flattens_in_order() {
        let layers = Arc::new(PagedBackend::new(&["l1", "l2"], &[1, 1], TokenStyle::Marker));
        let versions: Arc<std::collections::HashMap<String, Arc<PagedBackend>>> = Arc::new(
            [
                ("l1", PagedBackend::new(&["l1:1", "l1:2", "l1:3"], &[2, 1], TokenStyle::Marker)),
                ("l2", PagedBackend::new(&["l2:1"], &[1], TokenStyle::Marker)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Arc::new(v)))
            .collect(),
        );

        let outer = collect_from(layers, fast_policy());
        let items: Vec<String> = paginate_nested(outer, move |layer: String| {
            let backend = versions[&layer].clone();
            collect_from(backend, fast_policy())
        })
        .try_collect()
        .await
        .unwrap();

        assert_eq!(items, vec!["l1:1", "l1:2", "l1:3", "l2:1"]);
    }

    #[test]
    fn test_next_cursor_filters_empty() {
        assert_eq!(next_cursor(Some("abc")), Some("abc".to_string()));
        assert_eq!(next_cursor(Some("")), None);
        assert_eq!(next_cursor(None), None);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(16));
        assert_eq!(policy.max_retries, 8);
    }
}
