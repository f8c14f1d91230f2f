//! Simulated paged listing endpoints
//!
//! [`PagedBackend`] serves a fixed item list in pages of chosen sizes, using
//! one of the cursor conventions AWS and GitHub listings use. Pages can be
//! made to answer with a rate-limit error a number of times, or to fail
//! outright, so collector retry and isolation behavior can be exercised
//! without network access.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

/// Cursor convention of the simulated endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStyle {
    /// Opaque continuation token (`NextToken`)
    NextToken,
    /// Last item of the previous page (`Marker` / `NextMarker`)
    Marker,
    /// Last evaluated key of the previous page (`ExclusiveStartKey`)
    StartKey,
    /// 1-based page number (`?page=N`)
    PageNumber,
}

/// Errors returned by the simulated endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatedError {
    #[error("Rate exceeded for page {0}")]
    Throttled(usize),

    #[error("Access denied for page {0}")]
    Denied(usize),

    #[error("Unrecognized cursor {0:?}")]
    BadCursor(String),
}

impl SimulatedError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, SimulatedError::Throttled(_))
    }
}

/// One page returned by the simulated endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPage {
    pub items: Vec<String>,
    pub next: Option<String>,
}

#[derive(Debug, Default)]
struct CallLog {
    cursors: Vec<Option<String>>,
    throttles_left: HashMap<usize, usize>,
}

/// Paged endpoint over a fixed item list
#[derive(Debug)]
pub struct PagedBackend {
    items: Vec<String>,
    /// Start offset of every page, plus the total length at the end
    bounds: Vec<usize>,
    style: TokenStyle,
    denied: HashSet<usize>,
    log: Mutex<CallLog>,
}

impl PagedBackend {
    /// Serve `items` split into pages of `page_sizes` (which must sum to
    /// `items.len()`).
    pub fn new(items: &[&str], page_sizes: &[usize], style: TokenStyle) -> Self {
        assert_eq!(
            page_sizes.iter().sum::<usize>(),
            items.len(),
            "page sizes must cover every item"
        );
        let mut bounds = vec![0];
        for size in page_sizes {
            let last = bounds.last().copied().unwrap_or(0);
            bounds.push(last + size);
        }
        Self {
            items: items.iter().map(|s| s.to_string()).collect(),
            bounds,
            style,
            denied: HashSet::new(),
            log: Mutex::new(CallLog::default()),
        }
    }

    /// Serve `count` items named `item-0..` in pages of `page_size`
    pub fn numbered(count: usize, page_size: usize, style: TokenStyle) -> Self {
        let names: Vec<String> = (0..count).map(|i| format!("item-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut sizes = vec![page_size; count / page_size];
        if count % page_size != 0 {
            sizes.push(count % page_size);
        }
        Self::new(&refs, &sizes, style)
    }

    /// Answer `times` requests for `page` with a rate-limit error first
    pub fn throttle_page(self, page: usize, times: usize) -> Self {
        self.lock().throttles_left.insert(page, times);
        self
    }

    /// Answer every request for `page` with a non-retryable error
    pub fn deny_page(mut self, page: usize) -> Self {
        self.denied.insert(page);
        self
    }

    pub fn page_count(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Every cursor requested so far, in call order
    pub fn requested_cursors(&self) -> Vec<Option<String>> {
        self.lock().cursors.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().cursors.len()
    }

    /// Fetch the page addressed by `cursor` (`None` for the first page)
    pub fn fetch(&self, cursor: Option<&str>) -> Result<SimulatedPage, SimulatedError> {
        let page = {
            let mut log = self.lock();
            log.cursors.push(cursor.map(str::to_string));
            let page = self.resolve(cursor)?;
            if let Some(left) = log.throttles_left.get_mut(&page) {
                if *left > 0 {
                    *left -= 1;
                    return Err(SimulatedError::Throttled(page));
                }
            }
            page
        };
        if self.denied.contains(&page) {
            return Err(SimulatedError::Denied(page));
        }

        let (start, end) = (self.bounds[page], self.bounds[page + 1]);
        let items = self.items[start..end].to_vec();
        let next = if page + 1 < self.page_count() {
            Some(self.cursor_for(page + 1))
        } else {
            None
        };
        Ok(SimulatedPage { items, next })
    }

    fn cursor_for(&self, page: usize) -> String {
        let last_of_previous = || self.items[self.bounds[page] - 1].clone();
        match self.style {
            TokenStyle::NextToken => format!("token-{page}"),
            TokenStyle::Marker => last_of_previous(),
            TokenStyle::StartKey => format!("key:{}", last_of_previous()),
            TokenStyle::PageNumber => (page + 1).to_string(),
        }
    }

    fn resolve(&self, cursor: Option<&str>) -> Result<usize, SimulatedError> {
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        let bad = || SimulatedError::BadCursor(cursor.to_string());
        let after_item = |item: &str| {
            let idx = self.items.iter().position(|i| i == item).ok_or_else(bad)?;
            self.bounds.iter().position(|b| *b == idx + 1).ok_or_else(bad)
        };
        let page = match self.style {
            TokenStyle::NextToken => cursor
                .strip_prefix("token-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(bad)?,
            TokenStyle::Marker => after_item(cursor)?,
            TokenStyle::StartKey => after_item(cursor.strip_prefix("key:").ok_or_else(bad)?)?,
            TokenStyle::PageNumber => cursor
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(bad)?,
        };
        if page >= self.page_count() {
            return Err(bad());
        }
        Ok(page)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(backend: &PagedBackend) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = backend.fetch(cursor.as_deref()).unwrap();
            out.extend(page.items);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return out,
            }
        }
    }

    #[test]
    fn test_every_style_serves_all_items() {
        for style in [
            TokenStyle::NextToken,
            TokenStyle::Marker,
            TokenStyle::StartKey,
            TokenStyle::PageNumber,
        ] {
            let backend = PagedBackend::new(&["a", "b", "c", "d", "e"], &[2, 2, 1], style);
            assert_eq!(drain(&backend), vec!["a", "b", "c", "d", "e"], "{style:?}");
            assert_eq!(backend.call_count(), 3);
        }
    }

    #[test]
    fn test_marker_cursor_is_last_item() {
        let backend = PagedBackend::new(&["a", "b", "c"], &[2, 1], TokenStyle::Marker);
        let first = backend.fetch(None).unwrap();
        assert_eq!(first.next.as_deref(), Some("b"));
    }

    #[test]
    fn test_throttle_then_succeed() {
        let backend = PagedBackend::new(&["a", "b"], &[1, 1], TokenStyle::NextToken)
            .throttle_page(1, 2);
        let first = backend.fetch(None).unwrap();
        let cursor = first.next.unwrap();
        assert_eq!(backend.fetch(Some(&cursor)), Err(SimulatedError::Throttled(1)));
        assert_eq!(backend.fetch(Some(&cursor)), Err(SimulatedError::Throttled(1)));
        assert_eq!(backend.fetch(Some(&cursor)).unwrap().items, vec!["b"]);
    }

    #[test]
    fn test_denied_page() {
        let backend = PagedBackend::new(&["a"], &[1], TokenStyle::Marker).deny_page(0);
        let err = backend.fetch(None).unwrap_err();
        assert!(!err.is_throttled());
    }

    #[test]
    fn test_bad_cursor() {
        let backend = PagedBackend::new(&["a", "b"], &[1, 1], TokenStyle::Marker);
        assert!(matches!(
            backend.fetch(Some("zzz")),
            Err(SimulatedError::BadCursor(_))
        ));
    }

    #[test]
    fn test_numbered() {
        let backend = PagedBackend::numbered(250, 100, TokenStyle::PageNumber);
        assert_eq!(backend.page_count(), 3);
        assert_eq!(drain(&backend).len(), 250);
    }
}
