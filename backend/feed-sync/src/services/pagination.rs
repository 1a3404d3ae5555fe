//! Page cursors per feed instance
//!
//! A short page (fewer posts than requested) marks the end of the feed. The
//! cursor only moves forward when a page is committed and only goes back to
//! page 0 through an explicit `reset`.

use std::collections::HashMap;
use tracing::debug;

use crate::models::FeedInstance;

/// Parameters of one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PageCursor {
    /// Last committed page; `None` until the first page lands
    loaded: Option<u64>,
    /// Whether the last committed page was full-sized
    exhausted: bool,
}

#[derive(Debug)]
pub struct PaginationCursor {
    page_size: u64,
    cursors: HashMap<FeedInstance, PageCursor>,
}

impl PaginationCursor {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size: page_size.max(1),
            cursors: HashMap::new(),
        }
    }

    /// Page 0 of any instance; leaves the cursor untouched until a commit.
    pub fn first_page(&self) -> PageRequest {
        PageRequest {
            page_index: 0,
            page_size: self.page_size,
        }
    }

    /// Request parameters for the next page of `instance`.
    pub fn advance(&self, instance: &FeedInstance) -> PageRequest {
        let next = self
            .cursors
            .get(instance)
            .and_then(|c| c.loaded)
            .map(|page| page + 1)
            .unwrap_or(0);
        PageRequest {
            page_index: next,
            page_size: self.page_size,
        }
    }

    /// Record that `request` was loaded and returned `len` posts.
    pub fn commit(&mut self, instance: &FeedInstance, request: PageRequest, len: usize) {
        let cursor = self.cursors.entry(instance.clone()).or_default();
        cursor.loaded = Some(match cursor.loaded {
            Some(current) => current.max(request.page_index),
            None => request.page_index,
        });
        cursor.exhausted = (len as u64) < request.page_size;
        debug!(
            instance = %instance,
            page_index = request.page_index,
            len = len,
            has_more = !cursor.exhausted,
            "Committed page"
        );
    }

    /// Mark `instance` as having no further pages (unpaged sources).
    pub fn mark_exhausted(&mut self, instance: &FeedInstance) {
        let cursor = self.cursors.entry(instance.clone()).or_default();
        cursor.loaded = Some(cursor.loaded.unwrap_or(0));
        cursor.exhausted = true;
    }

    /// `true` until a short page has been committed.
    pub fn has_more(&self, instance: &FeedInstance) -> bool {
        self.cursors
            .get(instance)
            .map(|c| !c.exhausted)
            .unwrap_or(true)
    }

    pub fn reset(&mut self, instance: &FeedInstance) {
        self.cursors.remove(instance);
    }

    pub fn reset_all(&mut self) {
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorId;

    #[test]
    fn test_fresh_cursor_requests_first_page() {
        let cursor = PaginationCursor::new(10);
        let home = FeedInstance::Home;

        assert_eq!(
            cursor.advance(&home),
            PageRequest {
                page_index: 0,
                page_size: 10
            }
        );
        assert!(cursor.has_more(&home));
    }

    #[test]
    fn test_full_page_keeps_has_more() {
        let mut cursor = PaginationCursor::new(10);
        let home = FeedInstance::Home;
        let request = cursor.advance(&home);
        cursor.commit(&home, request, 10);

        assert!(cursor.has_more(&home));
        assert_eq!(cursor.advance(&home).page_index, 1);
    }

    #[test]
    fn test_short_page_ends_feed() {
        let mut cursor = PaginationCursor::new(10);
        let home = FeedInstance::Home;
        cursor.commit(&home, cursor.advance(&home), 10);
        let request = cursor.advance(&home);
        cursor.commit(&home, request, 7);

        assert!(!cursor.has_more(&home));
    }

    #[test]
    fn test_advance_does_not_move_cursor_without_commit() {
        let cursor = PaginationCursor::new(10);
        let home = FeedInstance::Home;
        let first = cursor.advance(&home);
        let second = cursor.advance(&home);
        assert_eq!(first, second);
    }

    #[test]
    fn test_stale_commit_never_decrements() {
        let mut cursor = PaginationCursor::new(5);
        let home = FeedInstance::Home;
        cursor.commit(
            &home,
            PageRequest {
                page_index: 3,
                page_size: 5,
            },
            5,
        );
        cursor.commit(
            &home,
            PageRequest {
                page_index: 1,
                page_size: 5,
            },
            5,
        );
        assert_eq!(cursor.advance(&home).page_index, 4);
    }

    #[test]
    fn test_reset_returns_to_page_zero() {
        let mut cursor = PaginationCursor::new(10);
        let profile = FeedInstance::Profile(AuthorId::new("alice"));
        cursor.commit(&profile, cursor.advance(&profile), 3);
        assert!(!cursor.has_more(&profile));

        cursor.reset(&profile);

        assert!(cursor.has_more(&profile));
        assert_eq!(cursor.advance(&profile).page_index, 0);
    }

    #[test]
    fn test_first_page_leaves_progress_alone() {
        let mut cursor = PaginationCursor::new(10);
        let home = FeedInstance::Home;
        cursor.commit(&home, cursor.advance(&home), 10);

        assert_eq!(
            cursor.first_page(),
            PageRequest {
                page_index: 0,
                page_size: 10
            }
        );
        assert_eq!(cursor.advance(&home).page_index, 1);
    }

    #[test]
    fn test_mark_exhausted() {
        let mut cursor = PaginationCursor::new(10);
        let explore = FeedInstance::Explore;
        cursor.mark_exhausted(&explore);
        assert!(!cursor.has_more(&explore));
        assert_eq!(cursor.advance(&explore).page_index, 1);
    }
}
