//! Feed store: ordered, deduplicated view posts per feed instance
//!
//! Each instance owns its state exclusively. Posts keep server page order and
//! are never reordered by updates; a post fetched again replaces the older copy
//! in place.

use std::collections::HashMap;
use tracing::debug;

use crate::models::{FeedInstance, ViewPost, ViewPostPatch};

/// Identifies one fetch of one instance; only the latest one may publish.
pub type FetchGeneration = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    Missing,
}

#[derive(Debug, Default)]
pub struct FeedState {
    posts: Vec<ViewPost>,
    /// post id -> position in `posts`
    index: HashMap<String, usize>,
    is_loading: bool,
    generation: FetchGeneration,
    /// Active search keyword (explore only)
    query: Option<String>,
}

impl FeedState {
    fn upsert(&mut self, post: ViewPost) -> bool {
        match self.index.get(&post.id) {
            Some(&pos) => {
                self.posts[pos] = post;
                false
            }
            None => {
                self.index.insert(post.id.clone(), self.posts.len());
                self.posts.push(post);
                true
            }
        }
    }

    fn clear_posts(&mut self) {
        self.posts.clear();
        self.index.clear();
    }
}

#[derive(Debug, Default)]
pub struct FeedStore {
    feeds: HashMap<FeedInstance, FeedState>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self, instance: &FeedInstance) -> &mut FeedState {
        self.feeds.entry(instance.clone()).or_default()
    }

    /// Discard the instance's contents and install `posts` (first page or
    /// full refresh).
    pub fn replace_page(&mut self, instance: &FeedInstance, posts: Vec<ViewPost>) {
        let state = self.state_mut(instance);
        state.clear_posts();
        for post in posts {
            state.upsert(post);
        }
        debug!(instance = %instance, posts = state.posts.len(), "Replaced feed page");
    }

    /// Append a "load more" page. Returns how many new posts were added;
    /// already present ids are refreshed in place.
    pub fn append_page(&mut self, instance: &FeedInstance, posts: Vec<ViewPost>) -> usize {
        let state = self.state_mut(instance);
        let appended = posts
            .into_iter()
            .map(|post| state.upsert(post))
            .filter(|added| *added)
            .count();
        debug!(
            instance = %instance,
            appended = appended,
            total = state.posts.len(),
            "Appended feed page"
        );
        appended
    }

    /// Shallow-merge `patch` onto the post with `post_id`, if present.
    pub fn patch_post(
        &mut self,
        instance: &FeedInstance,
        post_id: &str,
        patch: &ViewPostPatch,
    ) -> PatchOutcome {
        let Some(state) = self.feeds.get_mut(instance) else {
            return PatchOutcome::Missing;
        };
        match state.index.get(post_id) {
            Some(&pos) => {
                patch.apply(&mut state.posts[pos]);
                PatchOutcome::Applied
            }
            None => {
                debug!(instance = %instance, post_id = post_id, "Patch target missing");
                PatchOutcome::Missing
            }
        }
    }

    pub fn post(&self, instance: &FeedInstance, post_id: &str) -> Option<&ViewPost> {
        let state = self.feeds.get(instance)?;
        state.index.get(post_id).map(|&pos| &state.posts[pos])
    }

    pub fn posts(&self, instance: &FeedInstance) -> &[ViewPost] {
        self.feeds
            .get(instance)
            .map(|s| s.posts.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_loading(&self, instance: &FeedInstance) -> bool {
        self.feeds.get(instance).map(|s| s.is_loading).unwrap_or(false)
    }

    /// Start a fetch: supersedes any fetch in flight for the instance.
    pub fn begin_fetch(&mut self, instance: &FeedInstance) -> FetchGeneration {
        let state = self.state_mut(instance);
        state.generation += 1;
        state.is_loading = true;
        state.generation
    }

    pub fn is_current(&self, instance: &FeedInstance, generation: FetchGeneration) -> bool {
        self.feeds
            .get(instance)
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }

    /// Clear the loading flag if `generation` is still the latest fetch.
    pub fn finish_fetch(&mut self, instance: &FeedInstance, generation: FetchGeneration) {
        if let Some(state) = self.feeds.get_mut(instance) {
            if state.generation == generation {
                state.is_loading = false;
            }
        }
    }

    pub fn query(&self, instance: &FeedInstance) -> Option<&str> {
        self.feeds.get(instance).and_then(|s| s.query.as_deref())
    }

    pub fn set_query(&mut self, instance: &FeedInstance, query: Option<String>) {
        self.state_mut(instance).query = query;
    }

    /// Drop every instance's posts and supersede in-flight fetches. Used when
    /// the viewer changes: interaction flags of the old viewer are stale.
    pub fn invalidate_all(&mut self) {
        for (instance, state) in self.feeds.iter_mut() {
            state.clear_posts();
            state.generation += 1;
            state.is_loading = false;
            debug!(instance = %instance, "Invalidated feed");
        }
    }
}
