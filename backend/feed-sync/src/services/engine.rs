//! Feed synchronization engine
//!
//! One engine serves every feed instance (home, explore, profiles) from an
//! arena of per-instance state. Engine state sits behind a single mutex that
//! is never held across a remote call.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{FeedError, FeedResult, RemoteResult};
use crate::models::{
    AuthorId, AuthorView, FeedInstance, FeedSnapshot, InteractionKind, PostId, RawPost,
    SuggestedUser, TrendingTopic, ViewPost, ViewerId,
};
use crate::services::enrichment::EnrichmentPipeline;
use crate::services::feed_store::{FeedStore, FetchGeneration};
use crate::services::identity::IdentityProvider;
use crate::services::interactions::{
    InteractionController, InteractionPhase, PendingInteraction,
};
use crate::services::pagination::{PageRequest, PaginationCursor};
use crate::services::remote::PostService;

/// Result of a page load or refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { posts: usize, has_more: bool },
    /// A newer fetch (or a viewer change) replaced this one; nothing applied
    Superseded,
    /// Already loading, feed exhausted, or blank query
    NothingToLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepostOutcome {
    pub repost_id: PostId,
    /// Whether the follow-up refresh published a new page
    pub refreshed: bool,
}

struct SyncState {
    store: FeedStore,
    cursors: PaginationCursor,
    interactions: InteractionController,
    /// Viewer the store contents belong to
    viewer: Option<ViewerId>,
    /// Bumped on every viewer change
    viewer_epoch: u64,
}

pub struct FeedSyncEngine {
    service: Arc<dyn PostService>,
    identity: Arc<dyn IdentityProvider>,
    pipeline: EnrichmentPipeline,
    config: EngineConfig,
    state: Mutex<SyncState>,
}

impl FeedSyncEngine {
    pub fn new(
        service: Arc<dyn PostService>,
        identity: Arc<dyn IdentityProvider>,
        config: EngineConfig,
    ) -> Self {
        let pipeline = EnrichmentPipeline::new(Arc::clone(&service), config.lookup_concurrency);
        let viewer = identity.current_viewer();
        Self {
            service,
            identity,
            pipeline,
            state: Mutex::new(SyncState {
                store: FeedStore::new(),
                cursors: PaginationCursor::new(config.page_size),
                interactions: InteractionController::new(),
                viewer,
                viewer_epoch: 0,
            }),
            config,
        }
    }

    /// Presentation-facing handle for one feed instance
    pub fn feed(&self, instance: FeedInstance) -> FeedHandle<'_> {
        FeedHandle {
            engine: self,
            instance,
        }
    }

    /// Compare the identity provider's viewer with the viewer the store was
    /// enriched for; on change every instance is invalidated.
    pub fn sync_viewer(&self) -> Option<ViewerId> {
        let current = self.identity.current_viewer();
        let mut state = self.state.lock();
        if state.viewer != current {
            info!(
                previous = ?state.viewer,
                current = ?current,
                "Viewer changed, invalidating all feeds"
            );
            state.store.invalidate_all();
            state.cursors.reset_all();
            state.interactions.clear();
            state.viewer = current.clone();
            state.viewer_epoch += 1;
        }
        current
    }

    pub fn snapshot(&self, instance: &FeedInstance) -> FeedSnapshot {
        self.sync_viewer();
        let state = self.state.lock();
        FeedSnapshot {
            posts: state.store.posts(instance).to_vec(),
            is_loading: state.store.is_loading(instance),
            has_more: state.cursors.has_more(instance),
        }
    }

    /// Fetch the next page; the first call loads page 0.
    pub async fn load_next_page(&self, instance: &FeedInstance) -> FeedResult<LoadOutcome> {
        let viewer = self.sync_viewer();
        let (request, generation, query) = {
            let mut state = self.state.lock();
            if state.store.is_loading(instance) || !state.cursors.has_more(instance) {
                debug!(instance = %instance, "Skipping load: loading or exhausted");
                return Ok(LoadOutcome::NothingToLoad);
            }
            let request = state.cursors.advance(instance);
            let generation = state.store.begin_fetch(instance);
            let query = state.store.query(instance).map(str::to_string);
            (request, generation, query)
        };
        self.fetch_and_publish(instance, request, generation, query, viewer)
            .await
    }

    /// Replace the instance's contents with page 0. Supersedes any fetch in
    /// flight for the instance. Cursor and contents are left alone if the
    /// fetch fails.
    pub async fn refresh(&self, instance: &FeedInstance) -> FeedResult<LoadOutcome> {
        let viewer = self.sync_viewer();
        let query = self.state.lock().store.query(instance).map(str::to_string);
        self.reload(instance, query, viewer).await
    }

    /// Switch the explore instance to search results for `keyword`. The
    /// keyword sticks only once its results are published.
    pub async fn search(&self, keyword: &str) -> FeedResult<LoadOutcome> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(LoadOutcome::NothingToLoad);
        }
        let viewer = self.sync_viewer();
        info!(keyword = keyword, "Explore search");
        self.reload(&FeedInstance::Explore, Some(keyword.to_string()), viewer)
            .await
    }

    /// Return the explore instance to timeline pages.
    pub async fn clear_search(&self) -> FeedResult<LoadOutcome> {
        let viewer = self.sync_viewer();
        self.reload(&FeedInstance::Explore, None, viewer).await
    }

    /// Post counts for the configured hashtags, in configured order. A tag
    /// whose search fails is left out.
    pub async fn trending_topics(&self) -> Vec<TrendingTopic> {
        let service = &self.service;
        let lookups = self.config.trending_hashtags.iter().map(move |tag| async move {
            match service.search(tag).await {
                Ok(posts) => Some(TrendingTopic::new(tag.as_str(), posts.len())),
                Err(e) => {
                    warn!(topic = %tag, error = %e, "Trending lookup failed");
                    None
                }
            }
        });
        let topics: Vec<Option<TrendingTopic>> = stream::iter(lookups)
            .buffered(self.config.lookup_concurrency.max(1))
            .collect()
            .await;
        topics.into_iter().flatten().collect()
    }

    /// Users whose handle starts with `handle_prefix`, minus the viewer,
    /// flagged with whether the viewer already follows them.
    pub async fn suggested_users(&self, handle_prefix: &str) -> FeedResult<Vec<SuggestedUser>> {
        let viewer = self.sync_viewer().map(|v| v.as_author());
        let users = self
            .service
            .search_users(handle_prefix.trim())
            .await
            .map_err(|e| FeedError::TransientFetch {
                instance: FeedInstance::Explore,
                source: e,
            })?;

        let following: HashSet<AuthorId> = match &viewer {
            Some(author) => match self.service.following(author).await {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(viewer = %author, error = %e, "Following lookup failed");
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        Ok(users
            .into_iter()
            .filter(|user| Some(&user.id) != viewer.as_ref())
            .take(self.config.suggestion_limit)
            .map(|user| {
                let is_following = following.contains(&user.id);
                SuggestedUser::from_registered(user, is_following)
            })
            .collect())
    }

    /// Follow `author`. The home timeline depends on the follow graph, so
    /// success refreshes it.
    pub async fn follow(&self, author: &AuthorId) -> FeedResult<()> {
        let viewer = self
            .sync_viewer()
            .ok_or_else(|| FeedError::UnauthenticatedAction("follow users".to_string()))?;

        self.service
            .follow(author)
            .await
            .map_err(|e| FeedError::MutationRejected {
                action: "follow".to_string(),
                target: format!("user {}", author),
                reason: e.to_string(),
            })?;

        info!(viewer = %viewer, author = %author, "Followed user");
        self.refresh_after_mutation(&FeedInstance::Home).await;
        Ok(())
    }

    /// Whether a like or repost of `post_id` is still waiting on the server.
    pub fn is_pending(&self, instance: &FeedInstance, post_id: &str, kind: InteractionKind) -> bool {
        let state = self.state.lock();
        state.interactions.phase(instance, post_id, kind) == InteractionPhase::Optimistic
    }

    /// Toggle the viewer's like on `post_id`. Resolves with the settled liked
    /// state once the server has answered.
    pub async fn like(&self, instance: &FeedInstance, post_id: &str) -> FeedResult<bool> {
        let viewer = self
            .sync_viewer()
            .ok_or_else(|| FeedError::UnauthenticatedAction("like posts".to_string()))?;
        let id = parse_post_id(post_id)?;
        let mut guard = self.begin_interaction(instance, post_id, InteractionKind::Like)?;

        match self.service.toggle_like(id).await {
            Ok(liked) => {
                guard.confirm_like(liked);
                info!(
                    instance = %instance,
                    post_id = post_id,
                    viewer = %viewer,
                    liked = liked,
                    "Like settled"
                );
                Ok(liked)
            }
            Err(e) => {
                guard.roll_back();
                Err(FeedError::MutationRejected {
                    action: "like".to_string(),
                    target: format!("post {}", post_id),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Repost `post_id`. A minted repost changes the feed's composition, so
    /// success triggers a full refresh of the instance.
    pub async fn repost(&self, instance: &FeedInstance, post_id: &str) -> FeedResult<RepostOutcome> {
        let viewer = self
            .sync_viewer()
            .ok_or_else(|| FeedError::UnauthenticatedAction("repost".to_string()))?;
        let id = parse_post_id(post_id)?;
        let mut guard = self.begin_interaction(instance, post_id, InteractionKind::Repost)?;

        let reason = match self.service.repost(id).await {
            Ok(repost_id) if repost_id.is_minted() => {
                guard.confirm_repost();
                info!(
                    instance = %instance,
                    post_id = post_id,
                    repost_id = %repost_id,
                    viewer = %viewer,
                    "Repost created"
                );
                let refreshed = self.refresh_after_mutation(instance).await;
                return Ok(RepostOutcome {
                    repost_id,
                    refreshed,
                });
            }
            Ok(_) => "server created no repost".to_string(),
            Err(e) => e.to_string(),
        };

        guard.roll_back();
        Err(FeedError::MutationRejected {
            action: "repost".to_string(),
            target: format!("post {}", post_id),
            reason,
        })
    }

    /// Quote `post_id` with `content`. No optimistic state: the quote only
    /// shows up through the refresh that follows.
    pub async fn quote(
        &self,
        instance: &FeedInstance,
        post_id: &str,
        content: &str,
    ) -> FeedResult<PostId> {
        self.sync_viewer()
            .ok_or_else(|| FeedError::UnauthenticatedAction("quote posts".to_string()))?;
        let content = self.validate_content(content)?;
        let id = parse_post_id(post_id)?;

        let quote_id = match self.service.quote(id, &content).await {
            Ok(quote_id) if quote_id.is_minted() => quote_id,
            Ok(_) => {
                return Err(FeedError::MutationRejected {
                    action: "quote".to_string(),
                    target: format!("post {}", post_id),
                    reason: "server created no quote".to_string(),
                })
            }
            Err(e) => {
                return Err(FeedError::MutationRejected {
                    action: "quote".to_string(),
                    target: format!("post {}", post_id),
                    reason: e.to_string(),
                })
            }
        };

        info!(instance = %instance, post_id = post_id, quote_id = %quote_id, "Quote created");
        self.refresh_after_mutation(instance).await;
        Ok(quote_id)
    }

    /// Publish a new post and refresh `instance` so it shows up.
    pub async fn submit_post(&self, instance: &FeedInstance, content: &str) -> FeedResult<PostId> {
        self.sync_viewer()
            .ok_or_else(|| FeedError::UnauthenticatedAction("post".to_string()))?;
        let content = self.validate_content(content)?;

        let post_id = self
            .service
            .create_post(&content)
            .await
            .map_err(|e| FeedError::MutationRejected {
                action: "post".to_string(),
                target: "new post".to_string(),
                reason: e.to_string(),
            })?;

        info!(instance = %instance, post_id = %post_id, "Post created");
        self.refresh_after_mutation(instance).await;
        Ok(post_id)
    }

    fn validate_content(&self, content: &str) -> FeedResult<String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(FeedError::InvalidContent("content is empty".to_string()));
        }
        let len = trimmed.chars().count();
        if len > self.config.max_post_length {
            return Err(FeedError::InvalidContent(format!(
                "{} characters exceeds the {} character limit",
                len, self.config.max_post_length
            )));
        }
        Ok(trimmed.to_string())
    }

    fn begin_interaction(
        &self,
        instance: &FeedInstance,
        post_id: &str,
        kind: InteractionKind,
    ) -> FeedResult<PendingGuard<'_>> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let pending = state
            .interactions
            .begin(&mut state.store, instance, post_id, kind)?;
        Ok(PendingGuard {
            state: &self.state,
            pending: Some(pending),
            viewer_epoch: state.viewer_epoch,
        })
    }

    /// The mutation itself succeeded; a failed refresh is logged, not surfaced.
    async fn refresh_after_mutation(&self, instance: &FeedInstance) -> bool {
        match self.refresh(instance).await {
            Ok(LoadOutcome::Loaded { .. }) => true,
            Ok(_) => false,
            Err(e) => {
                warn!(instance = %instance, error = %e, "Refresh after mutation failed");
                false
            }
        }
    }

    async fn reload(
        &self,
        instance: &FeedInstance,
        query: Option<String>,
        viewer: Option<ViewerId>,
    ) -> FeedResult<LoadOutcome> {
        let (request, generation) = {
            let mut state = self.state.lock();
            let request = state.cursors.first_page();
            let generation = state.store.begin_fetch(instance);
            (request, generation)
        };
        self.fetch_and_publish(instance, request, generation, query, viewer)
            .await
    }

    async fn fetch_raw(
        &self,
        instance: &FeedInstance,
        request: PageRequest,
        query: Option<&str>,
    ) -> RemoteResult<Vec<RawPost>> {
        match (instance, query) {
            (FeedInstance::Explore, Some(keyword)) => {
                let mut posts = self.service.search(keyword).await?;
                posts.truncate(self.config.search_result_limit);
                Ok(posts)
            }
            (FeedInstance::Home, _) | (FeedInstance::Explore, None) => {
                self.service
                    .fetch_page(request.page_index, request.page_size)
                    .await
            }
            (FeedInstance::Profile(author), _) => {
                self.service
                    .fetch_user_page(author, request.page_index, request.page_size)
                    .await
            }
        }
    }

    async fn fetch_and_publish(
        &self,
        instance: &FeedInstance,
        request: PageRequest,
        generation: FetchGeneration,
        query: Option<String>,
        viewer: Option<ViewerId>,
    ) -> FeedResult<LoadOutcome> {
        let raw = match self.fetch_raw(instance, request, query.as_deref()).await {
            Ok(raw) => raw,
            Err(e) => {
                self.state.lock().store.finish_fetch(instance, generation);
                warn!(
                    instance = %instance,
                    page_index = request.page_index,
                    error = %e,
                    "Feed fetch failed"
                );
                return Err(FeedError::TransientFetch {
                    instance: instance.clone(),
                    source: e,
                });
            }
        };
        let fetched = raw.len();

        let mut posts = self.pipeline.enrich(raw, viewer.as_ref()).await;
        self.apply_own_handle(instance, viewer.as_ref(), &mut posts);

        let mut state = self.state.lock();
        if !state.store.is_current(instance, generation) {
            warn!(
                instance = %instance,
                page_index = request.page_index,
                "Discarding superseded fetch"
            );
            return Ok(LoadOutcome::Superseded);
        }

        if request.page_index == 0 {
            state.cursors.reset(instance);
            state.store.set_query(instance, query.clone());
            state.store.replace_page(instance, posts);
        } else {
            state.store.append_page(instance, posts);
        }
        if query.is_some() {
            state.cursors.mark_exhausted(instance);
        } else {
            state.cursors.commit(instance, request, fetched);
        }
        state.store.finish_fetch(instance, generation);

        let has_more = state.cursors.has_more(instance);
        debug!(
            instance = %instance,
            page_index = request.page_index,
            fetched = fetched,
            has_more = has_more,
            "Published page"
        );
        Ok(LoadOutcome::Loaded {
            posts: fetched,
            has_more,
        })
    }

    /// On the viewer's own profile, posts carry the viewer's registered handle.
    fn apply_own_handle(
        &self,
        instance: &FeedInstance,
        viewer: Option<&ViewerId>,
        posts: &mut [ViewPost],
    ) {
        let FeedInstance::Profile(author) = instance else {
            return;
        };
        if viewer.map(ViewerId::as_author).as_ref() != Some(author) {
            return;
        }
        let Some(handle) = self.identity.current_handle() else {
            return;
        };
        let view = AuthorView::with_handle(author, &handle);
        for post in posts.iter_mut().filter(|p| p.author.id == author.as_str()) {
            post.author = view.clone();
        }
    }
}

fn parse_post_id(post_id: &str) -> FeedResult<PostId> {
    post_id
        .parse()
        .map_err(|_| FeedError::InvalidPostId(post_id.to_string()))
}

/// Owns one optimistic interaction until it settles. Dropping it unsettled
/// (the caller abandoned the action) rolls the interaction back.
struct PendingGuard<'a> {
    state: &'a Mutex<SyncState>,
    pending: Option<PendingInteraction>,
    viewer_epoch: u64,
}

impl PendingGuard<'_> {
    fn settle(&mut self, f: impl FnOnce(&mut SyncState, &mut PendingInteraction)) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        let mut state = self.state.lock();
        if state.viewer_epoch != self.viewer_epoch {
            // the store was invalidated under us; nothing left to reconcile
            debug!(post_id = %pending.post_id, "Interaction outlived its viewer");
            return;
        }
        f(&mut *state, &mut pending);
        debug!(
            post_id = %pending.post_id,
            kind = ?pending.kind,
            phase = ?pending.phase(),
            "Interaction settled"
        );
    }

    fn confirm_like(&mut self, authoritative: bool) {
        self.settle(|state, pending| {
            state
                .interactions
                .confirm_like(&mut state.store, pending, authoritative)
        });
    }

    fn confirm_repost(&mut self) {
        self.settle(|state, pending| state.interactions.confirm_repost(pending));
    }

    fn roll_back(&mut self) {
        self.settle(|state, pending| state.interactions.roll_back(&mut state.store, pending));
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.is_some() {
            self.roll_back();
        }
    }
}

/// One feed instance as seen by the presentation layer
pub struct FeedHandle<'a> {
    engine: &'a FeedSyncEngine,
    instance: FeedInstance,
}

impl FeedHandle<'_> {
    pub fn snapshot(&self) -> FeedSnapshot {
        self.engine.snapshot(&self.instance)
    }

    pub async fn load_next_page(&self) -> FeedResult<LoadOutcome> {
        self.engine.load_next_page(&self.instance).await
    }

    pub async fn refresh(&self) -> FeedResult<LoadOutcome> {
        self.engine.refresh(&self.instance).await
    }

    pub async fn like(&self, post_id: &str) -> FeedResult<bool> {
        self.engine.like(&self.instance, post_id).await
    }

    pub async fn repost(&self, post_id: &str) -> FeedResult<RepostOutcome> {
        self.engine.repost(&self.instance, post_id).await
    }

    pub async fn quote(&self, post_id: &str, content: &str) -> FeedResult<PostId> {
        self.engine.quote(&self.instance, post_id, content).await
    }

    pub async fn submit_post(&self, content: &str) -> FeedResult<PostId> {
        self.engine.submit_post(&self.instance, content).await
    }

    pub fn is_pending(&self, post_id: &str, kind: InteractionKind) -> bool {
        self.engine.is_pending(&self.instance, post_id, kind)
    }

    /// Only the explore instance searches; other instances ignore it.
    pub async fn search(&self, keyword: &str) -> FeedResult<LoadOutcome> {
        if self.instance != FeedInstance::Explore {
            return Ok(LoadOutcome::NothingToLoad);
        }
        self.engine.search(keyword).await
    }
}
