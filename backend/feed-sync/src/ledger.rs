//! In-memory post ledger
//!
//! Holds users, follows, posts, likes and reposts with the same rules as the
//! hosted ledger: newest-first timelines paged by slicing, case-insensitive
//! substring search, saturating like counts, and `0` for a repost or quote of
//! an unknown post. `LedgerClient` binds the ledger to the caller identity and
//! serves it through [`PostService`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{RemoteError, RemoteResult};
use crate::models::{AuthorId, PostId, RawPost, RegisteredUser, ViewerId};
use crate::services::identity::IdentityProvider;
use crate::services::remote::PostService;

#[derive(Debug, Default)]
struct LedgerState {
    handles: HashMap<AuthorId, String>,
    /// follower -> followed authors
    follows: HashMap<AuthorId, HashSet<AuthorId>>,
    posts: BTreeMap<PostId, RawPost>,
    likes: HashMap<PostId, HashSet<ViewerId>>,
    reposts: HashMap<PostId, HashSet<ViewerId>>,
    next_id: u64,
    last_timestamp_ns: u64,
}

impl LedgerState {
    fn mint_id(&mut self) -> PostId {
        self.next_id += 1;
        PostId(self.next_id)
    }

    /// Wall clock in nanoseconds, forced strictly increasing.
    fn next_timestamp(&mut self) -> u64 {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .unwrap_or(0);
        self.last_timestamp_ns = now.max(self.last_timestamp_ns + 1);
        self.last_timestamp_ns
    }

    fn insert_post(
        &mut self,
        author: &AuthorId,
        content: String,
        original_post_id: Option<PostId>,
        quote_content: Option<String>,
    ) -> PostId {
        let id = self.mint_id();
        let timestamp_ns = self.next_timestamp();
        self.posts.insert(
            id,
            RawPost {
                id,
                author: author.clone(),
                content,
                timestamp_ns,
                likes: 0,
                reposts: 0,
                quotes: 0,
                original_post_id,
                quote_content,
            },
        );
        id
    }

    fn followers_of(&self, user: &AuthorId) -> Vec<AuthorId> {
        let mut followers: Vec<AuthorId> = self
            .follows
            .iter()
            .filter(|(_, followed)| followed.contains(user))
            .map(|(follower, _)| follower.clone())
            .collect();
        followers.sort_by(|a, b| a.0.cmp(&b.0));
        followers
    }
}

fn newest_first_page(mut posts: Vec<RawPost>, page_index: u64, page_size: u64) -> Vec<RawPost> {
    posts.sort_by(|a, b| {
        b.timestamp_ns
            .cmp(&a.timestamp_ns)
            .then_with(|| b.id.cmp(&a.id))
    });
    let start = page_index.saturating_mul(page_size);
    posts
        .into_iter()
        .skip(usize::try_from(start).unwrap_or(usize::MAX))
        .take(usize::try_from(page_size).unwrap_or(usize::MAX))
        .collect()
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: &AuthorId, handle: &str) {
        self.state
            .write()
            .handles
            .insert(user.clone(), handle.to_string());
        info!(user = %user, handle = handle, "Registered user");
    }

    pub fn handle_of(&self, user: &AuthorId) -> Option<String> {
        self.state.read().handles.get(user).cloned()
    }

    /// Case-insensitive handle prefix match, ordered by handle
    pub fn search_users(&self, handle_prefix: &str) -> Vec<RegisteredUser> {
        let prefix = handle_prefix.to_lowercase();
        let state = self.state.read();
        let mut users: Vec<RegisteredUser> = state
            .handles
            .iter()
            .filter(|(_, handle)| handle.to_lowercase().starts_with(&prefix))
            .map(|(id, handle)| RegisteredUser {
                id: id.clone(),
                handle: handle.clone(),
                followers: state.followers_of(id).len() as u64,
            })
            .collect();
        users.sort_by(|a, b| a.handle.cmp(&b.handle));
        users
    }

    pub fn follow(&self, follower: &AuthorId, followed: &AuthorId) {
        self.state
            .write()
            .follows
            .entry(follower.clone())
            .or_default()
            .insert(followed.clone());
        debug!(follower = %follower, followed = %followed, "Follow recorded");
    }

    pub fn following(&self, user: &AuthorId) -> Vec<AuthorId> {
        let mut followed: Vec<AuthorId> = self
            .state
            .read()
            .follows
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        followed.sort_by(|a, b| a.0.cmp(&b.0));
        followed
    }

    pub fn followers(&self, user: &AuthorId) -> Vec<AuthorId> {
        self.state.read().followers_of(user)
    }

    pub fn post(&self, id: PostId) -> Option<RawPost> {
        self.state.read().posts.get(&id).cloned()
    }

    pub fn publish(&self, author: &AuthorId, content: &str) -> PostId {
        let id = self
            .state
            .write()
            .insert_post(author, content.to_string(), None, None);
        debug!(author = %author, post_id = %id, "Post published");
        id
    }

    /// Own posts plus posts of followed authors, newest first
    pub fn timeline(&self, caller: &AuthorId, page_index: u64, page_size: u64) -> Vec<RawPost> {
        let state = self.state.read();
        let followed = state.follows.get(caller);
        let posts = state
            .posts
            .values()
            .filter(|p| &p.author == caller || followed.is_some_and(|f| f.contains(&p.author)))
            .cloned()
            .collect();
        newest_first_page(posts, page_index, page_size)
    }

    pub fn user_posts(&self, author: &AuthorId, page_index: u64, page_size: u64) -> Vec<RawPost> {
        let posts = self
            .state
            .read()
            .posts
            .values()
            .filter(|p| &p.author == author)
            .cloned()
            .collect();
        newest_first_page(posts, page_index, page_size)
    }

    /// Every post whose content contains `keyword`, ignoring case, oldest first
    pub fn search(&self, keyword: &str) -> Vec<RawPost> {
        let keyword = keyword.to_lowercase();
        self.state
            .read()
            .posts
            .values()
            .filter(|p| p.content.to_lowercase().contains(&keyword))
            .cloned()
            .collect()
    }

    /// Flip `caller`'s like; returns the new liked state.
    pub fn toggle_like(&self, caller: &ViewerId, post_id: PostId) -> bool {
        let mut state = self.state.write();
        let likers = state.likes.entry(post_id).or_default();
        let liked = if likers.remove(caller) {
            false
        } else {
            likers.insert(caller.clone());
            true
        };
        if let Some(post) = state.posts.get_mut(&post_id) {
            post.likes = if liked {
                post.likes + 1
            } else {
                post.likes.saturating_sub(1)
            };
        }
        liked
    }

    pub fn has_liked(&self, post_id: PostId, user: &ViewerId) -> bool {
        self.state
            .read()
            .likes
            .get(&post_id)
            .is_some_and(|likers| likers.contains(user))
    }

    pub fn has_reposted(&self, post_id: PostId, user: &ViewerId) -> bool {
        self.state
            .read()
            .reposts
            .get(&post_id)
            .is_some_and(|reposters| reposters.contains(user))
    }

    /// Returns `PostId(0)` when the original does not exist.
    pub fn repost(&self, caller: &ViewerId, original_id: PostId) -> PostId {
        let mut state = self.state.write();
        let Some(content) = state.posts.get(&original_id).map(|p| p.content.clone()) else {
            return PostId(0);
        };
        let id = state.insert_post(
            &caller.as_author(),
            format!("Reposted: {}", content),
            Some(original_id),
            None,
        );
        if let Some(original) = state.posts.get_mut(&original_id) {
            original.reposts += 1;
        }
        state
            .reposts
            .entry(original_id)
            .or_default()
            .insert(caller.clone());
        id
    }

    /// Returns `PostId(0)` when the original does not exist.
    pub fn quote(&self, caller: &ViewerId, original_id: PostId, content: &str) -> PostId {
        let mut state = self.state.write();
        let Some(original_content) = state.posts.get(&original_id).map(|p| p.content.clone())
        else {
            return PostId(0);
        };
        let id = state.insert_post(
            &caller.as_author(),
            format!("Quote: {}", content),
            Some(original_id),
            Some(original_content),
        );
        if let Some(original) = state.posts.get_mut(&original_id) {
            original.quotes += 1;
        }
        id
    }
}

/// [`PostService`] over an [`InMemoryLedger`], acting as the current viewer
#[derive(Clone)]
pub struct LedgerClient {
    ledger: Arc<InMemoryLedger>,
    identity: Arc<dyn IdentityProvider>,
}

impl LedgerClient {
    pub fn new(ledger: Arc<InMemoryLedger>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { ledger, identity }
    }

    pub fn ledger(&self) -> &Arc<InMemoryLedger> {
        &self.ledger
    }

    fn caller(&self) -> RemoteResult<ViewerId> {
        self.identity
            .current_viewer()
            .ok_or_else(|| RemoteError::Rejected("anonymous caller".to_string()))
    }
}

#[async_trait]
impl PostService for LedgerClient {
    async fn fetch_page(&self, page_index: u64, page_size: u64) -> RemoteResult<Vec<RawPost>> {
        // anonymous callers follow nobody and own no posts
        let Some(caller) = self.identity.current_viewer() else {
            return Ok(Vec::new());
        };
        Ok(self
            .ledger
            .timeline(&caller.as_author(), page_index, page_size))
    }

    async fn search(&self, keyword: &str) -> RemoteResult<Vec<RawPost>> {
        Ok(self.ledger.search(keyword))
    }

    async fn fetch_user_page(
        &self,
        author: &AuthorId,
        page_index: u64,
        page_size: u64,
    ) -> RemoteResult<Vec<RawPost>> {
        Ok(self.ledger.user_posts(author, page_index, page_size))
    }

    async fn is_liked_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool> {
        Ok(self.ledger.has_liked(post_id, viewer))
    }

    async fn is_reposted_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool> {
        Ok(self.ledger.has_reposted(post_id, viewer))
    }

    async fn toggle_like(&self, post_id: PostId) -> RemoteResult<bool> {
        let caller = self.caller()?;
        Ok(self.ledger.toggle_like(&caller, post_id))
    }

    async fn repost(&self, post_id: PostId) -> RemoteResult<PostId> {
        let caller = self.caller()?;
        Ok(self.ledger.repost(&caller, post_id))
    }

    async fn quote(&self, post_id: PostId, content: &str) -> RemoteResult<PostId> {
        let caller = self.caller()?;
        Ok(self.ledger.quote(&caller, post_id, content))
    }

    async fn create_post(&self, content: &str) -> RemoteResult<PostId> {
        let caller = self.caller()?;
        Ok(self.ledger.publish(&caller.as_author(), content))
    }

    async fn search_users(&self, handle_prefix: &str) -> RemoteResult<Vec<RegisteredUser>> {
        Ok(self.ledger.search_users(handle_prefix))
    }

    async fn following(&self, user: &AuthorId) -> RemoteResult<Vec<AuthorId>> {
        Ok(self.ledger.following(user))
    }

    async fn follow(&self, author: &AuthorId) -> RemoteResult<()> {
        let caller = self.caller()?;
        self.ledger.follow(&caller.as_author(), author);
        Ok(())
    }
}
