//! Shared fixtures for feed-sync integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};

use feed_sync::{
    AuthorId, EngineConfig, FeedSyncEngine, PostId, PostService, RawPost, RegisteredUser,
    RemoteError, RemoteResult, SessionIdentity, ViewerId,
};

/// Holds calls until the test releases them with a response.
pub struct Gate<T> {
    held: AtomicBool,
    waiters: Mutex<VecDeque<oneshot::Sender<T>>>,
    arrived: Notify,
}

impl<T> Default for Gate<T> {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
            waiters: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
        }
    }
}

impl<T> Gate<T> {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// `None` when the gate is open; otherwise waits for `release`.
    async fn pass(&self) -> Option<T> {
        if !self.held.load(Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push_back(tx);
        self.arrived.notify_one();
        rx.await.ok()
    }

    /// Resolves once a call is parked at the gate.
    pub async fn arrival(&self) {
        self.arrived.notified().await;
    }

    /// Answer the oldest parked call.
    pub fn release(&self, value: T) -> bool {
        match self.waiters.lock().pop_front() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

#[derive(Default)]
pub struct CallCounts {
    pub fetch_page: AtomicUsize,
    pub search: AtomicUsize,
    pub lookups: AtomicUsize,
    pub toggle_like: AtomicUsize,
    pub repost: AtomicUsize,
    pub create_post: AtomicUsize,
    pub follow: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Post service whose data and answers are set up by each test
pub struct ScriptedService {
    pub timeline: Mutex<Vec<RawPost>>,
    pub liked: Mutex<HashSet<(PostId, ViewerId)>>,
    pub reposted: Mutex<HashSet<(PostId, ViewerId)>>,
    /// Identity mutations are attributed to
    pub caller: Mutex<ViewerId>,
    pub toggle_results: Mutex<VecDeque<RemoteResult<bool>>>,
    pub repost_results: Mutex<VecDeque<RemoteResult<PostId>>>,
    pub users: Mutex<Vec<RegisteredUser>>,
    pub follows: Mutex<HashSet<(AuthorId, AuthorId)>>,
    pub fail_fetch: AtomicBool,
    pub fail_search: AtomicBool,
    pub fail_lookups: AtomicBool,
    pub toggle_gate: Gate<RemoteResult<bool>>,
    pub repost_gate: Gate<RemoteResult<PostId>>,
    pub fetch_gate: Gate<RemoteResult<Vec<RawPost>>>,
    pub calls: CallCounts,
}

impl ScriptedService {
    pub fn new(caller: &str) -> Self {
        Self {
            timeline: Mutex::new(Vec::new()),
            liked: Mutex::new(HashSet::new()),
            reposted: Mutex::new(HashSet::new()),
            caller: Mutex::new(ViewerId::new(caller)),
            toggle_results: Mutex::new(VecDeque::new()),
            repost_results: Mutex::new(VecDeque::new()),
            users: Mutex::new(Vec::new()),
            follows: Mutex::new(HashSet::new()),
            fail_fetch: AtomicBool::new(false),
            fail_search: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
            toggle_gate: Gate::default(),
            repost_gate: Gate::default(),
            fetch_gate: Gate::default(),
            calls: CallCounts::default(),
        }
    }

    /// Timeline of `count` posts with ids `count..=1`, newest first.
    pub fn with_posts(self, count: u64) -> Self {
        *self.timeline.lock() = (1..=count).rev().map(|id| raw_post(id, 0)).collect();
        self
    }

    pub fn set_timeline(&self, posts: Vec<RawPost>) {
        *self.timeline.lock() = posts;
    }

    pub fn like_as(&self, post_id: u64, viewer: &str) {
        self.liked
            .lock()
            .insert((PostId(post_id), ViewerId::new(viewer)));
    }

    pub fn script_toggle(&self, result: RemoteResult<bool>) {
        self.toggle_results.lock().push_back(result);
    }

    pub fn script_repost(&self, result: RemoteResult<PostId>) {
        self.repost_results.lock().push_back(result);
    }

    pub fn register(&self, id: &str, handle: &str) {
        self.users.lock().push(RegisteredUser {
            id: AuthorId::new(id),
            handle: handle.to_string(),
            followers: 0,
        });
    }
}

#[async_trait]
impl PostService for ScriptedService {
    async fn fetch_page(&self, page_index: u64, page_size: u64) -> RemoteResult<Vec<RawPost>> {
        self.calls.fetch_page.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.fetch_gate.pass().await {
            return result;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("replica down".into()));
        }
        let start = (page_index * page_size) as usize;
        Ok(self
            .timeline
            .lock()
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn search(&self, keyword: &str) -> RemoteResult<Vec<RawPost>> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("search index rebuilding".into()));
        }
        let keyword = keyword.to_lowercase();
        Ok(self
            .timeline
            .lock()
            .iter()
            .filter(|p| p.content.to_lowercase().contains(&keyword))
            .cloned()
            .collect())
    }

    async fn fetch_user_page(
        &self,
        author: &AuthorId,
        page_index: u64,
        page_size: u64,
    ) -> RemoteResult<Vec<RawPost>> {
        let start = (page_index * page_size) as usize;
        Ok(self
            .timeline
            .lock()
            .iter()
            .filter(|p| &p.author == author)
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect())
    }

    async fn is_liked_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool> {
        self.calls.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("lookup timeout".into()));
        }
        Ok(self.liked.lock().contains(&(post_id, viewer.clone())))
    }

    async fn is_reposted_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool> {
        self.calls.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("lookup timeout".into()));
        }
        Ok(self.reposted.lock().contains(&(post_id, viewer.clone())))
    }

    async fn toggle_like(&self, post_id: PostId) -> RemoteResult<bool> {
        self.calls.toggle_like.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.toggle_gate.pass().await {
            return result;
        }
        let scripted = self.toggle_results.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let caller = self.caller.lock().clone();
                let mut liked = self.liked.lock();
                let key = (post_id, caller);
                if liked.remove(&key) {
                    Ok(false)
                } else {
                    liked.insert(key);
                    Ok(true)
                }
            }
        }
    }

    async fn repost(&self, post_id: PostId) -> RemoteResult<PostId> {
        self.calls.repost.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.repost_gate.pass().await {
            return result;
        }
        let scripted = self.repost_results.lock().pop_front();
        let new_id = scripted.unwrap_or(Ok(PostId(0)))?;
        if new_id.is_minted() {
            let caller = self.caller.lock().clone();
            let mut timeline = self.timeline.lock();
            if let Some(original) = timeline.iter_mut().find(|p| p.id == post_id) {
                original.reposts += 1;
            }
            let mut repost = raw_post(new_id.0, 0);
            repost.author = caller.as_author();
            repost.original_post_id = Some(post_id);
            timeline.insert(0, repost);
            self.reposted.lock().insert((post_id, caller));
        }
        Ok(new_id)
    }

    async fn quote(&self, _post_id: PostId, _content: &str) -> RemoteResult<PostId> {
        Ok(PostId(0))
    }

    async fn create_post(&self, content: &str) -> RemoteResult<PostId> {
        self.calls.create_post.fetch_add(1, Ordering::SeqCst);
        let caller = self.caller.lock().clone();
        let mut timeline = self.timeline.lock();
        let id = timeline.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
        let mut post = raw_post(id, 0);
        post.author = caller.as_author();
        post.content = content.to_string();
        timeline.insert(0, post);
        Ok(PostId(id))
    }

    async fn search_users(&self, handle_prefix: &str) -> RemoteResult<Vec<RegisteredUser>> {
        Ok(self
            .users
            .lock()
            .iter()
            .filter(|u| u.handle.starts_with(handle_prefix))
            .cloned()
            .collect())
    }

    async fn following(&self, user: &AuthorId) -> RemoteResult<Vec<AuthorId>> {
        Ok(self
            .follows
            .lock()
            .iter()
            .filter(|(follower, _)| follower == user)
            .map(|(_, followee)| followee.clone())
            .collect())
    }

    async fn follow(&self, author: &AuthorId) -> RemoteResult<()> {
        self.calls.follow.fetch_add(1, Ordering::SeqCst);
        let caller = self.caller.lock().as_author();
        if &caller == author {
            return Err(RemoteError::Rejected("cannot follow yourself".into()));
        }
        self.follows.lock().insert((caller, author.clone()));
        Ok(())
    }
}

pub fn raw_post(id: u64, likes: u64) -> RawPost {
    RawPost {
        id: PostId(id),
        author: AuthorId::new("author-principal"),
        content: format!("post {}", id),
        timestamp_ns: id * 1_000_000_000,
        likes,
        reposts: 0,
        quotes: 0,
        original_post_id: None,
        quote_content: None,
    }
}

pub fn engine_for(
    service: &Arc<ScriptedService>,
    identity: &Arc<SessionIdentity>,
) -> FeedSyncEngine {
    FeedSyncEngine::new(
        Arc::clone(service) as Arc<dyn PostService>,
        Arc::clone(identity) as Arc<dyn feed_sync::IdentityProvider>,
        EngineConfig::default(),
    )
}
