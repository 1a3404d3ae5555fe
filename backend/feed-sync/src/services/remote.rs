//! Remote post service seam
//!
//! The ledger-backed service is authoritative but only eventually reflects a
//! just-issued mutation on later reads. Transport is the implementor's concern.

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::models::{AuthorId, PostId, RawPost, RegisteredUser, ViewerId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostService: Send + Sync {
    /// Home timeline page for the calling identity, newest first
    async fn fetch_page(&self, page_index: u64, page_size: u64) -> RemoteResult<Vec<RawPost>>;

    /// Unpaged keyword search over post content
    async fn search(&self, keyword: &str) -> RemoteResult<Vec<RawPost>>;

    /// Page of posts written by `author`, newest first
    async fn fetch_user_page(
        &self,
        author: &AuthorId,
        page_index: u64,
        page_size: u64,
    ) -> RemoteResult<Vec<RawPost>>;

    async fn is_liked_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool>;

    async fn is_reposted_by(&self, post_id: PostId, viewer: &ViewerId) -> RemoteResult<bool>;

    /// Toggle the caller's like; returns the authoritative new liked state
    async fn toggle_like(&self, post_id: PostId) -> RemoteResult<bool>;

    /// Returns the new repost's id, or `PostId(0)` when nothing was created
    async fn repost(&self, post_id: PostId) -> RemoteResult<PostId>;

    /// Returns the new quote's id, or `PostId(0)` when nothing was created
    async fn quote(&self, post_id: PostId, content: &str) -> RemoteResult<PostId>;

    async fn create_post(&self, content: &str) -> RemoteResult<PostId>;

    /// Registered users whose handle starts with `handle_prefix`, ignoring case
    async fn search_users(&self, handle_prefix: &str) -> RemoteResult<Vec<RegisteredUser>>;

    /// Authors `user` follows
    async fn following(&self, user: &AuthorId) -> RemoteResult<Vec<AuthorId>>;

    /// Make the calling identity follow `author`; following twice is a no-op
    async fn follow(&self, author: &AuthorId) -> RemoteResult<()>;
}
