use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ledger-assigned post identifier. Ids grow with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl PostId {
    /// The ledger answers `0` when a repost or quote was not created.
    pub fn is_minted(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(PostId)
    }
}

/// Opaque principal text of a post author
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(pub String);

impl AuthorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the signed-in viewer. Guests have no `ViewerId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub String);

impl ViewerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A viewer authors posts under the same principal.
    pub fn as_author(&self) -> AuthorId {
        AuthorId(self.0.clone())
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One independently synchronized feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedInstance {
    /// Home timeline: the viewer's own and followed authors' posts
    Home,
    /// Explore: timeline pages, or search results while a query is active
    Explore,
    /// Posts written by one author
    Profile(AuthorId),
}

impl fmt::Display for FeedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedInstance::Home => f.write_str("home"),
            FeedInstance::Explore => f.write_str("explore"),
            FeedInstance::Profile(author) => write!(f, "profile:{}", author),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Repost,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionKind::Like => f.write_str("like"),
            InteractionKind::Repost => f.write_str("repost"),
        }
    }
}

/// Post as returned by the remote post service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: PostId,
    pub author: AuthorId,
    pub content: String,
    /// Server clock, nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    pub likes: u64,
    pub reposts: u64,
    #[serde(default)]
    pub quotes: u64,
    /// Set on reposts and quotes
    #[serde(default)]
    pub original_post_id: Option<PostId>,
    /// Text of the quoted post, for quotes
    #[serde(default)]
    pub quote_content: Option<String>,
}

/// Display identity derived from an author principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: String,
    pub handle: String,
    pub name: String,
}

impl AuthorView {
    const SHORT_ID_CHARS: usize = 8;

    /// Principals are long; display names use their first eight characters.
    pub fn derive(author: &AuthorId) -> Self {
        let short: String = author.as_str().chars().take(Self::SHORT_ID_CHARS).collect();
        Self {
            id: author.0.clone(),
            handle: format!("user_{}", short),
            name: format!("User {}", short),
        }
    }

    /// Author view for the viewer's own posts, which carry a registered handle.
    pub fn with_handle(author: &AuthorId, handle: &str) -> Self {
        Self {
            id: author.0.clone(),
            handle: handle.to_string(),
            name: format!("User {}", handle),
        }
    }
}

/// View-ready post. `is_liked` / `is_reposted` are relative to the viewer that
/// enriched the post and are meaningless for any other viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPost {
    pub id: String,
    pub content: String,
    pub author: AuthorView,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub likes: u64,
    pub reposts: u64,
    /// The ledger does not track replies yet
    pub replies: u64,
    pub quotes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_content: Option<String>,
    pub is_liked: bool,
    pub is_reposted: bool,
}

impl ViewPost {
    pub fn from_raw(raw: RawPost, author: AuthorView, is_liked: bool, is_reposted: bool) -> Self {
        Self {
            id: raw.id.to_string(),
            content: raw.content,
            author,
            timestamp_ms: (raw.timestamp_ns / 1_000_000) as i64,
            likes: raw.likes,
            reposts: raw.reposts,
            replies: 0,
            quotes: raw.quotes,
            original_post_id: raw.original_post_id.map(|id| id.to_string()),
            quote_content: raw.quote_content,
            is_liked,
            is_reposted,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Shallow partial update of a [`ViewPost`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewPostPatch {
    pub likes: Option<u64>,
    pub reposts: Option<u64>,
    pub is_liked: Option<bool>,
    pub is_reposted: Option<bool>,
}

impl ViewPostPatch {
    pub fn likes(likes: u64, is_liked: bool) -> Self {
        Self {
            likes: Some(likes),
            is_liked: Some(is_liked),
            ..Default::default()
        }
    }

    pub fn reposts(reposts: u64, is_reposted: bool) -> Self {
        Self {
            reposts: Some(reposts),
            is_reposted: Some(is_reposted),
            ..Default::default()
        }
    }

    pub fn apply(&self, post: &mut ViewPost) {
        if let Some(likes) = self.likes {
            post.likes = likes;
        }
        if let Some(reposts) = self.reposts {
            post.reposts = reposts;
        }
        if let Some(is_liked) = self.is_liked {
            post.is_liked = is_liked;
        }
        if let Some(is_reposted) = self.is_reposted {
            post.is_reposted = is_reposted;
        }
    }
}

/// What the presentation layer renders for one feed instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub posts: Vec<ViewPost>,
    pub is_loading: bool,
    pub has_more: bool,
}

impl FeedSnapshot {
    pub fn post(&self, id: &str) -> Option<&ViewPost> {
        self.posts.iter().find(|p| p.id == id)
    }
}

/// User record as returned by the remote user search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: AuthorId,
    pub handle: String,
    #[serde(default)]
    pub followers: u64,
}

/// Explore "who to follow" entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedUser {
    pub id: String,
    pub name: String,
    pub handle: String,
    pub followers: u64,
    pub is_following: bool,
}

impl SuggestedUser {
    pub fn from_registered(user: RegisteredUser, is_following: bool) -> Self {
        let derived = AuthorView::derive(&user.id);
        Self {
            id: user.id.0,
            name: derived.name,
            handle: user.handle,
            followers: user.followers,
            is_following,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Stable,
    Down,
}

impl Trend {
    /// More than five matching posts trends up, more than two holds steady.
    pub fn from_count(posts: usize) -> Self {
        if posts > 5 {
            Trend::Up
        } else if posts > 2 {
            Trend::Stable
        } else {
            Trend::Down
        }
    }
}

/// Hashtag with the number of posts mentioning it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingTopic {
    pub topic: String,
    pub posts: usize,
    pub trend: Trend,
}

impl TrendingTopic {
    pub fn new(topic: impl Into<String>, posts: usize) -> Self {
        Self {
            topic: topic.into(),
            posts,
            trend: Trend::from_count(posts),
        }
    }
}
