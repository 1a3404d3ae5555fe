/// Error types for the feed synchronization engine
use thiserror::Error;

use crate::models::{FeedInstance, InteractionKind};

/// Failure reported by the remote post service collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors surfaced to the presentation layer. All of them are recoverable and
/// none leaves a feed instance in an inconsistent state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Page or search fetch failed; the feed keeps its prior contents
    #[error("Failed to fetch {instance} feed: {source}")]
    TransientFetch {
        instance: FeedInstance,
        #[source]
        source: RemoteError,
    },

    /// Like/repost/quote/post/follow call failed or returned an invalid result
    #[error("{action} on {target} was rejected: {reason}")]
    MutationRejected {
        action: String,
        /// "post 42", "user <id>", or "new post"
        target: String,
        reason: String,
    },

    #[error("{kind} on post {post_id} is already in progress")]
    ConcurrentMutationConflict {
        kind: InteractionKind,
        post_id: String,
    },

    #[error("Sign-in required to {0}")]
    UnauthenticatedAction(String),

    #[error("Invalid post id: {0}")]
    InvalidPostId(String),

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Post {post_id} is not in the {instance} feed")]
    PostNotFound {
        instance: FeedInstance,
        post_id: String,
    },
}

impl FeedError {
    /// Short user-facing notice for the error
    pub fn notice(&self) -> &'static str {
        match self {
            FeedError::TransientFetch { .. } => "Couldn't load posts. Try again.",
            FeedError::MutationRejected { .. } => "That didn't go through. Try again.",
            FeedError::ConcurrentMutationConflict { .. } => "Already in progress",
            FeedError::UnauthenticatedAction(_) => "Sign in required",
            FeedError::InvalidPostId(_) | FeedError::PostNotFound { .. } => {
                "That post is no longer available"
            }
            FeedError::InvalidContent(_) => "Post content is not valid",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FeedError::ConcurrentMutationConflict { .. })
    }
}

/// Result type alias for engine operations
pub type FeedResult<T> = Result<T, FeedError>;

/// Result type alias for remote post service calls
pub type RemoteResult<T> = Result<T, RemoteError>;
