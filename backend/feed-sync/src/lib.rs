pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;

pub use config::{Config, EngineConfig};
pub use error::{FeedError, FeedResult, RemoteError, RemoteResult};
pub use ledger::{InMemoryLedger, LedgerClient};
pub use models::{
    AuthorId, AuthorView, FeedInstance, FeedSnapshot, InteractionKind, PostId, RawPost,
    RegisteredUser, SuggestedUser, Trend, TrendingTopic, ViewPost, ViewerId,
};
pub use services::{
    FeedHandle, FeedSyncEngine, IdentityProvider, LoadOutcome, PostService, RepostOutcome,
    SessionIdentity,
};
