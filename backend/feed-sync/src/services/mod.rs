//! Service layer for feed-sync
//!
//! - remote / identity: collaborator seams
//! - enrichment: viewer flags for raw pages
//! - feed_store, pagination, interactions: per-instance state
//! - engine: orchestration and the presentation-facing handle

pub mod engine;
pub mod enrichment;
pub mod feed_store;
pub mod identity;
pub mod interactions;
pub mod pagination;
pub mod remote;

pub use engine::{FeedHandle, FeedSyncEngine, LoadOutcome, RepostOutcome};
pub use enrichment::EnrichmentPipeline;
pub use feed_store::{FeedStore, PatchOutcome};
pub use identity::{IdentityProvider, SessionIdentity};
pub use interactions::{InteractionController, InteractionPhase};
pub use pagination::{PageRequest, PaginationCursor};
pub use remote::PostService;
