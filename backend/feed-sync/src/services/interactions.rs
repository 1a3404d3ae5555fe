//! Optimistic interaction controller
//!
//! State machine per (instance, post, kind):
//! - Idle → Optimistic: local mutation applied, request in flight
//! - Optimistic → Confirmed: reconciled to the authoritative response
//! - Optimistic → RolledBack: restored to the snapshot
//! - Confirmed / RolledBack → Idle: key released
//!
//! A second interaction on a key in `Optimistic` is rejected, never queued.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::models::{FeedInstance, InteractionKind, ViewPost, ViewPostPatch};
use crate::services::feed_store::FeedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionPhase {
    Idle,
    Optimistic,
    Confirmed,
    RolledBack,
}

/// Interaction counters and flags as they were before the optimistic apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionSnapshot {
    pub likes: u64,
    pub is_liked: bool,
    pub reposts: u64,
    pub is_reposted: bool,
}

impl InteractionSnapshot {
    fn of(post: &ViewPost) -> Self {
        Self {
            likes: post.likes,
            is_liked: post.is_liked,
            reposts: post.reposts,
            is_reposted: post.is_reposted,
        }
    }
}

#[derive(Debug)]
pub struct PendingInteraction {
    pub instance: FeedInstance,
    pub post_id: String,
    pub kind: InteractionKind,
    pub snapshot: InteractionSnapshot,
    phase: InteractionPhase,
}

impl PendingInteraction {
    pub fn phase(&self) -> InteractionPhase {
        self.phase
    }

    fn key(&self) -> InteractionKey {
        (self.instance.clone(), self.post_id.clone(), self.kind)
    }
}

type InteractionKey = (FeedInstance, String, InteractionKind);

#[derive(Debug, Default)]
pub struct InteractionController {
    in_flight: HashSet<InteractionKey>,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(
        &self,
        instance: &FeedInstance,
        post_id: &str,
        kind: InteractionKind,
    ) -> InteractionPhase {
        let key = (instance.clone(), post_id.to_string(), kind);
        if self.in_flight.contains(&key) {
            InteractionPhase::Optimistic
        } else {
            InteractionPhase::Idle
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Snapshot the post and apply the optimistic mutation synchronously.
    pub fn begin(
        &mut self,
        store: &mut FeedStore,
        instance: &FeedInstance,
        post_id: &str,
        kind: InteractionKind,
    ) -> FeedResult<PendingInteraction> {
        let key = (instance.clone(), post_id.to_string(), kind);
        if self.in_flight.contains(&key) {
            debug!(instance = %instance, post_id = post_id, kind = %kind, "Interaction already in flight");
            return Err(FeedError::ConcurrentMutationConflict {
                kind,
                post_id: post_id.to_string(),
            });
        }

        let post = store
            .post(instance, post_id)
            .ok_or_else(|| FeedError::PostNotFound {
                instance: instance.clone(),
                post_id: post_id.to_string(),
            })?;
        let snapshot = InteractionSnapshot::of(post);

        let patch = match kind {
            InteractionKind::Like => {
                let liked = !snapshot.is_liked;
                let likes = if liked {
                    snapshot.likes + 1
                } else {
                    snapshot.likes.saturating_sub(1)
                };
                ViewPostPatch::likes(likes, liked)
            }
            InteractionKind::Repost => {
                let reposts = if snapshot.is_reposted {
                    snapshot.reposts
                } else {
                    snapshot.reposts + 1
                };
                ViewPostPatch::reposts(reposts, true)
            }
        };
        store.patch_post(instance, post_id, &patch);
        self.in_flight.insert(key);

        debug!(instance = %instance, post_id = post_id, kind = %kind, "Applied optimistic interaction");
        Ok(PendingInteraction {
            instance: instance.clone(),
            post_id: post_id.to_string(),
            kind,
            snapshot,
            phase: InteractionPhase::Optimistic,
        })
    }

    /// Reconcile a like to the server's authoritative state. The count is
    /// derived from the snapshot, never from the optimistic value, so a
    /// correction cannot compound.
    pub fn confirm_like(
        &mut self,
        store: &mut FeedStore,
        pending: &mut PendingInteraction,
        authoritative: bool,
    ) {
        let optimistic = !pending.snapshot.is_liked;
        if authoritative != optimistic {
            warn!(
                instance = %pending.instance,
                post_id = %pending.post_id,
                authoritative = authoritative,
                "Server liked state disagrees with optimistic state, correcting"
            );
        }
        let likes = if authoritative {
            pending.snapshot.likes + 1
        } else {
            pending.snapshot.likes.saturating_sub(1)
        };
        store.patch_post(
            &pending.instance,
            &pending.post_id,
            &ViewPostPatch::likes(likes, authoritative),
        );
        self.settle(pending, InteractionPhase::Confirmed);
    }

    /// Acknowledge a repost. The feed composition changed, so the caller
    /// refreshes the instance instead of patching it.
    pub fn confirm_repost(&mut self, pending: &mut PendingInteraction) {
        self.settle(pending, InteractionPhase::Confirmed);
    }

    /// Restore the snapshot exactly.
    pub fn roll_back(&mut self, store: &mut FeedStore, pending: &mut PendingInteraction) {
        let snapshot = pending.snapshot;
        let patch = match pending.kind {
            InteractionKind::Like => ViewPostPatch::likes(snapshot.likes, snapshot.is_liked),
            InteractionKind::Repost => {
                ViewPostPatch::reposts(snapshot.reposts, snapshot.is_reposted)
            }
        };
        store.patch_post(&pending.instance, &pending.post_id, &patch);
        warn!(
            instance = %pending.instance,
            post_id = %pending.post_id,
            kind = %pending.kind,
            "Rolled back optimistic interaction"
        );
        self.settle(pending, InteractionPhase::RolledBack);
    }

    /// Drop every in-flight key without touching the store; used when the
    /// store itself was invalidated.
    pub fn clear(&mut self) {
        self.in_flight.clear();
    }

    fn settle(&mut self, pending: &mut PendingInteraction, phase: InteractionPhase) {
        self.in_flight.remove(&pending.key());
        pending.phase = phase;
    }
}
