//! Post enrichment pipeline
//!
//! Resolves the viewer's liked/reposted flags for a page of raw posts. A page
//! is returned only once every post in it is resolved.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{AuthorView, PostId, RawPost, ViewPost, ViewerId};
use crate::services::remote::PostService;

#[derive(Clone)]
pub struct EnrichmentPipeline {
    service: Arc<dyn PostService>,
    /// Posts whose lookups may be in flight at the same time
    concurrency: usize,
}

impl EnrichmentPipeline {
    pub fn new(service: Arc<dyn PostService>, concurrency: usize) -> Self {
        Self {
            service,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich a page for `viewer`. Output order equals input order.
    ///
    /// Guests get `false` flags without any lookup. A failed lookup also
    /// resolves to `false`: one backend hiccup must not blank the page.
    pub async fn enrich(&self, raw_posts: Vec<RawPost>, viewer: Option<&ViewerId>) -> Vec<ViewPost> {
        let Some(viewer) = viewer else {
            return raw_posts
                .into_iter()
                .map(|raw| {
                    let author = AuthorView::derive(&raw.author);
                    ViewPost::from_raw(raw, author, false, false)
                })
                .collect();
        };

        let count = raw_posts.len();
        let posts: Vec<ViewPost> = stream::iter(raw_posts)
            .map(|raw| async move {
                let (is_liked, is_reposted) = self.lookup_flags(raw.id, viewer).await;
                let author = AuthorView::derive(&raw.author);
                ViewPost::from_raw(raw, author, is_liked, is_reposted)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        debug!(viewer = %viewer, posts = count, "Enriched page");
        posts
    }

    async fn lookup_flags(&self, post_id: PostId, viewer: &ViewerId) -> (bool, bool) {
        let (liked, reposted) = futures::join!(
            self.service.is_liked_by(post_id, viewer),
            self.service.is_reposted_by(post_id, viewer)
        );

        let is_liked = liked.unwrap_or_else(|e| {
            warn!(post_id = %post_id, error = %e, "Liked lookup failed, treating as not liked");
            false
        });
        let is_reposted = reposted.unwrap_or_else(|e| {
            warn!(post_id = %post_id, error = %e, "Reposted lookup failed, treating as not reposted");
            false
        });

        (is_liked, is_reposted)
    }
}
