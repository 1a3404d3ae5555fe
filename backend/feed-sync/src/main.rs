use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_sync::config::{Config, LogFormat};
use feed_sync::{
    AuthorId, FeedInstance, FeedSyncEngine, InMemoryLedger, LedgerClient, SessionIdentity,
    ViewerId,
};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

/// A few users, follows and posts so every feed has something to show.
fn seed_ledger(ledger: &InMemoryLedger, viewer: &AuthorId) -> AuthorId {
    let friend = AuthorId::new("rrkah-fqaaa-aaaaa-aaaaq-cai");
    let stranger = AuthorId::new("ryjl3-tyaaa-aaaaa-aaaba-cai");
    ledger.register(viewer, "alice");
    ledger.register(&friend, "bob");
    ledger.register(&stranger, "carol");
    ledger.follow(viewer, &friend);

    for i in 1..=12 {
        ledger.publish(&friend, &format!("bob's update #{} on #ICP", i));
    }
    ledger.publish(&stranger, "carol thinks #icp is neat");
    ledger.publish(viewer, "hello from alice");
    friend
}

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", label))?;
    println!("=== {} ===\n{}", label, json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.app.log_format);

    info!(
        env = %config.app.env,
        page_size = config.feed.page_size,
        "Starting feed-sync session"
    );

    let viewer = ViewerId::new("2vxsx-fae-alice-principal");
    let ledger = Arc::new(InMemoryLedger::new());
    let friend = seed_ledger(&ledger, &viewer.as_author());

    let identity = Arc::new(SessionIdentity::signed_in(
        viewer.clone(),
        ledger.handle_of(&viewer.as_author()),
    ));
    let service = Arc::new(LedgerClient::new(Arc::clone(&ledger), identity.clone()));
    let engine = FeedSyncEngine::new(service, identity.clone(), config.feed.clone());

    let home = engine.feed(FeedInstance::Home);
    home.load_next_page()
        .await
        .context("Failed to load home feed")?;
    print_json("home", &home.snapshot())?;

    if let Some(first) = home.snapshot().posts.first().map(|p| p.id.clone()) {
        let liked = home.like(&first).await?;
        info!(post_id = %first, liked = liked, "Liked first post");

        match home.repost(&first).await {
            Ok(outcome) => info!(repost_id = %outcome.repost_id, "Reposted first post"),
            Err(e) => warn!(error = %e, notice = e.notice(), "Repost failed"),
        }
    }

    home.load_next_page()
        .await
        .context("Failed to load next home page")?;
    print_json("home after load more", &home.snapshot())?;

    engine.search("#icp").await.context("Search failed")?;
    print_json("explore search", &engine.feed(FeedInstance::Explore).snapshot())?;

    print_json("trending topics", &engine.trending_topics().await)?;
    let suggested = engine
        .suggested_users("")
        .await
        .context("Failed to load suggested users")?;
    print_json("suggested users", &suggested)?;
    if let Some(user) = suggested.iter().find(|u| !u.is_following) {
        match engine.follow(&AuthorId::new(user.id.as_str())).await {
            Ok(()) => info!(handle = %user.handle, "Followed suggested user"),
            Err(e) => warn!(error = %e, notice = e.notice(), "Follow failed"),
        }
        print_json("home after follow", &home.snapshot())?;
    }

    let profile = engine.feed(FeedInstance::Profile(viewer.as_author()));
    profile
        .submit_post("posting from the demo session")
        .await
        .context("Failed to submit post")?;
    print_json("own profile", &profile.snapshot())?;

    let friend_profile = engine.feed(FeedInstance::Profile(friend));
    friend_profile.load_next_page().await?;
    print_json("friend profile", &friend_profile.snapshot())?;

    identity.sign_out();
    print_json("home after sign-out", &home.snapshot())?;

    Ok(())
}
