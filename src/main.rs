//! Ticket Cache - smoke-test client
//!
//! Signs in against the configured backend, loads the current user and the
//! first page of open complaints twice (the second read is served from the
//! cache), prints what it got, then signs out.

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticket_cache::models::{ComplaintFilters, ComplaintStatus, Credentials};
use ticket_cache::{Config, TicketDesk};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: api_url={}, default_ttl={}ms, timeout={}s",
        config.api_url, config.default_ttl_ms, config.request_timeout_secs
    );

    let (Some(email), Some(password)) = (config.email.clone(), config.password.clone()) else {
        bail!("TICKET_EMAIL and TICKET_PASSWORD must be set");
    };

    let desk = TicketDesk::from_config(&config).context("failed to build API client")?;
    let user = desk
        .login(&Credentials::new(email, password))
        .await
        .context("login failed")?;
    info!("Signed in as {} ({:?})", user.name, user.role);

    let me = desk.me();
    me.activate().await;
    if let Some(error) = me.error() {
        bail!("could not load profile: {}", error);
    }

    let filters = ComplaintFilters {
        status: Some(ComplaintStatus::Open),
        limit: Some(5),
        ..Default::default()
    };

    for pass in 1..=2 {
        let complaints = desk.complaints(&filters);
        complaints.activate().await;

        let state = complaints.state();
        if let Some(error) = state.error {
            bail!("could not load complaints: {}", error);
        }
        let items = state.data.unwrap_or_default();
        info!("Pass {}: {} open complaint(s)", pass, items.len());
        for complaint in &items {
            println!("#{} [{:?}] {}", complaint.id, complaint.priority, complaint.title);
        }
    }

    let stats = desk.cache().stats();
    info!(
        "Cache: hits={}, misses={}, entries={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.total_entries,
        stats.hit_rate()
    );

    desk.logout();
    Ok(())
}
