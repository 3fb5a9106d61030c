use anyhow::Result;
use dotenv::dotenv;
use pumpdump_backend::achievements::AchievementEngine;
use pumpdump_backend::bets::scheduler::BetScheduler;
use pumpdump_backend::bets::{BetEngine, Settlement};
use pumpdump_backend::config::app_context::AppContext;
use pumpdump_backend::config::constants::SCHEDULER_SHUTDOWN_GRACE_S;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    // Load settings from config.toml, panics in case of error
    let context = AppContext::new("config").await;
    info!("Starting pump-or-dump backend");

    let shutdown_grace = context
        .get_settings()
        .await
        .scheduler
        .as_ref()
        .and_then(|scheduler| scheduler.shutdown_grace_s)
        .unwrap_or(SCHEDULER_SHUTDOWN_GRACE_S);

    let settlement = Arc::new(Settlement::new(
        context.db_pool.clone(),
        context.ticker.clone(),
        context.clock.clone(),
    ));
    let scheduler = Arc::new(BetScheduler::new(
        settlement.clone(),
        context.clock.clone(),
        Duration::from_secs(shutdown_grace),
    ));
    let achievements = Arc::new(AchievementEngine::new(
        context.db_pool.clone(),
        context.clock.clone(),
    ));
    let bets = Arc::new(BetEngine::new(
        context.db_pool.clone(),
        context.clock.clone(),
        scheduler.clone(),
        settlement.clone(),
        achievements.clone(),
    ));

    // Timers are in-memory only: settle what expired while we were down and
    // re-arm the rest. The request-facing engines are constructed by the
    // transport layer, not here.
    bets.recover_pending().await?;

    let active_timers = scheduler.active_count().await;
    info!(active_timers, "engines ready, waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    scheduler.shutdown().await;
    Ok(())
}
