pub mod scheduler;

use crate::achievements::AchievementEngine;
use crate::clock::Clock;
use crate::error::{Conflict, CoreError, CoreResult};
use crate::storage::persistent::{get_conn, with_retries, DbPool};
use crate::storage::{bets as bet_store, rating as rating_store};
use crate::ticker::PriceSource;
use crate::types::bet::{Bet, BetSide, BetStatus, NewBet, OpenBetRequest, OpenBetResponse, Outcome};
use crate::types::rating::NewRatingEntry;
use async_trait::async_trait;
use diesel_async::AsyncConnection;
use scheduler::{BetScheduler, Settler};
use scoped_futures::ScopedFutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Writes the close price exactly once. `close_time` is the expected close
/// (`open_time + timeframe`), never wall-now, so the outcome stays
/// deterministic no matter when settlement actually runs.
pub struct Settlement {
    pool: DbPool,
    ticker: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
}

impl Settlement {
    pub fn new(pool: DbPool, ticker: Arc<dyn PriceSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            ticker,
            clock,
        }
    }
}

#[async_trait]
impl Settler for Settlement {
    async fn settle(&self, bet_id: i32, _pair: &str) -> CoreResult<()> {
        let mut conn = get_conn(&self.pool).await?;
        let bet = bet_store::bet_by_id(&mut conn, bet_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bet not found"))?;
        if bet.is_settled() {
            return Ok(());
        }
        drop(conn);

        let close_price = self.ticker.get_price(&bet.pair).await?;

        let mut conn = get_conn(&self.pool).await?;
        let updated = bet_store::settle_bet(
            &mut conn,
            bet.id,
            close_price,
            bet.expected_close_time(),
            self.clock.now_ms(),
        )
        .await?;
        if updated {
            info!(bet_id, close_price, "settled bet");
        } else {
            debug!(bet_id, "bet was settled concurrently");
        }
        Ok(())
    }
}

/// Bet lifecycle: open, scheduled settlement, status with opportunistic
/// settling, claim into the ledger.
pub struct BetEngine {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    scheduler: Arc<BetScheduler>,
    settlement: Arc<Settlement>,
    achievements: Arc<AchievementEngine>,
}

impl BetEngine {
    pub fn new(
        pool: DbPool,
        clock: Arc<dyn Clock>,
        scheduler: Arc<BetScheduler>,
        settlement: Arc<Settlement>,
        achievements: Arc<AchievementEngine>,
    ) -> Self {
        Self {
            pool,
            clock,
            scheduler,
            settlement,
            achievements,
        }
    }

    pub async fn open_bet(
        &self,
        user_id: Uuid,
        request: &OpenBetRequest,
    ) -> CoreResult<OpenBetResponse> {
        let side = BetSide::parse(&request.side)
            .ok_or_else(|| CoreError::bad_request("side must be 'pump' or 'dump'"))?;
        if request.sum <= 0 {
            return Err(CoreError::bad_request("sum must be greater than 0"));
        }
        if request.pair.is_empty() {
            return Err(CoreError::bad_request("pair is required"));
        }
        if request.timeframe <= 0 {
            return Err(CoreError::bad_request("timeframe must be greater than 0"));
        }
        if request.open_price <= 0.0 {
            return Err(CoreError::bad_request("openPrice must be greater than 0"));
        }

        let now = self.clock.now_ms();
        let open_time = if request.open_time > 0 {
            request.open_time
        } else {
            now
        };

        let mut conn = get_conn(&self.pool).await?;
        let bet = bet_store::insert_bet(
            &mut conn,
            &NewBet {
                user_id,
                side: side.as_str().to_owned(),
                sum: request.sum,
                pair: request.pair.clone(),
                timeframe: request.timeframe,
                open_price: request.open_price,
                open_time,
                claimed: false,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;
        drop(conn);

        // The bet exists either way; a failed schedule is recovered by the
        // opportunistic path and the startup sweep.
        if let Err(err) = self
            .scheduler
            .schedule(bet.id, &bet.pair, bet.expected_close_time())
            .await
        {
            warn!(bet_id = bet.id, "failed to schedule bet settlement: {err}");
        }

        Ok(OpenBetResponse { id: bet.id })
    }

    /// The bet as the owner sees it. A bet past its close time that the
    /// scheduler missed is settled here on the spot; settlement is idempotent
    /// so racing the timer is harmless.
    pub async fn bet_status(&self, bet_id: i32, user_id: Uuid) -> CoreResult<BetStatus> {
        let mut conn = get_conn(&self.pool).await?;
        let mut bet = bet_store::bet_for_user(&mut conn, bet_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bet not found"))?;
        drop(conn);

        if !bet.is_settled() && self.clock.now_ms() >= bet.expected_close_time() {
            if let Err(err) = self.settlement.settle(bet.id, &bet.pair).await {
                warn!(bet_id, "opportunistic settlement failed: {err}");
            } else {
                let mut conn = get_conn(&self.pool).await?;
                if let Some(settled) = bet_store::bet_for_user(&mut conn, bet_id, user_id).await? {
                    bet = settled;
                }
            }
        }

        Ok(BetStatus::from(&bet))
    }

    /// Flips `claimed` exactly once and appends the signed ledger entry in
    /// the same transaction. A winning claim feeds achievement progress.
    pub async fn claim(&self, bet_id: i32, user_id: Uuid) -> CoreResult<()> {
        let mut conn = get_conn(&self.pool).await?;
        let bet = bet_store::bet_for_user(&mut conn, bet_id, user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("bet not found"))?;
        drop(conn);

        if !bet.is_settled() {
            return Err(Conflict::NotReady.into());
        }
        if bet.claimed {
            return Err(Conflict::AlreadyClaimed.into());
        }

        let outcome = bet.outcome();
        let points = bet.claim_points();
        let description = format!("Bet {} {}: {} points", bet.id, outcome.as_str(), points);
        let now = self.clock.now_ms();

        with_retries(|| {
            let pool = self.pool.clone();
            let description = description.clone();
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        if !bet_store::mark_claimed(conn, bet_id, user_id, now).await? {
                            return Err(Conflict::AlreadyClaimed.into());
                        }
                        rating_store::append(
                            conn,
                            &NewRatingEntry {
                                user_id,
                                points,
                                got_prize_id: None,
                                bet_id: Some(bet_id),
                                description,
                                created_at: now,
                            },
                        )
                        .await?;
                        Ok(())
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await?;

        if outcome == Outcome::Win {
            match self.achievements.on_win(user_id).await {
                Ok(created) if !created.is_empty() => {
                    info!(%user_id, ?created, "new achievements from bet win");
                }
                Ok(_) => {}
                Err(err) => warn!(%user_id, "failed to update win achievements: {err}"),
            }
        }
        Ok(())
    }

    /// Open bets and settled-but-unclaimed bets, newest first.
    pub async fn unfinished_bets(&self, user_id: Uuid) -> CoreResult<Vec<Bet>> {
        let mut conn = get_conn(&self.pool).await?;
        bet_store::unfinished_for_user(&mut conn, user_id).await
    }

    /// Startup sweep: in-flight timers do not survive a restart, so settle
    /// everything already past its close time and re-arm the rest.
    pub async fn recover_pending(&self) -> CoreResult<()> {
        let mut conn = get_conn(&self.pool).await?;
        let open = bet_store::open_bets(&mut conn).await?;
        drop(conn);

        let now = self.clock.now_ms();
        let (expired, pending): (Vec<_>, Vec<_>) = open
            .into_iter()
            .partition(|bet| bet.expected_close_time() <= now);
        info!(
            expired = expired.len(),
            pending = pending.len(),
            "recovering unsettled bets"
        );

        for bet in expired {
            if let Err(err) = self.settlement.settle(bet.id, &bet.pair).await {
                warn!(bet_id = bet.id, "startup settlement failed: {err}");
            }
        }
        for bet in pending {
            if let Err(err) = self
                .scheduler
                .schedule(bet.id, &bet.pair, bet.expected_close_time())
                .await
            {
                warn!(bet_id = bet.id, "failed to re-arm bet timer: {err}");
            }
        }
        Ok(())
    }
}
