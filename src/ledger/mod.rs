use crate::clock::Clock;
use crate::config::constants::{DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT};
use crate::error::{CoreError, CoreResult};
use crate::storage::persistent::{get_conn, with_retries, DbPool};
use crate::storage::{bets as bet_store, prizes as prize_store, rating as rating_store, users as user_store};
use crate::types::bet::Bet;
use crate::types::prize::Prize;
use crate::types::rating::{BetPointsEntry, LeaderboardEntry, NewRatingEntry, UserAssets};
use crate::utils::points::parse_prize_value;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Append-only points ledger over the `rating` table, plus the idempotent
/// reconciliation of prizes and winning bets into it.
pub struct LedgerEngine {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Appends a ledger row; zero points is a no-op.
    pub async fn append(
        &self,
        user_id: Uuid,
        points: i64,
        got_prize_id: Option<i32>,
        bet_id: Option<i32>,
        description: &str,
    ) -> CoreResult<()> {
        if points == 0 {
            return Ok(());
        }
        let mut conn = get_conn(&self.pool).await?;
        rating_store::append(
            &mut conn,
            &NewRatingEntry {
                user_id,
                points,
                got_prize_id,
                bet_id,
                description: description.to_owned(),
                created_at: self.clock.now_ms(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn totals(&self, user_id: Uuid) -> CoreResult<i64> {
        let mut conn = get_conn(&self.pool).await?;
        rating_store::totals(&mut conn, user_id).await
    }

    /// The asset read model: the balance of the eagerly-written ledger.
    /// Take-prize and claim are the canonical writers; recovering rows they
    /// lost is `reconcile`'s job and never runs on this path.
    pub async fn user_assets(&self, user_id: Uuid) -> CoreResult<UserAssets> {
        Ok(UserAssets {
            user_id,
            total_points: self.totals(user_id).await?,
        })
    }

    pub async fn global_leaderboard(
        &self,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LeaderboardEntry>> {
        let (limit, offset) = clamp_page(limit, offset);
        let mut conn = get_conn(&self.pool).await?;
        rating_store::global_leaderboard(&mut conn, limit, offset).await
    }

    /// Aggregates only over users referred by the caller.
    pub async fn friends_leaderboard(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<LeaderboardEntry>> {
        let (limit, offset) = clamp_page(limit, offset);
        let mut conn = get_conn(&self.pool).await?;
        let friends = user_store::referral_ids(&mut conn, user_id).await?;
        rating_store::totals_for_users(&mut conn, &friends, limit, offset).await
    }

    pub async fn bet_points_in_range(
        &self,
        user_id: Uuid,
        start_ms: i64,
        end_ms: i64,
    ) -> CoreResult<i64> {
        let mut conn = get_conn(&self.pool).await?;
        rating_store::bet_points_in_range(&mut conn, user_id, start_ms, end_ms).await
    }

    pub async fn bet_points_leaderboard(
        &self,
        start_ms: i64,
        end_ms: i64,
        limit: i64,
    ) -> CoreResult<Vec<BetPointsEntry>> {
        let mut conn = get_conn(&self.pool).await?;
        rating_store::bet_points_leaderboard(&mut conn, start_ms, end_ms, limit).await
    }

    /// Offline recovery tool, run from an operator task, never on a read
    /// path: re-derives ledger rows that the canonical eager writers
    /// (take-prize, achievement claim, bet claim) committed sources for but
    /// whose rows were lost. Idempotence comes from the per-user cursor
    /// (`max(created_at)`, prizes) and from the source ids already present
    /// in the ledger: a prize or bet with a `got_prize_id`/`bet_id` row is
    /// never credited again. Unclaimed winning bets are not touched at all;
    /// claim stays their sole crediter. All recovered rows commit in one
    /// transaction, so a crash cannot strand the cursor past unprocessed
    /// sources. Running it twice in a row appends nothing the second time.
    pub async fn reconcile(&self, user_id: Uuid) -> CoreResult<usize> {
        let cursor = {
            let mut conn = get_conn(&self.pool).await?;
            rating_store::max_created_at(&mut conn, user_id).await?
        };

        // Sibling fetches run on their own connections and are joined; one
        // failing does not leave the other mid-flight.
        let pool = self.pool.clone();
        let (prizes, wins) = tokio::join!(
            async {
                let mut conn = get_conn(&pool).await?;
                prize_store::prizes_awarded_after(&mut conn, user_id, cursor).await
            },
            async {
                let mut conn = get_conn(&self.pool).await?;
                bet_store::winning_bets_for_user(&mut conn, user_id).await
            },
        );
        let (prizes, wins) = (prizes?, wins?);

        let mut conn = get_conn(&self.pool).await?;
        let known_prize_ids: HashSet<i32> = rating_store::prize_source_ids(&mut conn, user_id)
            .await?
            .into_iter()
            .collect();
        let known_bet_ids: HashSet<i32> = rating_store::bet_source_ids(&mut conn, user_id)
            .await?
            .into_iter()
            .collect();
        let prizes: Vec<Prize> = prizes
            .into_iter()
            .filter(|prize| !known_prize_ids.contains(&prize.id))
            .collect();
        let wins = recoverable_wins(wins, &known_bet_ids);
        let mut valued_prizes = Vec::with_capacity(prizes.len());
        for prize in prizes {
            let value = match prize.prize_value_id {
                Some(id) => prize_store::value_by_id(&mut conn, id)
                    .await?
                    .map(|pv| pv.value),
                None => None,
            };
            valued_prizes.push((prize, value));
        }

        let now = self.clock.now_ms();
        let mut rows = rows_for_prizes(user_id, &valued_prizes, now);
        rows.extend(rows_for_wins(user_id, &wins, now));
        if rows.is_empty() {
            return Ok(0);
        }

        let appended = rows.len();
        with_retries(|| {
            let pool = self.pool.clone();
            let rows = rows.clone();
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        for row in &rows {
                            rating_store::append(conn, row).await?;
                        }
                        Ok(())
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await?;
        Ok(appended)
    }
}

fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 {
        DEFAULT_LEADERBOARD_LIMIT
    } else {
        limit.min(MAX_LEADERBOARD_LIMIT)
    };
    (limit, offset.max(0))
}

/// Winning bets eligible for recovery: claimed (the claim transaction is
/// the only path that credits a bet) and not already represented by a
/// `bet_id` ledger row.
fn recoverable_wins(wins: Vec<Bet>, known_bet_ids: &HashSet<i32>) -> Vec<Bet> {
    wins.into_iter()
        .filter(|bet| bet.claimed && !known_bet_ids.contains(&bet.id))
        .collect()
}

/// Points for a prize row: the referenced `PrizeValue.value` when present,
/// otherwise the parsed `prize_value` string. Unparseable rows are skipped.
fn prize_points(prize: &Prize, referenced_value: Option<i64>) -> Option<i64> {
    referenced_value.or_else(|| parse_prize_value(&prize.prize_value))
}

fn rows_for_prizes(
    user_id: Uuid,
    prizes: &[(Prize, Option<i64>)],
    now_ms: i64,
) -> Vec<NewRatingEntry> {
    let mut rows = Vec::new();
    for (prize, referenced_value) in prizes {
        let Some(points) = prize_points(prize, *referenced_value) else {
            warn!(
                prize_id = prize.id,
                value = %prize.prize_value,
                "skipping prize with unparseable value"
            );
            continue;
        };
        if points == 0 {
            continue;
        }
        rows.push(NewRatingEntry {
            user_id,
            points,
            got_prize_id: Some(prize.id),
            bet_id: None,
            description: format!("Prize {}: {} points", prize.id, points),
            created_at: now_ms,
        });
    }
    rows
}

fn rows_for_wins(user_id: Uuid, wins: &[Bet], now_ms: i64) -> Vec<NewRatingEntry> {
    wins.iter()
        .map(|bet| NewRatingEntry {
            user_id,
            points: bet.sum,
            got_prize_id: None,
            bet_id: Some(bet.id),
            description: format!("Bet {} win: {} points", bet.id, bet.sum),
            created_at: now_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prize(id: i32, value: &str, prize_value_id: Option<i32>) -> Prize {
        Prize {
            id,
            event_id: Some("startup".into()),
            user_id: Uuid::nil(),
            prize_value_id,
            preauth_token_id: None,
            roulette_id: None,
            prize_value: value.into(),
            prize_type: "roulette_on_start".into(),
            awarded_at: 1_000,
            created_at: 1_000,
        }
    }

    fn winning_bet(id: i32, sum: i64) -> Bet {
        Bet {
            id,
            user_id: Uuid::nil(),
            side: "pump".into(),
            sum,
            pair: "ETH/USDT".into(),
            timeframe: 60,
            open_price: 2000.0,
            close_price: Some(2010.0),
            open_time: 0,
            close_time: Some(60_000),
            claimed: false,
            created_at: 0,
            updated_at: 60_000,
        }
    }

    #[test]
    fn referenced_value_wins_over_string() {
        assert_eq!(prize_points(&prize(1, "999", None), Some(5)), Some(5));
        assert_eq!(prize_points(&prize(1, "999", None), None), Some(999));
    }

    #[test]
    fn prize_rows_skip_unparseable_values() {
        let prizes = vec![
            (prize(1, "100", None), None),
            (prize(2, "mystery box", None), None),
            (prize(3, "0.01 ETH", None), None),
        ];
        let rows = rows_for_prizes(Uuid::nil(), &prizes, 5_000);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].points, 100);
        assert_eq!(rows[0].got_prize_id, Some(1));
        assert_eq!(rows[1].points, 10_000_000);
        assert_eq!(rows[1].got_prize_id, Some(3));
        assert!(rows.iter().all(|r| r.bet_id.is_none()));
    }

    #[test]
    fn win_rows_carry_positive_sum_and_bet_source() {
        let rows = rows_for_wins(Uuid::nil(), &[winning_bet(7, 5)], 5_000);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points, 5);
        assert_eq!(rows[0].bet_id, Some(7));
        assert!(rows[0].got_prize_id.is_none());
    }

    #[test]
    fn unclaimed_wins_are_left_to_the_claim_path() {
        let unclaimed = winning_bet(1, 5);
        let kept = recoverable_wins(vec![unclaimed], &HashSet::new());
        assert!(kept.is_empty());
    }

    #[test]
    fn claimed_wins_recover_only_when_their_row_is_missing() {
        let credited = Bet {
            claimed: true,
            ..winning_bet(1, 5)
        };
        let lost = Bet {
            claimed: true,
            ..winning_bet(2, 5)
        };
        let known: HashSet<i32> = [1].into_iter().collect();
        let kept = recoverable_wins(vec![credited, lost], &known);
        assert_eq!(kept.iter().map(|b| b.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(0, 0), (50, 0));
        assert_eq!(clamp_page(-5, -3), (50, 0));
        assert_eq!(clamp_page(10, 20), (10, 20));
        assert_eq!(clamp_page(5000, 0), (1000, 0));
    }
}
