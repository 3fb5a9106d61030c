use crate::error::CoreResult;
use crate::schema::rating;
use crate::types::rating::{BetPointsEntry, LeaderboardEntry, NewRatingEntry, RatingEntry};
use diesel::prelude::*;
use diesel::sql_types::{Array, BigInt, Nullable, Uuid as SqlUuid};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

#[derive(QueryableByName)]
struct SumRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

#[derive(QueryableByName)]
struct CursorRow {
    #[diesel(sql_type = Nullable<BigInt>)]
    cursor: Option<i64>,
}

#[derive(QueryableByName)]
struct UserPointsRow {
    #[diesel(sql_type = SqlUuid)]
    user_id: Uuid,
    #[diesel(sql_type = BigInt)]
    total: i64,
}

pub async fn append(
    conn: &mut AsyncPgConnection,
    entry: &NewRatingEntry,
) -> CoreResult<RatingEntry> {
    Ok(diesel::insert_into(rating::table)
        .values(entry)
        .returning(RatingEntry::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn totals(conn: &mut AsyncPgConnection, user_id: Uuid) -> CoreResult<i64> {
    let row: SumRow = diesel::sql_query(
        "SELECT COALESCE(SUM(points), 0)::BIGINT AS total FROM rating WHERE user_id = $1",
    )
    .bind::<SqlUuid, _>(user_id)
    .get_result(conn)
    .await?;
    Ok(row.total)
}

/// Prize ids already credited to the user, for reconciliation dedup.
pub async fn prize_source_ids(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<i32>> {
    Ok(rating::table
        .filter(rating::user_id.eq(user_id))
        .filter(rating::got_prize_id.is_not_null())
        .select(rating::got_prize_id.assume_not_null())
        .load(conn)
        .await?)
}

/// Bet ids already credited to the user, for reconciliation dedup.
pub async fn bet_source_ids(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<i32>> {
    Ok(rating::table
        .filter(rating::user_id.eq(user_id))
        .filter(rating::bet_id.is_not_null())
        .select(rating::bet_id.assume_not_null())
        .load(conn)
        .await?)
}

/// The reconciliation cursor: newest ledger row the user already has.
pub async fn max_created_at(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Option<i64>> {
    let row: CursorRow =
        diesel::sql_query("SELECT MAX(created_at) AS cursor FROM rating WHERE user_id = $1")
            .bind::<SqlUuid, _>(user_id)
            .get_result(conn)
            .await?;
    Ok(row.cursor)
}

pub async fn global_leaderboard(
    conn: &mut AsyncPgConnection,
    limit: i64,
    offset: i64,
) -> CoreResult<Vec<LeaderboardEntry>> {
    let rows: Vec<UserPointsRow> = diesel::sql_query(
        "SELECT user_id, COALESCE(SUM(points), 0)::BIGINT AS total \
         FROM rating \
         GROUP BY user_id \
         ORDER BY total DESC, user_id ASC \
         LIMIT $1 OFFSET $2",
    )
    .bind::<BigInt, _>(limit)
    .bind::<BigInt, _>(offset)
    .load(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| LeaderboardEntry {
            user_id: row.user_id,
            value: row.total,
        })
        .collect())
}

/// Aggregated totals for an explicit id set (the caller's referrals).
/// Referrals with no ledger rows still appear, with zero points.
pub async fn totals_for_users(
    conn: &mut AsyncPgConnection,
    user_ids: &[Uuid],
    limit: i64,
    offset: i64,
) -> CoreResult<Vec<LeaderboardEntry>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<UserPointsRow> = diesel::sql_query(
        "SELECT ids.user_id, COALESCE(SUM(r.points), 0)::BIGINT AS total \
         FROM UNNEST($1::uuid[]) AS ids(user_id) \
         LEFT JOIN rating r ON r.user_id = ids.user_id \
         GROUP BY ids.user_id \
         ORDER BY total DESC, ids.user_id ASC \
         LIMIT $2 OFFSET $3",
    )
    .bind::<Array<SqlUuid>, _>(user_ids.to_vec())
    .bind::<BigInt, _>(limit)
    .bind::<BigInt, _>(offset)
    .load(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| LeaderboardEntry {
            user_id: row.user_id,
            value: row.total,
        })
        .collect())
}

/// Competition metric: bet-sourced points within `[start_ms, end_ms)`.
pub async fn bet_points_in_range(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    start_ms: i64,
    end_ms: i64,
) -> CoreResult<i64> {
    let row: SumRow = diesel::sql_query(
        "SELECT COALESCE(SUM(points), 0)::BIGINT AS total \
         FROM rating \
         WHERE user_id = $1 \
           AND bet_id IS NOT NULL \
           AND got_prize_id IS NULL \
           AND created_at >= $2 \
           AND created_at < $3",
    )
    .bind::<SqlUuid, _>(user_id)
    .bind::<BigInt, _>(start_ms)
    .bind::<BigInt, _>(end_ms)
    .get_result(conn)
    .await?;
    Ok(row.total)
}

pub async fn bet_points_leaderboard(
    conn: &mut AsyncPgConnection,
    start_ms: i64,
    end_ms: i64,
    limit: i64,
) -> CoreResult<Vec<BetPointsEntry>> {
    let rows: Vec<UserPointsRow> = diesel::sql_query(
        "SELECT user_id, COALESCE(SUM(points), 0)::BIGINT AS total \
         FROM rating \
         WHERE bet_id IS NOT NULL \
           AND got_prize_id IS NULL \
           AND created_at >= $1 \
           AND created_at < $2 \
         GROUP BY user_id \
         ORDER BY total DESC, user_id ASC \
         LIMIT $3",
    )
    .bind::<BigInt, _>(start_ms)
    .bind::<BigInt, _>(end_ms)
    .bind::<BigInt, _>(limit)
    .load(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| BetPointsEntry {
            user_id: row.user_id,
            net_points: row.total,
        })
        .collect())
}
