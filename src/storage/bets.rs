use crate::error::CoreResult;
use crate::schema::bets;
use crate::types::bet::{Bet, NewBet};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn insert_bet(conn: &mut AsyncPgConnection, new_bet: &NewBet) -> CoreResult<Bet> {
    Ok(diesel::insert_into(bets::table)
        .values(new_bet)
        .returning(Bet::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn bet_by_id(conn: &mut AsyncPgConnection, id: i32) -> CoreResult<Option<Bet>> {
    Ok(bets::table
        .find(id)
        .select(Bet::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn bet_for_user(
    conn: &mut AsyncPgConnection,
    id: i32,
    user_id: Uuid,
) -> CoreResult<Option<Bet>> {
    Ok(bets::table
        .find(id)
        .filter(bets::user_id.eq(user_id))
        .select(Bet::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Writes the close price exactly once. Returns false when another settler
/// already did, which callers treat as success.
pub async fn settle_bet(
    conn: &mut AsyncPgConnection,
    id: i32,
    close_price: f64,
    close_time_ms: i64,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(bets::table.find(id).filter(bets::close_price.is_null()))
        .set((
            bets::close_price.eq(Some(close_price)),
            bets::close_time.eq(Some(close_time_ms)),
            bets::updated_at.eq(now_ms),
        ))
        .execute(conn)
        .await?;
    Ok(updated > 0)
}

/// One-way claim flip, guarded so double claims affect zero rows.
pub async fn mark_claimed(
    conn: &mut AsyncPgConnection,
    id: i32,
    user_id: Uuid,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(
        bets::table
            .find(id)
            .filter(bets::user_id.eq(user_id))
            .filter(bets::claimed.eq(false)),
    )
    .set((bets::claimed.eq(true), bets::updated_at.eq(now_ms)))
    .execute(conn)
    .await?;
    Ok(updated > 0)
}

/// Open bets plus settled-but-unclaimed ones, newest first.
pub async fn unfinished_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<Bet>> {
    Ok(bets::table
        .filter(bets::user_id.eq(user_id))
        .filter(bets::close_price.is_null().or(bets::claimed.eq(false)))
        .order(bets::open_time.desc())
        .select(Bet::as_select())
        .load(conn)
        .await?)
}

/// Every bet still missing a close price, for the startup sweep.
pub async fn open_bets(conn: &mut AsyncPgConnection) -> CoreResult<Vec<Bet>> {
    Ok(bets::table
        .filter(bets::close_price.is_null())
        .order(bets::open_time.asc())
        .select(Bet::as_select())
        .load(conn)
        .await?)
}

type WinningFilter =
    Box<dyn BoxableExpression<bets::table, diesel::pg::Pg, SqlType = diesel::sql_types::Bool>>;

fn winning_filter() -> WinningFilter {
    // Guarded by is_not_null, so the NULL rows the comparisons would skip
    // anyway are excluded up front.
    Box::new(
        bets::close_price.is_not_null().and(
            bets::side
                .eq("pump")
                .and(bets::close_price.assume_not_null().gt(bets::open_price))
                .or(bets::side
                    .eq("dump")
                    .and(bets::close_price.assume_not_null().lt(bets::open_price))),
        ),
    )
}

pub async fn winning_bets_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<Bet>> {
    Ok(bets::table
        .filter(bets::user_id.eq(user_id))
        .filter(winning_filter())
        .order(bets::close_time.asc())
        .select(Bet::as_select())
        .load(conn)
        .await?)
}

pub async fn count_winning_bets(conn: &mut AsyncPgConnection, user_id: Uuid) -> CoreResult<i64> {
    Ok(bets::table
        .filter(bets::user_id.eq(user_id))
        .filter(winning_filter())
        .count()
        .get_result(conn)
        .await?)
}

pub async fn has_winning_bet(conn: &mut AsyncPgConnection, user_id: Uuid) -> CoreResult<bool> {
    Ok(count_winning_bets(conn, user_id).await? > 0)
}
