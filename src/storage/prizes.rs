use crate::error::CoreResult;
use crate::schema::{got_prizes, prize_values};
use crate::types::prize::{NewPrize, Prize, PrizeValue};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn insert_prize(conn: &mut AsyncPgConnection, new_prize: &NewPrize) -> CoreResult<Prize> {
    Ok(diesel::insert_into(got_prizes::table)
        .values(new_prize)
        .returning(Prize::as_returning())
        .get_result(conn)
        .await?)
}

/// Prizes awarded strictly after the reconciliation cursor.
pub async fn prizes_awarded_after(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    cursor_ms: Option<i64>,
) -> CoreResult<Vec<Prize>> {
    let mut query = got_prizes::table
        .filter(got_prizes::user_id.eq(user_id))
        .select(Prize::as_select())
        .into_boxed();
    if let Some(cursor) = cursor_ms {
        query = query.filter(got_prizes::awarded_at.gt(cursor));
    }
    Ok(query
        .order(got_prizes::awarded_at.asc())
        .load(conn)
        .await?)
}

pub async fn values_by_event(
    conn: &mut AsyncPgConnection,
    event_id: &str,
) -> CoreResult<Vec<PrizeValue>> {
    Ok(prize_values::table
        .filter(prize_values::event_id.eq(event_id))
        .order(prize_values::id.asc())
        .select(PrizeValue::as_select())
        .load(conn)
        .await?)
}

pub async fn value_by_id(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> CoreResult<Option<PrizeValue>> {
    Ok(prize_values::table
        .find(id)
        .select(PrizeValue::as_select())
        .first(conn)
        .await
        .optional()?)
}
