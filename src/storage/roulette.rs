use crate::error::{CoreError, CoreResult};
use crate::schema::{roulette, roulette_config, roulette_preauth_token};
use crate::types::roulette::{
    NewPreauthToken, NewRouletteSession, PreauthToken, RouletteConfig, RouletteSession,
    RouletteType,
};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn config_by_id(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> CoreResult<Option<RouletteConfig>> {
    Ok(roulette_config::table
        .find(id)
        .select(RouletteConfig::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn active_config_by_type(
    conn: &mut AsyncPgConnection,
    config_type: RouletteType,
    event_id: &str,
) -> CoreResult<Option<RouletteConfig>> {
    Ok(roulette_config::table
        .filter(roulette_config::config_type.eq(config_type.as_str()))
        .filter(roulette_config::event_id.eq(event_id))
        .filter(roulette_config::is_active.eq(true))
        .order(roulette_config::id.desc())
        .select(RouletteConfig::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn preauth_by_token(
    conn: &mut AsyncPgConnection,
    token: &str,
) -> CoreResult<Option<PreauthToken>> {
    Ok(roulette_preauth_token::table
        .filter(roulette_preauth_token::token.eq(token))
        .select(PreauthToken::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Inserts the token unless a concurrent first-touch already did; either way
/// the caller re-reads the surviving row.
pub async fn insert_preauth_if_absent(
    conn: &mut AsyncPgConnection,
    new_token: &NewPreauthToken,
) -> CoreResult<Option<PreauthToken>> {
    Ok(diesel::insert_into(roulette_preauth_token::table)
        .values(new_token)
        .on_conflict(roulette_preauth_token::token)
        .do_nothing()
        .returning(PreauthToken::as_returning())
        .get_result(conn)
        .await
        .optional()?)
}

/// Binds the token to a user; a no-op when already bound to the same user.
/// Returns the number of rows touched, 0 meaning the token belongs to
/// someone else.
pub async fn bind_preauth_user(
    conn: &mut AsyncPgConnection,
    token: &str,
    user_id: Uuid,
) -> CoreResult<usize> {
    diesel::update(
        roulette_preauth_token::table
            .filter(roulette_preauth_token::token.eq(token))
            .filter(
                roulette_preauth_token::user_id
                    .is_null()
                    .or(roulette_preauth_token::user_id.eq(user_id)),
            ),
    )
    .set(roulette_preauth_token::user_id.eq(user_id))
    .execute(conn)
    .await
    .map_err(|err| match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            CoreError::from(crate::error::Conflict::AlreadyLinked)
        }
        other => other.into(),
    })
}

pub async fn mark_preauth_used(conn: &mut AsyncPgConnection, id: i32) -> CoreResult<()> {
    diesel::update(roulette_preauth_token::table.find(id))
        .set(roulette_preauth_token::is_used.eq(true))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn session_by_preauth(
    conn: &mut AsyncPgConnection,
    preauth_token_id: i32,
) -> CoreResult<Option<RouletteSession>> {
    Ok(roulette::table
        .filter(roulette::preauth_token_id.eq(preauth_token_id))
        .select(RouletteSession::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Same lookup but with a row lock, so concurrent spins on one token
/// serialize on the session row.
pub async fn session_by_preauth_for_update(
    conn: &mut AsyncPgConnection,
    preauth_token_id: i32,
) -> CoreResult<Option<RouletteSession>> {
    Ok(roulette::table
        .filter(roulette::preauth_token_id.eq(preauth_token_id))
        .for_update()
        .select(RouletteSession::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn insert_session(
    conn: &mut AsyncPgConnection,
    new_session: &NewRouletteSession,
) -> CoreResult<RouletteSession> {
    diesel::insert_into(roulette::table)
        .values(new_session)
        .returning(RouletteSession::as_returning())
        .get_result(conn)
        .await
        .map_err(|err| match err {
            // A concurrent first spin won the unique preauth_token_id race;
            // the transaction retries and observes the winner's row.
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                CoreError::unavailable("concurrent roulette session insert")
            }
            other => other.into(),
        })
}

pub async fn record_spin(
    conn: &mut AsyncPgConnection,
    session_id: i32,
    spin_number: i32,
    prize: &str,
    spin_result: &serde_json::Value,
    now_ms: i64,
) -> CoreResult<()> {
    diesel::update(roulette::table.find(session_id))
        .set((
            roulette::spin_number.eq(spin_number),
            roulette::prize.eq(Some(prize.to_owned())),
            roulette::spin_result.eq(spin_result),
            roulette::updated_at.eq(now_ms),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// One-way `prize_taken` flip. Returns false when another taker already won.
pub async fn mark_prize_taken(
    conn: &mut AsyncPgConnection,
    session_id: i32,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(
        roulette::table
            .find(session_id)
            .filter(roulette::prize_taken.eq(false)),
    )
    .set((
        roulette::prize_taken.eq(true),
        roulette::prize_taken_at.eq(Some(now_ms)),
        roulette::updated_at.eq(now_ms),
    ))
    .execute(conn)
    .await?;
    Ok(updated > 0)
}
