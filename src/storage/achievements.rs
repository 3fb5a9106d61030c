use crate::error::CoreResult;
use crate::schema::{achievements, user_achievements};
use crate::types::achievement::{Achievement, NewUserAchievement, UserAchievement};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn all_achievements(conn: &mut AsyncPgConnection) -> CoreResult<Vec<Achievement>> {
    Ok(achievements::table
        .order(achievements::id.asc())
        .select(Achievement::as_select())
        .load(conn)
        .await?)
}

pub async fn achievement_by_id(
    conn: &mut AsyncPgConnection,
    id: &str,
) -> CoreResult<Option<Achievement>> {
    Ok(achievements::table
        .find(id)
        .select(Achievement::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// The placement achievement bound to an event prize value, if any.
pub async fn achievement_by_prize_value(
    conn: &mut AsyncPgConnection,
    prize_value_id: i32,
) -> CoreResult<Option<Achievement>> {
    Ok(achievements::table
        .filter(achievements::prize_id.eq(prize_value_id))
        .select(Achievement::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn user_achievement(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    achievement_id: &str,
) -> CoreResult<Option<UserAchievement>> {
    Ok(user_achievements::table
        .filter(user_achievements::user_id.eq(user_id))
        .filter(user_achievements::achievement_id.eq(achievement_id))
        .select(UserAchievement::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Same lookup but with a row lock so progress updates serialize per user.
pub async fn user_achievement_for_update(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    achievement_id: &str,
) -> CoreResult<Option<UserAchievement>> {
    Ok(user_achievements::table
        .filter(user_achievements::user_id.eq(user_id))
        .filter(user_achievements::achievement_id.eq(achievement_id))
        .for_update()
        .select(UserAchievement::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn user_achievements_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<UserAchievement>> {
    Ok(user_achievements::table
        .filter(user_achievements::user_id.eq(user_id))
        .order(user_achievements::achievement_id.asc())
        .select(UserAchievement::as_select())
        .load(conn)
        .await?)
}

pub async fn upsert_progress(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    achievement_id: &str,
    steps_got: i32,
    need_steps: i32,
    claimed_status: bool,
    now_ms: i64,
) -> CoreResult<()> {
    let row = NewUserAchievement {
        user_id,
        achievement_id: achievement_id.to_owned(),
        steps_got,
        need_steps,
        claimed_status,
        updated_at: now_ms,
    };
    diesel::insert_into(user_achievements::table)
        .values(&row)
        .on_conflict((
            user_achievements::user_id,
            user_achievements::achievement_id,
        ))
        .do_update()
        .set((
            user_achievements::steps_got.eq(steps_got),
            user_achievements::need_steps.eq(need_steps),
            user_achievements::claimed_status.eq(claimed_status),
            user_achievements::updated_at.eq(now_ms),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Inserts a completed row unless one exists; returns whether it was created.
pub async fn insert_if_absent(
    conn: &mut AsyncPgConnection,
    row: &NewUserAchievement,
) -> CoreResult<bool> {
    let inserted = diesel::insert_into(user_achievements::table)
        .values(row)
        .on_conflict((
            user_achievements::user_id,
            user_achievements::achievement_id,
        ))
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(inserted > 0)
}

/// One-way claim flip, guarded by `claimed_status = false`.
pub async fn mark_claimed(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    achievement_id: &str,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(
        user_achievements::table
            .filter(user_achievements::user_id.eq(user_id))
            .filter(user_achievements::achievement_id.eq(achievement_id))
            .filter(user_achievements::claimed_status.eq(false)),
    )
    .set((
        user_achievements::claimed_status.eq(true),
        user_achievements::updated_at.eq(now_ms),
    ))
    .execute(conn)
    .await?;
    Ok(updated > 0)
}

pub async fn set_need_steps(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    achievement_id: &str,
    need_steps: i32,
    now_ms: i64,
) -> CoreResult<()> {
    diesel::update(
        user_achievements::table
            .filter(user_achievements::user_id.eq(user_id))
            .filter(user_achievements::achievement_id.eq(achievement_id)),
    )
    .set((
        user_achievements::need_steps.eq(need_steps),
        user_achievements::updated_at.eq(now_ms),
    ))
    .execute(conn)
    .await?;
    Ok(())
}
