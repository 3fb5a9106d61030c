use crate::error::CoreResult;
use crate::schema::{all_events, user_events};
use crate::types::event::{Event, NewUserEvent, UserEvent};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn event_by_id(conn: &mut AsyncPgConnection, id: &str) -> CoreResult<Option<Event>> {
    Ok(all_events::table
        .find(id)
        .select(Event::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn events_by_tag(
    conn: &mut AsyncPgConnection,
    tag: Option<&str>,
) -> CoreResult<Vec<Event>> {
    let mut query = all_events::table.select(Event::as_select()).into_boxed();
    if let Some(tag) = tag {
        query = query.filter(all_events::tags.ilike(format!("%{tag}%")));
    }
    Ok(query
        .order(all_events::start_time.asc())
        .load(conn)
        .await?)
}

/// Joins the user to the event; returns false when already joined.
pub async fn insert_user_event_if_absent(
    conn: &mut AsyncPgConnection,
    new_entry: &NewUserEvent,
) -> CoreResult<bool> {
    let inserted = diesel::insert_into(user_events::table)
        .values(new_entry)
        .on_conflict((user_events::user_id, user_events::event_id))
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(inserted > 0)
}

pub async fn user_event(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_id: &str,
) -> CoreResult<Option<UserEvent>> {
    Ok(user_events::table
        .filter(user_events::user_id.eq(user_id))
        .filter(user_events::event_id.eq(event_id))
        .select(UserEvent::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn user_events_for_user(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> CoreResult<Vec<UserEvent>> {
    Ok(user_events::table
        .filter(user_events::user_id.eq(user_id))
        .order(user_events::updated_at.desc())
        .select(UserEvent::as_select())
        .load(conn)
        .await?)
}

/// Resolves the tri-state prize flag exactly once: the guard on
/// `has_prise_status IS NULL` makes repeated calls no-ops.
pub async fn set_prize_status_if_unresolved(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_id: &str,
    has_prize: bool,
    prize_value_id: Option<i32>,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(
        user_events::table
            .filter(user_events::user_id.eq(user_id))
            .filter(user_events::event_id.eq(event_id))
            .filter(user_events::has_prise_status.is_null()),
    )
    .set((
        user_events::has_prise_status.eq(Some(has_prize)),
        user_events::prize_value_id.eq(prize_value_id),
        user_events::updated_at.eq(now_ms),
    ))
    .execute(conn)
    .await?;
    Ok(updated > 0)
}

/// One-way prize-taken flip; zero rows means somebody else took it first.
pub async fn mark_prize_taken(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_id: &str,
    now_ms: i64,
) -> CoreResult<bool> {
    let updated = diesel::update(
        user_events::table
            .filter(user_events::user_id.eq(user_id))
            .filter(user_events::event_id.eq(event_id))
            .filter(user_events::prize_taken_status.eq(false)),
    )
    .set((
        user_events::prize_taken_status.eq(true),
        user_events::updated_at.eq(now_ms),
    ))
    .execute(conn)
    .await?;
    Ok(updated > 0)
}
