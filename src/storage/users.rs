use crate::error::CoreResult;
use crate::schema::users;
use crate::types::user::{NewUser, User};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn by_user_id(conn: &mut AsyncPgConnection, id: Uuid) -> CoreResult<Option<User>> {
    Ok(users::table
        .filter(users::user_id.eq(id))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?)
}

pub async fn by_session_id(
    conn: &mut AsyncPgConnection,
    session_id: &str,
) -> CoreResult<Option<User>> {
    Ok(users::table
        .filter(users::session_id.eq(session_id))
        .select(User::as_select())
        .first(conn)
        .await
        .optional()?)
}

/// Creates the session-keyed user or refreshes its ip/last-login. The unique
/// index on `session_id` makes concurrent first-touches converge on one row.
pub async fn upsert_by_session(
    conn: &mut AsyncPgConnection,
    session_id: &str,
    ip: &str,
    now_ms: i64,
) -> CoreResult<User> {
    let new_user = NewUser::from_session(session_id, ip, now_ms);
    Ok(diesel::insert_into(users::table)
        .values(&new_user)
        .on_conflict(users::session_id)
        .do_update()
        .set((
            users::ip.eq(Some(ip.to_owned())),
            users::last_login_at.eq(Some(now_ms)),
        ))
        .returning(User::as_returning())
        .get_result(conn)
        .await?)
}

/// Users referred by `referrer`, i.e. the caller's friends list.
pub async fn referral_ids(
    conn: &mut AsyncPgConnection,
    referrer: Uuid,
) -> CoreResult<Vec<Uuid>> {
    Ok(users::table
        .filter(users::referrer_user_id.eq(referrer))
        .select(users::user_id)
        .load(conn)
        .await?)
}
