use crate::schema::users;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users, primary_key(user_id), check_for_backend(Pg))]
pub struct User {
    pub id: i32,
    pub user_id: Uuid,
    pub google_id: Option<String>,
    pub telegram_id: Option<i64>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub referrer_user_id: Option<Uuid>,
    pub authorized_fully: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users, check_for_backend(Pg))]
pub struct NewUser {
    pub user_id: Uuid,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub referrer_user_id: Option<Uuid>,
    pub authorized_fully: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

impl NewUser {
    pub fn from_session(session_id: &str, ip: &str, now_ms: i64) -> Self {
        NewUser {
            user_id: Uuid::new_v4(),
            session_id: Some(session_id.to_owned()),
            ip: Some(ip.to_owned()),
            referrer_user_id: None,
            authorized_fully: false,
            created_at: now_ms,
            last_login_at: Some(now_ms),
        }
    }
}

/// Who is acting on a roulette session. A nullable `user_id` column on the
/// preauth token reconstructs into this at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Linked(Uuid),
    Anonymous(String),
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Linked(user_id) => Some(*user_id),
            Actor::Anonymous(_) => None,
        }
    }
}

/// Request-scoped context the transport extracts for the engines: the session
/// cookie, the caller address, and whether a bearer token was present. The
/// core never validates the bearer itself.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub auth_header: Option<String>,
}

impl ClientInfo {
    pub fn for_session(session_id: &str, ip: &str) -> Self {
        ClientInfo {
            session_id: Some(session_id.to_owned()),
            ip: Some(ip.to_owned()),
            auth_header: None,
        }
    }

    pub fn with_auth(mut self, auth_header: &str) -> Self {
        self.auth_header = Some(auth_header.to_owned());
        self
    }

    pub fn has_auth(&self) -> bool {
        self.auth_header
            .as_deref()
            .map(|h| !h.trim().is_empty())
            .unwrap_or(false)
    }
}
