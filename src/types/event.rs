use crate::schema::{all_events, user_events};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

pub const TAG_COMPETITION: &str = "competition";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = all_events, check_for_backend(Pg))]
pub struct Event {
    pub id: String,
    pub start_time: i64,
    pub deadline: i64,
    pub tags: String,
    pub reward: serde_json::Value,
    pub info: String,
}

impl Event {
    pub fn has_tag(&self, target: &str) -> bool {
        has_tag(&self.tags, target)
    }

    /// Active window is half-open: `start_time <= now < deadline`.
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.start_time <= now_ms && now_ms < self.deadline
    }
}

/// Comma-separated tag list membership, whitespace-insensitive.
pub fn has_tag(tags: &str, target: &str) -> bool {
    if tags.is_empty() || target.is_empty() {
        return false;
    }
    tags.split(',').any(|tag| tag.trim().eq_ignore_ascii_case(target))
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_events, check_for_backend(Pg))]
pub struct UserEvent {
    pub id: i32,
    pub user_id: Uuid,
    pub event_id: String,
    pub status: String,
    pub has_prise_status: Option<bool>,
    pub prize_value_id: Option<i32>,
    pub prize_taken_status: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_events, check_for_backend(Pg))]
pub struct NewUserEvent {
    pub user_id: Uuid,
    pub event_id: String,
    pub status: String,
    pub prize_taken_status: bool,
    pub updated_at: i64,
}

/// An event joined with the caller's participation row, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserEventEntry {
    #[serde(flatten)]
    pub event: Event,
    pub status: String,
    #[serde(rename = "hasPriseStatus", skip_serializing_if = "Option::is_none")]
    pub has_prise_status: Option<bool>,
    #[serde(rename = "prizeTakenStatus")]
    pub prize_taken_status: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventProgress {
    pub event_id: String,
    pub participating: bool,
    pub collected_points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLeader {
    pub leader_image: String,
    pub points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_membership() {
        assert!(has_tag("competition,weekly", "competition"));
        assert!(has_tag("weekly , competition", "competition"));
        assert!(has_tag("Competition", "competition"));
        assert!(!has_tag("competitions", "competition"));
        assert!(!has_tag("", "competition"));
    }

    #[test]
    fn active_window_is_half_open() {
        let event = Event {
            id: "e".into(),
            start_time: 100,
            deadline: 200,
            tags: String::new(),
            reward: serde_json::json!([]),
            info: String::new(),
        };
        assert!(!event.is_active(99));
        assert!(event.is_active(100));
        assert!(event.is_active(199));
        assert!(!event.is_active(200));
    }
}
