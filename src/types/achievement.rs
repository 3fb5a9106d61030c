use crate::schema::{achievements, user_achievements};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

pub const TAG_EVENT: &str = "event";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = achievements, check_for_backend(Pg))]
pub struct Achievement {
    pub id: String,
    pub tags: String,
    pub steps: i32,
    pub prize_id: Option<i32>,
    pub step_desc: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = user_achievements, check_for_backend(Pg))]
pub struct UserAchievement {
    pub id: i32,
    pub user_id: Uuid,
    pub achievement_id: String,
    pub steps_got: i32,
    pub need_steps: i32,
    pub claimed_status: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_achievements, check_for_backend(Pg))]
pub struct NewUserAchievement {
    pub user_id: Uuid,
    pub achievement_id: String,
    pub steps_got: i32,
    pub need_steps: i32,
    pub claimed_status: bool,
    pub updated_at: i64,
}

/// Catalog entry joined with the caller's progress, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementProgress {
    #[serde(flatten)]
    pub achievement: Achievement,
    #[serde(rename = "stepsGot")]
    pub steps_got: i32,
    #[serde(rename = "needSteps")]
    pub need_steps: i32,
    #[serde(rename = "claimedStatus")]
    pub claimed_status: bool,
}
