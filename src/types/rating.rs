use crate::schema::rating;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only ledger row. `got_prize_id` and `bet_id` identify the source
/// event and are mutually exclusive for reconciliation purposes.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = rating, check_for_backend(Pg))]
pub struct RatingEntry {
    pub id: i32,
    pub user_id: Uuid,
    pub points: i64,
    pub got_prize_id: Option<i32>,
    pub bet_id: Option<i32>,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rating, check_for_backend(Pg))]
pub struct NewRatingEntry {
    pub user_id: Uuid,
    pub points: i64,
    pub got_prize_id: Option<i32>,
    pub bet_id: Option<i32>,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BetPointsEntry {
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub net_points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAssets {
    #[serde(rename = "userID")]
    pub user_id: Uuid,
    pub total_points: i64,
}
