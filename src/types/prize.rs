use crate::schema::{got_prizes, prize_values};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeType {
    RouletteOnStart,
    RouletteDuringEvent,
    EventReward,
}

impl PrizeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeType::RouletteOnStart => "roulette_on_start",
            PrizeType::RouletteDuringEvent => "roulette_during_event",
            PrizeType::EventReward => "event_reward",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = prize_values, check_for_backend(Pg))]
pub struct PrizeValue {
    pub id: i32,
    pub event_id: String,
    /// Exact points credited when this prize is taken.
    pub value: i64,
    pub label: String,
    pub segment_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = got_prizes, check_for_backend(Pg))]
pub struct Prize {
    pub id: i32,
    pub event_id: Option<String>,
    pub user_id: Uuid,
    pub prize_value_id: Option<i32>,
    pub preauth_token_id: Option<i32>,
    pub roulette_id: Option<i32>,
    pub prize_value: String,
    pub prize_type: String,
    pub awarded_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = got_prizes, check_for_backend(Pg))]
pub struct NewPrize {
    pub event_id: Option<String>,
    pub user_id: Uuid,
    pub prize_value_id: Option<i32>,
    pub preauth_token_id: Option<i32>,
    pub roulette_id: Option<i32>,
    pub prize_value: String,
    pub prize_type: String,
    pub awarded_at: i64,
    pub created_at: i64,
}
