use crate::schema::{roulette, roulette_config, roulette_preauth_token};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouletteType {
    OnStart,
    DuringEvent,
}

impl RouletteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouletteType::OnStart => "on_start",
            RouletteType::DuringEvent => "during_event",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "on_start" => Some(RouletteType::OnStart),
            "during_event" => Some(RouletteType::DuringEvent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = roulette_config, check_for_backend(Pg))]
pub struct RouletteConfig {
    pub id: i32,
    #[serde(rename = "type")]
    pub config_type: String,
    pub event_id: String,
    pub max_spins: i32,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RouletteConfig {
    pub fn roulette_type(&self) -> Option<RouletteType> {
        RouletteType::parse(&self.config_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = roulette_preauth_token, check_for_backend(Pg))]
pub struct PreauthToken {
    pub id: i32,
    pub token: String,
    pub user_id: Option<Uuid>,
    pub roulette_config_id: i32,
    pub is_used: bool,
    pub expires_at: i64,
    pub created_at: i64,
}

impl PreauthToken {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roulette_preauth_token, check_for_backend(Pg))]
pub struct NewPreauthToken {
    pub token: String,
    pub user_id: Option<Uuid>,
    pub roulette_config_id: i32,
    pub is_used: bool,
    pub expires_at: i64,
    pub created_at: i64,
}

/// One roulette play-through. Exactly one session exists per preauth token.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = roulette, check_for_backend(Pg))]
pub struct RouletteSession {
    pub id: i32,
    pub roulette_config_id: i32,
    pub preauth_token_id: i32,
    pub spin_number: i32,
    pub prize: Option<String>,
    pub prize_taken: bool,
    pub spin_result: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
    pub prize_taken_at: Option<i64>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roulette, check_for_backend(Pg))]
pub struct NewRouletteSession {
    pub roulette_config_id: i32,
    pub preauth_token_id: i32,
    pub spin_number: i32,
    pub prize_taken: bool,
    pub spin_result: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouletteStatus {
    pub config: RouletteConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<RouletteSession>,
    pub remaining_spins: i32,
    pub can_spin: bool,
    pub prize_taken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinResult {
    #[serde(rename = "segmentId")]
    pub segment_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinReward {
    #[serde(rename = "type")]
    pub reward_type: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinResponse {
    pub result: SpinResult,
    #[serde(rename = "spinsLeft")]
    pub spins_left: i32,
    pub reward: SpinReward,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TakePrizeResponse {
    pub success: bool,
    pub prize: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preauth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_response_wire_format() {
        let response = SpinResponse {
            result: SpinResult {
                segment_id: "2".into(),
                label: "0.005 ETH".into(),
            },
            spins_left: 1,
            reward: SpinReward {
                reward_type: "eth".into(),
                amount: 0.005,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["result"]["segmentId"], "2");
        assert_eq!(json["result"]["label"], "0.005 ETH");
        assert_eq!(json["spinsLeft"], 1);
        assert_eq!(json["reward"]["type"], "eth");
        assert_eq!(json["reward"]["amount"], 0.005);
    }

    #[test]
    fn take_prize_response_omits_token_for_linked_users() {
        let response = TakePrizeResponse {
            success: true,
            prize: "10000000".into(),
            message: "Prize taken successfully".into(),
            preauth_token: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("preauth_token").is_none());

        let response = TakePrizeResponse {
            preauth_token: Some("a".repeat(64)),
            ..response
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["preauth_token"], "a".repeat(64));
    }
}
