use crate::schema::bets;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetSide {
    Pump,
    Dump,
}

impl BetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetSide::Pump => "pump",
            BetSide::Dump => "dump",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pump" => Some(BetSide::Pump),
            "dump" => Some(BetSide::Dump),
            _ => None,
        }
    }
}

/// Derived from side and prices, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Win,
    Lose,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Win => "win",
            Outcome::Lose => "lose",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = bets, check_for_backend(Pg))]
pub struct Bet {
    pub id: i32,
    pub user_id: Uuid,
    pub side: String,
    pub sum: i64,
    pub pair: String,
    pub timeframe: i32,
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub open_time: i64,
    pub close_time: Option<i64>,
    pub claimed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Bet {
    /// When settlement is due: `open_time + timeframe`, in ms.
    pub fn expected_close_time(&self) -> i64 {
        self.open_time + self.timeframe as i64 * 1000
    }

    pub fn is_settled(&self) -> bool {
        self.close_price.is_some()
    }

    pub fn outcome(&self) -> Outcome {
        let close = match self.close_price {
            Some(close) => close,
            None => return Outcome::Pending,
        };
        let won = match BetSide::parse(&self.side) {
            Some(BetSide::Pump) => close > self.open_price,
            Some(BetSide::Dump) => close < self.open_price,
            None => false,
        };
        if won {
            Outcome::Win
        } else {
            Outcome::Lose
        }
    }

    /// Signed ledger magnitude for a settled bet: `+sum` on a win, `-sum`
    /// otherwise.
    pub fn claim_points(&self) -> i64 {
        match self.outcome() {
            Outcome::Win => self.sum,
            _ => -self.sum,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bets, check_for_backend(Pg))]
pub struct NewBet {
    pub user_id: Uuid,
    pub side: String,
    pub sum: i64,
    pub pair: String,
    pub timeframe: i32,
    pub open_price: f64,
    pub open_time: i64,
    pub claimed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenBetRequest {
    pub side: String,
    pub sum: i64,
    pub pair: String,
    pub timeframe: i32,
    #[serde(rename = "openPrice")]
    pub open_price: f64,
    #[serde(rename = "openTime")]
    pub open_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenBetResponse {
    pub id: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetStatus {
    pub side: String,
    pub sum: i64,
    pub pair: String,
    pub timeframe: i32,
    #[serde(rename = "openPrice")]
    pub open_price: f64,
    #[serde(rename = "closePrice", skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    #[serde(rename = "openTime")]
    pub open_time: i64,
    #[serde(rename = "claimedStatus")]
    pub claimed: bool,
    #[serde(rename = "prizeStatus")]
    pub prize_status: Outcome,
}

impl From<&Bet> for BetStatus {
    fn from(bet: &Bet) -> Self {
        BetStatus {
            side: bet.side.clone(),
            sum: bet.sum,
            pair: bet.pair.clone(),
            timeframe: bet.timeframe,
            open_price: bet.open_price,
            close_price: bet.close_price,
            open_time: bet.open_time,
            claimed: bet.claimed,
            prize_status: bet.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(side: &str, open: f64, close: Option<f64>) -> Bet {
        Bet {
            id: 1,
            user_id: Uuid::nil(),
            side: side.into(),
            sum: 5,
            pair: "ETH/USDT".into(),
            timeframe: 60,
            open_price: open,
            close_price: close,
            open_time: 1_000_000,
            close_time: close.map(|_| 1_060_000),
            claimed: false,
            created_at: 1_000_000,
            updated_at: 1_000_000,
        }
    }

    #[test]
    fn open_bet_is_pending() {
        assert_eq!(bet("pump", 2000.0, None).outcome(), Outcome::Pending);
    }

    #[test]
    fn pump_wins_when_price_rises() {
        assert_eq!(bet("pump", 2000.0, Some(2010.0)).outcome(), Outcome::Win);
        assert_eq!(bet("pump", 2000.0, Some(1990.0)).outcome(), Outcome::Lose);
        assert_eq!(bet("pump", 2000.0, Some(2000.0)).outcome(), Outcome::Lose);
    }

    #[test]
    fn dump_wins_when_price_falls() {
        assert_eq!(bet("dump", 2000.0, Some(1990.0)).outcome(), Outcome::Win);
        assert_eq!(bet("dump", 2000.0, Some(2010.0)).outcome(), Outcome::Lose);
        assert_eq!(bet("dump", 2000.0, Some(2000.0)).outcome(), Outcome::Lose);
    }

    #[test]
    fn claim_points_carry_outcome_sign() {
        assert_eq!(bet("pump", 2000.0, Some(2010.0)).claim_points(), 5);
        assert_eq!(bet("pump", 2000.0, Some(1990.0)).claim_points(), -5);
    }

    #[test]
    fn expected_close_time_is_open_plus_timeframe() {
        assert_eq!(bet("pump", 2000.0, None).expected_close_time(), 1_060_000);
    }
}
