use crate::clock::Clock;
use crate::error::{Conflict, CoreError, CoreResult};
use crate::identity::IdentityBinder;
use crate::storage::persistent::{get_conn, with_retries, DbPool};
use crate::storage::{prizes as prize_store, rating as rating_store, roulette as roulette_store};
use crate::types::prize::{NewPrize, PrizeType, PrizeValue};
use crate::types::rating::NewRatingEntry;
use crate::types::roulette::{
    NewRouletteSession, PreauthToken, RouletteConfig, RouletteSession, RouletteStatus,
    RouletteType, SpinResponse, SpinResult, SpinReward, TakePrizeResponse,
};
use crate::types::user::ClientInfo;
use crate::utils::points::{is_eth_label, parse_prize_value, points_to_eth};
use diesel_async::AsyncConnection;
use rand::Rng;
use scoped_futures::ScopedFutureExt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Spins and the one-shot prize award over a preauth-token session.
pub struct RouletteEngine {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    identity: Arc<IdentityBinder>,
}

impl RouletteEngine {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, identity: Arc<IdentityBinder>) -> Self {
        Self {
            pool,
            clock,
            identity,
        }
    }

    pub async fn status(&self, preauth_token: &str) -> CoreResult<RouletteStatus> {
        let mut conn = get_conn(&self.pool).await?;
        let token = self.validate_token(&mut conn, preauth_token).await?;
        let config = roulette_store::config_by_id(&mut conn, token.roulette_config_id)
            .await?
            .ok_or_else(|| CoreError::not_found("roulette config not found"))?;
        let session = roulette_store::session_by_preauth(&mut conn, token.id).await?;
        if token.is_used && session.is_none() {
            return Err(Conflict::UsedToken.into());
        }

        let spin_number = session.as_ref().map(|s| s.spin_number).unwrap_or(0);
        let prize_taken = session.as_ref().map(|s| s.prize_taken).unwrap_or(false);
        let remaining_spins = if prize_taken {
            0
        } else {
            (config.max_spins - spin_number).max(0)
        };
        Ok(RouletteStatus {
            can_spin: remaining_spins > 0 && !prize_taken,
            remaining_spins,
            prize_taken,
            session,
            config,
        })
    }

    /// One spin: serializes on the session row, bumps the spin counter,
    /// selects a prize uniformly at random from the event's prize values and
    /// records it, all inside one serializable transaction.
    pub async fn spin(
        &self,
        client: &ClientInfo,
        preauth_token: Option<&str>,
        roulette_id: Option<i32>,
    ) -> CoreResult<SpinResponse> {
        let token = self.resolve_token(client, preauth_token).await?;
        let mut conn = get_conn(&self.pool).await?;
        let config = self.active_config(&mut conn, &token, roulette_id).await?;
        self.check_event_auth(&config, client)?;

        let values = prize_store::values_by_event(&mut conn, &config.event_id).await?;
        if values.is_empty() {
            return Err(Conflict::NoPrizes.into());
        }
        drop(conn);

        let now = self.clock.now_ms();
        let (spin_number, selected) = with_retries(|| {
            let pool = self.pool.clone();
            let values = values.clone();
            let config = config.clone();
            let token_id = token.id;
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.build_transaction()
                    .serializable()
                    .run::<_, CoreError, _>(|conn| {
                        async move {
                            let session =
                                roulette_store::session_by_preauth_for_update(conn, token_id)
                                    .await?;
                            let (session_id, spin_number) = match session {
                                Some(s) if s.prize_taken => {
                                    return Err(Conflict::AlreadyTaken.into())
                                }
                                Some(s) if s.spin_number >= config.max_spins => {
                                    return Err(Conflict::MaxSpinsReached.into())
                                }
                                Some(s) => (s.id, s.spin_number + 1),
                                None => {
                                    let created = roulette_store::insert_session(
                                        conn,
                                        &NewRouletteSession {
                                            roulette_config_id: config.id,
                                            preauth_token_id: token_id,
                                            spin_number: 1,
                                            prize_taken: false,
                                            spin_result: serde_json::json!({}),
                                            created_at: now,
                                            updated_at: now,
                                        },
                                    )
                                    .await?;
                                    (created.id, 1)
                                }
                            };

                            let selected =
                                values[rand::thread_rng().gen_range(0..values.len())].clone();
                            roulette_store::record_spin(
                                conn,
                                session_id,
                                spin_number,
                                &selected.value.to_string(),
                                &spin_result_json(&selected),
                                now,
                            )
                            .await?;
                            roulette_store::mark_preauth_used(conn, token_id).await?;
                            Ok((spin_number, selected))
                        }
                        .scope_boxed()
                    })
                    .await
            }
        })
        .await?;

        Ok(build_spin_response(&selected, config.max_spins, spin_number))
    }

    /// Awards the selected prize exactly once: a Prize row, the session's
    /// one-way `prize_taken` flip and the ledger credit commit together.
    /// Taking an already-taken prize returns the original award.
    pub async fn take_prize(
        &self,
        client: &ClientInfo,
        preauth_token: Option<&str>,
        roulette_id: Option<i32>,
    ) -> CoreResult<TakePrizeResponse> {
        let token = self.resolve_token(client, preauth_token).await?;
        let was_unregistered = token.user_id.is_none();
        let returned_token = was_unregistered.then(|| token.token.clone());

        // Locate-or-create the implicit session user so an unauthenticated
        // startup player can still be awarded. Failure here never blocks the
        // prize itself.
        if let (Some(session_id), Some(ip)) = (&client.session_id, &client.ip) {
            if let Err(err) = self
                .identity
                .create_or_update_user_by_session(session_id, ip)
                .await
            {
                warn!("failed to upsert session user: {err}");
            }
        }

        let mut conn = get_conn(&self.pool).await?;
        let config = self.active_config(&mut conn, &token, roulette_id).await?;
        self.check_event_auth(&config, client)?;

        let session = roulette_store::session_by_preauth(&mut conn, token.id)
            .await?
            .ok_or_else(|| CoreError::not_found("roulette session not found, must spin first"))?;

        if session.prize_taken {
            let prize = session.prize.clone().ok_or(Conflict::AlreadyTaken)?;
            return Ok(already_taken_response(prize, returned_token));
        }
        if session.spin_number < config.max_spins {
            return Err(Conflict::IncompleteSpins.into());
        }

        let (prize_value, prize_value_id) =
            self.resolve_prize_value(&mut conn, &session).await?;
        let user_id = self.resolve_award_user(&token, client).await?;

        let points = match prize_value_id {
            Some(id) => prize_store::value_by_id(&mut conn, id)
                .await?
                .map(|pv| pv.value),
            None => None,
        }
        .or_else(|| parse_prize_value(&prize_value));
        if points.is_none() {
            warn!(
                session_id = session.id,
                value = %prize_value,
                "prize value is unparseable, awarding without ledger credit"
            );
        }
        drop(conn);

        let prize_type = match config.roulette_type() {
            Some(RouletteType::DuringEvent) => PrizeType::RouletteDuringEvent,
            _ => PrizeType::RouletteOnStart,
        };

        let now = self.clock.now_ms();
        let result = with_retries(|| {
            let pool = self.pool.clone();
            let prize_value = prize_value.clone();
            let event_id = config.event_id.clone();
            let token_id = token.id;
            let session_id = session.id;
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        let prize = prize_store::insert_prize(
                            conn,
                            &NewPrize {
                                event_id: Some(event_id),
                                user_id,
                                prize_value_id,
                                preauth_token_id: Some(token_id),
                                roulette_id: Some(session_id),
                                prize_value,
                                prize_type: prize_type.as_str().to_owned(),
                                awarded_at: now,
                                created_at: now,
                            },
                        )
                        .await?;
                        if !roulette_store::mark_prize_taken(conn, session_id, now).await? {
                            return Err(Conflict::AlreadyTaken.into());
                        }
                        if let Some(points) = points.filter(|points| *points != 0) {
                            rating_store::append(
                                conn,
                                &NewRatingEntry {
                                    user_id,
                                    points,
                                    got_prize_id: Some(prize.id),
                                    bet_id: None,
                                    description: format!("Roulette prize: {points} points"),
                                    created_at: now,
                                },
                            )
                            .await?;
                        }
                        roulette_store::mark_preauth_used(conn, token_id).await?;
                        Ok(())
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await;

        match result {
            Ok(()) => Ok(TakePrizeResponse {
                success: true,
                prize: prize_value,
                message: "Prize taken successfully".to_owned(),
                preauth_token: returned_token,
            }),
            // A concurrent taker committed first; surface their award.
            Err(CoreError::Conflict(Conflict::AlreadyTaken)) => {
                let mut conn = get_conn(&self.pool).await?;
                let session = roulette_store::session_by_preauth(&mut conn, token.id)
                    .await?
                    .ok_or(Conflict::AlreadyTaken)?;
                let prize = session.prize.ok_or(Conflict::AlreadyTaken)?;
                Ok(already_taken_response(prize, returned_token))
            }
            Err(err) => Err(err),
        }
    }

    /// An explicit token must exist and be unexpired; without one the caller
    /// falls back to the deterministic session+ip identity against the
    /// startup config.
    async fn resolve_token(
        &self,
        client: &ClientInfo,
        preauth_token: Option<&str>,
    ) -> CoreResult<PreauthToken> {
        match preauth_token.filter(|raw| !raw.is_empty()) {
            Some(raw) => {
                let mut conn = get_conn(&self.pool).await?;
                self.validate_token(&mut conn, raw).await
            }
            None => {
                let (session_id, ip) = match (&client.session_id, &client.ip) {
                    (Some(session_id), Some(ip)) => (session_id.as_str(), ip.as_str()),
                    _ => {
                        return Err(CoreError::bad_request(
                            "preauth_token is required, or session id and ip address must be provided",
                        ))
                    }
                };
                self.identity.resolve_or_create_startup(session_id, ip).await
            }
        }
    }

    async fn validate_token(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        raw: &str,
    ) -> CoreResult<PreauthToken> {
        let token = roulette_store::preauth_by_token(conn, raw)
            .await?
            .ok_or_else(|| CoreError::not_found("preauth token not found"))?;
        if token.is_expired(self.clock.now_ms()) {
            return Err(Conflict::ExpiredToken.into());
        }
        Ok(token)
    }

    async fn active_config(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        token: &PreauthToken,
        roulette_id: Option<i32>,
    ) -> CoreResult<RouletteConfig> {
        let config = roulette_store::config_by_id(conn, token.roulette_config_id)
            .await?
            .filter(|config| config.is_active)
            .ok_or_else(|| CoreError::not_found("roulette config not found or inactive"))?;
        if let Some(id) = roulette_id {
            if id != config.id {
                return Err(CoreError::bad_request(
                    "invalid roulette_id for provided preauth_token",
                ));
            }
        }
        Ok(config)
    }

    /// During-event roulettes require an authenticated caller; the core only
    /// asserts a bearer is present, validation is the transport's job.
    fn check_event_auth(&self, config: &RouletteConfig, client: &ClientInfo) -> CoreResult<()> {
        if config.roulette_type() == Some(RouletteType::DuringEvent) && !client.has_auth() {
            return Err(CoreError::Unauthorized(
                "authorization is required for event roulette".into(),
            ));
        }
        Ok(())
    }

    /// The prize recorded on the last spin: `session.prize`, falling back to
    /// the `spin_result` payload and finally to the referenced prize value.
    async fn resolve_prize_value(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        session: &RouletteSession,
    ) -> CoreResult<(String, Option<i32>)> {
        let prize_value_id = session
            .spin_result
            .get("prize_value_id")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        if let Some(prize) = session.prize.clone().filter(|p| !p.is_empty()) {
            return Ok((prize, prize_value_id));
        }
        if let Some(value) = session.spin_result.get("prize_value").and_then(|v| v.as_i64()) {
            return Ok((value.to_string(), prize_value_id));
        }
        if let Some(id) = prize_value_id {
            if let Some(pv) = prize_store::value_by_id(conn, id).await? {
                return Ok((pv.value.to_string(), Some(id)));
            }
        }
        Err(Conflict::NoPrizes.into())
    }

    /// The award needs a real user: the linked one, or the implicit user the
    /// session maps to on the unauthenticated startup path.
    async fn resolve_award_user(
        &self,
        token: &PreauthToken,
        client: &ClientInfo,
    ) -> CoreResult<Uuid> {
        if let Some(user_id) = token.user_id {
            return Ok(user_id);
        }
        if let Some(session_id) = &client.session_id {
            if let Some(user) = self.identity.user_by_session(session_id).await? {
                return Ok(user.user_id);
            }
        }
        Err(Conflict::UnauthenticatedPrize.into())
    }
}

fn already_taken_response(prize: String, preauth_token: Option<String>) -> TakePrizeResponse {
    TakePrizeResponse {
        success: true,
        prize,
        message: "Prize already taken".to_owned(),
        preauth_token,
    }
}

fn spin_result_json(selected: &PrizeValue) -> serde_json::Value {
    let mut result = serde_json::json!({
        "prize_value_id": selected.id,
        "prize_value": selected.value,
        "prize_label": selected.label,
    });
    if let Some(segment_id) = &selected.segment_id {
        result["segment_id"] = serde_json::Value::String(segment_id.clone());
    }
    result
}

fn build_spin_response(selected: &PrizeValue, max_spins: i32, spin_number: i32) -> SpinResponse {
    SpinResponse {
        result: SpinResult {
            segment_id: selected
                .segment_id
                .clone()
                .unwrap_or_else(|| "1".to_owned()),
            label: selected.label.clone(),
        },
        spins_left: (max_spins - spin_number).max(0),
        reward: build_reward(selected),
    }
}

/// ETH-labelled prizes report their amount in ETH (`value / 10^9`), plain
/// point prizes report USDT one-to-one.
fn build_reward(selected: &PrizeValue) -> SpinReward {
    if is_eth_label(&selected.label) {
        SpinReward {
            reward_type: "eth".to_owned(),
            amount: points_to_eth(selected.value),
        }
    } else {
        SpinReward {
            reward_type: "usdt".to_owned(),
            amount: selected.value as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(id: i32, points: i64, label: &str, segment: Option<&str>) -> PrizeValue {
        PrizeValue {
            id,
            event_id: "startup".into(),
            value: points,
            label: label.into(),
            segment_id: segment.map(|s| s.to_owned()),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn eth_prizes_report_eth_amounts() {
        let reward = build_reward(&value(7, 10_000_000, "0.01 ETH", Some("1")));
        assert_eq!(reward.reward_type, "eth");
        assert!((reward.amount - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn point_prizes_report_usdt_amounts() {
        let reward = build_reward(&value(7, 100, "100", None));
        assert_eq!(reward.reward_type, "usdt");
        assert_eq!(reward.amount, 100.0);
    }

    #[test]
    fn spins_left_counts_down_and_floors_at_zero() {
        let pv = value(7, 100, "100", Some("2"));
        assert_eq!(build_spin_response(&pv, 3, 1).spins_left, 2);
        assert_eq!(build_spin_response(&pv, 3, 2).spins_left, 1);
        assert_eq!(build_spin_response(&pv, 3, 3).spins_left, 0);
        assert_eq!(build_spin_response(&pv, 3, 4).spins_left, 0);
    }

    #[test]
    fn spin_response_carries_segment_and_label() {
        let response = build_spin_response(&value(7, 10_000_000, "0.01 ETH", Some("3")), 3, 3);
        assert_eq!(response.result.segment_id, "3");
        assert_eq!(response.result.label, "0.01 ETH");
    }

    #[test]
    fn missing_segment_defaults_to_first() {
        let response = build_spin_response(&value(7, 100, "100", None), 3, 1);
        assert_eq!(response.result.segment_id, "1");
    }

    #[test]
    fn spin_result_json_shape() {
        let json = spin_result_json(&value(7, 10_000_000, "0.01 ETH", Some("1")));
        assert_eq!(json["prize_value_id"], 7);
        assert_eq!(json["prize_value"], 10_000_000);
        assert_eq!(json["prize_label"], "0.01 ETH");
        assert_eq!(json["segment_id"], "1");

        let json = spin_result_json(&value(8, 100, "100", None));
        assert!(json.get("segment_id").is_none());
    }
}
