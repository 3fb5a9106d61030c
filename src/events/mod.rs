use crate::achievements::AchievementEngine;
use crate::clock::Clock;
use crate::error::{Conflict, CoreError, CoreResult};
use crate::ledger::LedgerEngine;
use crate::storage::persistent::{get_conn, with_retries, DbPool};
use crate::storage::{events as event_store, prizes as prize_store};
use crate::types::event::{
    Event, EventLeader, EventProgress, NewUserEvent, UserEventEntry, TAG_COMPETITION,
};
use crate::types::prize::{NewPrize, Prize, PrizeType, PrizeValue};
use crate::types::rating::BetPointsEntry;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakePartOutcome {
    Created,
    AlreadyExists,
}

impl TakePartOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TakePartOutcome::Created => "created",
            TakePartOutcome::AlreadyExists => "already_exists",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrizeStatusOutcome {
    Updated,
    AlreadyDefined,
}

impl PrizeStatusOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrizeStatusOutcome::Updated => "updated",
            PrizeStatusOutcome::AlreadyDefined => "already_defined",
        }
    }
}

/// Competition events: participation, windowed progress, and the one-shot
/// prize assignment and take flow after the deadline.
pub struct EventEngine {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    ledger: Arc<LedgerEngine>,
    achievements: Arc<AchievementEngine>,
}

impl EventEngine {
    pub fn new(
        pool: DbPool,
        clock: Arc<dyn Clock>,
        ledger: Arc<LedgerEngine>,
        achievements: Arc<AchievementEngine>,
    ) -> Self {
        Self {
            pool,
            clock,
            ledger,
            achievements,
        }
    }

    pub async fn available_events(&self, tag: Option<&str>) -> CoreResult<Vec<Event>> {
        let mut conn = get_conn(&self.pool).await?;
        event_store::events_by_tag(&mut conn, tag).await
    }

    /// Competition events the user joined, plus the ones still open to join.
    pub async fn user_events(&self, user_id: Uuid) -> CoreResult<Vec<UserEventEntry>> {
        let now = self.clock.now_ms();
        let mut conn = get_conn(&self.pool).await?;
        let events = event_store::events_by_tag(&mut conn, Some(TAG_COMPETITION)).await?;
        let joined = event_store::user_events_for_user(&mut conn, user_id).await?;

        let mut entries = Vec::new();
        for event in events {
            let row = joined.iter().find(|ue| ue.event_id == event.id);
            if row.is_none() && event.deadline <= now {
                continue;
            }
            entries.push(UserEventEntry {
                status: row
                    .map(|ue| ue.status.clone())
                    .unwrap_or_else(|| "available".to_owned()),
                has_prise_status: row.and_then(|ue| ue.has_prise_status),
                prize_taken_status: row.map(|ue| ue.prize_taken_status).unwrap_or(false),
                event,
            });
        }
        Ok(entries)
    }

    pub async fn take_part(&self, user_id: Uuid, event_id: &str) -> CoreResult<TakePartOutcome> {
        let mut conn = get_conn(&self.pool).await?;
        event_store::event_by_id(&mut conn, event_id)
            .await?
            .ok_or_else(|| CoreError::not_found("event not found"))?;
        let created = event_store::insert_user_event_if_absent(
            &mut conn,
            &NewUserEvent {
                user_id,
                event_id: event_id.to_owned(),
                status: "joined".to_owned(),
                prize_taken_status: false,
                updated_at: self.clock.now_ms(),
            },
        )
        .await?;
        Ok(if created {
            TakePartOutcome::Created
        } else {
            TakePartOutcome::AlreadyExists
        })
    }

    /// Points collected inside the competition window so far.
    pub async fn progress(&self, user_id: Uuid, event_id: &str) -> CoreResult<EventProgress> {
        let mut conn = get_conn(&self.pool).await?;
        let event = self.competition_event(&mut conn, event_id).await?;
        if self.clock.now_ms() < event.start_time {
            return Err(Conflict::NotReady.into());
        }

        let participating = event_store::user_event(&mut conn, user_id, event_id)
            .await?
            .is_some();
        drop(conn);
        if !participating {
            return Ok(EventProgress {
                event_id: event_id.to_owned(),
                participating: false,
                collected_points: 0,
            });
        }
        let collected_points = self
            .ledger
            .bet_points_in_range(user_id, event.start_time, event.deadline)
            .await?;
        Ok(EventProgress {
            event_id: event_id.to_owned(),
            participating: true,
            collected_points,
        })
    }

    /// Current leader of an active competition. The image comes from the
    /// achievement bound to the top prize value.
    pub async fn best_in_event(&self, event_id: &str) -> CoreResult<EventLeader> {
        let mut conn = get_conn(&self.pool).await?;
        let event = self.competition_event(&mut conn, event_id).await?;
        if !event.is_active(self.clock.now_ms()) {
            return Err(Conflict::NotReady.into());
        }

        let leaders = self
            .ledger
            .bet_points_leaderboard(event.start_time, event.deadline, 1)
            .await?;
        let Some(leader) = leaders.first() else {
            return Ok(EventLeader {
                leader_image: String::new(),
                points: 0,
            });
        };

        let mut values = prize_store::values_by_event(&mut conn, event_id).await?;
        if values.is_empty() {
            return Err(Conflict::NoPrizes.into());
        }
        sort_by_value_desc(&mut values);
        drop(conn);

        let leader_image = self
            .achievements
            .placement_image_by_prize_value(values[0].id)
            .await?
            .unwrap_or_default();
        Ok(EventLeader {
            leader_image,
            points: leader.net_points,
        })
    }

    /// Resolves whether the user placed in the top K = |prize_values| after
    /// the deadline, and which prize the placement carries. The guard on the
    /// unresolved tri-state makes this a once-only transition.
    pub async fn update_prize_status(
        &self,
        user_id: Uuid,
        event_id: &str,
    ) -> CoreResult<PrizeStatusOutcome> {
        let mut conn = get_conn(&self.pool).await?;
        let event = event_store::event_by_id(&mut conn, event_id)
            .await?
            .ok_or_else(|| CoreError::not_found("event not found"))?;
        if self.clock.now_ms() < event.deadline {
            return Err(Conflict::NotReady.into());
        }

        let row = event_store::user_event(&mut conn, user_id, event_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user is not participating in event"))?;
        if row.has_prise_status.is_some() {
            return Ok(PrizeStatusOutcome::AlreadyDefined);
        }

        let mut values = prize_store::values_by_event(&mut conn, event_id).await?;
        sort_by_value_desc(&mut values);
        let leaderboard = self
            .ledger
            .bet_points_leaderboard(event.start_time, event.deadline, values.len() as i64)
            .await?;
        let (has_prize, prize_value_id) = placement(user_id, &leaderboard, &values);

        let updated = event_store::set_prize_status_if_unresolved(
            &mut conn,
            user_id,
            event_id,
            has_prize,
            prize_value_id,
            self.clock.now_ms(),
        )
        .await?;
        Ok(if updated {
            PrizeStatusOutcome::Updated
        } else {
            PrizeStatusOutcome::AlreadyDefined
        })
    }

    /// Mints the placement prize exactly once; the `prize_taken_status`
    /// guard aborts the transaction when a concurrent taker wins. The
    /// placement achievement is claimed afterwards.
    pub async fn take_event_prize(
        &self,
        user_id: Uuid,
        event_id: &str,
    ) -> CoreResult<(Prize, Option<String>)> {
        let mut conn = get_conn(&self.pool).await?;
        let row = event_store::user_event(&mut conn, user_id, event_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user is not participating in event"))?;
        let prize_value_id = row
            .prize_value_id
            .filter(|_| row.has_prise_status == Some(true))
            .ok_or(Conflict::NotReady)?;
        if row.prize_taken_status {
            return Err(Conflict::AlreadyTaken.into());
        }
        let prize_value = prize_store::value_by_id(&mut conn, prize_value_id)
            .await?
            .ok_or_else(|| CoreError::not_found("prize value not found"))?;
        drop(conn);

        let prize_label = if prize_value.label.is_empty() {
            prize_value.value.to_string()
        } else {
            prize_value.label.clone()
        };

        let now = self.clock.now_ms();
        let event_id_owned = event_id.to_owned();
        let prize = with_retries(|| {
            let pool = self.pool.clone();
            let event_id = event_id_owned.clone();
            let prize_label = prize_label.clone();
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        let prize = prize_store::insert_prize(
                            conn,
                            &NewPrize {
                                event_id: Some(event_id.clone()),
                                user_id,
                                prize_value_id: Some(prize_value_id),
                                preauth_token_id: None,
                                roulette_id: None,
                                prize_value: prize_label,
                                prize_type: PrizeType::EventReward.as_str().to_owned(),
                                awarded_at: now,
                                created_at: now,
                            },
                        )
                        .await?;
                        let taken =
                            event_store::mark_prize_taken(conn, user_id, &event_id, now).await?;
                        if !taken {
                            return Err(Conflict::AlreadyTaken.into());
                        }
                        Ok(prize)
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await?;

        let image_url = self
            .achievements
            .claim_placement_by_prize_value(user_id, prize_value_id)
            .await?;
        Ok((prize, image_url))
    }

    async fn competition_event(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        event_id: &str,
    ) -> CoreResult<Event> {
        let event = event_store::event_by_id(conn, event_id)
            .await?
            .ok_or_else(|| CoreError::not_found("event not found"))?;
        if !event.has_tag(TAG_COMPETITION) {
            return Err(CoreError::bad_request("event is not a competition"));
        }
        Ok(event)
    }
}

fn sort_by_value_desc(values: &mut [PrizeValue]) {
    values.sort_by(|a, b| b.value.cmp(&a.value));
}

/// Position within the ranked window decides the prize: the leaderboard is
/// already capped at K = |prize_values|, and place `i` (0-based) maps to the
/// i-th prize value sorted by value descending.
fn placement(
    user_id: Uuid,
    leaderboard: &[BetPointsEntry],
    values_desc: &[PrizeValue],
) -> (bool, Option<i32>) {
    match leaderboard.iter().position(|entry| entry.user_id == user_id) {
        Some(index) => (true, values_desc.get(index).map(|value| value.id)),
        None => (false, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(id: i32, points: i64) -> PrizeValue {
        PrizeValue {
            id,
            event_id: "e".into(),
            value: points,
            label: format!("{points} points"),
            segment_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn entry(user_id: Uuid, net_points: i64) -> BetPointsEntry {
        BetPointsEntry {
            user_id,
            net_points,
        }
    }

    #[test]
    fn placement_maps_rank_to_descending_prize() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let board = vec![entry(first, 40), entry(second, 20), entry(third, 20)];
        let mut values = vec![value(1, 100), value(2, 500), value(3, 50)];
        sort_by_value_desc(&mut values);

        assert_eq!(placement(first, &board, &values), (true, Some(2)));
        assert_eq!(placement(second, &board, &values), (true, Some(1)));
        assert_eq!(placement(third, &board, &values), (true, Some(3)));
    }

    #[test]
    fn placement_outside_window_gets_nothing() {
        let winner = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let board = vec![entry(winner, 40)];
        let values = vec![value(1, 100)];
        assert_eq!(placement(outsider, &board, &values), (false, None));
    }

    #[test]
    fn placement_beyond_prize_pool_has_no_value() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let board = vec![entry(first, 40), entry(second, 20)];
        let values = vec![value(1, 100)];
        assert_eq!(placement(second, &board, &values), (true, None));
    }

    #[test]
    fn prize_values_sort_descending() {
        let mut values = vec![value(7, 1_000_000), value(8, 5_000_000), value(9, 10_000)];
        sort_by_value_desc(&mut values);
        let ids: Vec<i32> = values.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![8, 7, 9]);
    }
}
