use crate::clock::Clock;
use crate::error::{Conflict, CoreError, CoreResult};
use crate::storage::persistent::{get_conn, with_retries, DbPool};
use crate::storage::{
    achievements as achievement_store, bets as bet_store, prizes as prize_store,
    rating as rating_store,
};
use crate::types::achievement::{
    Achievement, AchievementProgress, NewUserAchievement, UserAchievement, TAG_EVENT,
};
use crate::types::event::has_tag;
use crate::types::prize::{NewPrize, Prize, PrizeType};
use crate::types::rating::NewRatingEntry;
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;
use std::sync::Arc;
use uuid::Uuid;

/// Win-counter achievements driven by settled bets, step by step.
pub const WIN_ACHIEVEMENT_IDS: [&str; 9] = [
    "first_bet_success",
    "wins_10",
    "wins_50",
    "wins_100",
    "wins_250",
    "wins_500",
    "wins_1000",
    "wins_5000",
    "wins_10000",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Created,
    AlreadyExists,
    NotCompleted,
}

impl UpdateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOutcome::Created => "created",
            UpdateOutcome::AlreadyExists => "already_exists",
            UpdateOutcome::NotCompleted => "not_completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progression {
    Create { steps_got: i32 },
    Bump { steps_got: i32 },
    Skip,
}

/// One more win applied to a progress row. `steps_got` never decreases and
/// never exceeds `need_steps`; claimed rows are frozen.
fn next_progress(existing: Option<&UserAchievement>, need_steps: i32) -> Progression {
    match existing {
        None => Progression::Create {
            steps_got: 1.min(need_steps),
        },
        Some(row) if row.claimed_status => Progression::Skip,
        Some(row) => {
            let need = if row.need_steps > 0 {
                row.need_steps
            } else {
                need_steps
            };
            if row.steps_got >= need {
                Progression::Skip
            } else {
                Progression::Bump {
                    steps_got: (row.steps_got + 1).min(need),
                }
            }
        }
    }
}

pub struct AchievementEngine {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl AchievementEngine {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn available(&self) -> CoreResult<Vec<Achievement>> {
        let mut conn = get_conn(&self.pool).await?;
        achievement_store::all_achievements(&mut conn).await
    }

    /// The caller's progress over the catalog, excluding event-placement
    /// achievements (those surface through the event flow).
    pub async fn user_achievements(&self, user_id: Uuid) -> CoreResult<Vec<AchievementProgress>> {
        let mut conn = get_conn(&self.pool).await?;
        let catalog = achievement_store::all_achievements(&mut conn).await?;
        let progress = achievement_store::user_achievements_for_user(&mut conn, user_id).await?;
        let mut entries = Vec::new();
        for row in progress {
            let Some(achievement) = catalog.iter().find(|a| a.id == row.achievement_id) else {
                continue;
            };
            if has_tag(&achievement.tags, TAG_EVENT) {
                continue;
            }
            entries.push(AchievementProgress {
                achievement: achievement.clone(),
                steps_got: row.steps_got,
                need_steps: row.need_steps,
                claimed_status: row.claimed_status,
            });
        }
        Ok(entries)
    }

    pub async fn user_achievement(
        &self,
        user_id: Uuid,
        achievement_id: &str,
    ) -> CoreResult<AchievementProgress> {
        let mut conn = get_conn(&self.pool).await?;
        let achievement = achievement_store::achievement_by_id(&mut conn, achievement_id)
            .await?
            .filter(|a| !has_tag(&a.tags, TAG_EVENT))
            .ok_or_else(|| CoreError::not_found("achievement not found"))?;
        let row = achievement_store::user_achievement(&mut conn, user_id, achievement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user achievement not found"))?;
        Ok(AchievementProgress {
            achievement,
            steps_got: row.steps_got,
            need_steps: row.need_steps,
            claimed_status: row.claimed_status,
        })
    }

    /// Called once per claimed winning bet: bumps every win-counter
    /// achievement and reports the ones created by this call, for
    /// notifications.
    pub async fn on_win(&self, user_id: Uuid) -> CoreResult<Vec<String>> {
        let now = self.clock.now_ms();
        with_retries(|| {
            let pool = self.pool.clone();
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        let mut created = Vec::new();
                        for achievement_id in WIN_ACHIEVEMENT_IDS {
                            let Some(achievement) =
                                achievement_store::achievement_by_id(conn, achievement_id).await?
                            else {
                                continue;
                            };
                            let existing = achievement_store::user_achievement_for_update(
                                conn,
                                user_id,
                                achievement_id,
                            )
                            .await?;
                            match next_progress(existing.as_ref(), achievement.steps) {
                                Progression::Create { steps_got } => {
                                    achievement_store::upsert_progress(
                                        conn,
                                        user_id,
                                        achievement_id,
                                        steps_got,
                                        achievement.steps,
                                        false,
                                        now,
                                    )
                                    .await?;
                                    created.push(achievement_id.to_owned());
                                }
                                Progression::Bump { steps_got } => {
                                    let need = existing
                                        .as_ref()
                                        .map(|row| row.need_steps)
                                        .filter(|need| *need > 0)
                                        .unwrap_or(achievement.steps);
                                    achievement_store::upsert_progress(
                                        conn,
                                        user_id,
                                        achievement_id,
                                        steps_got,
                                        need,
                                        false,
                                        now,
                                    )
                                    .await?;
                                }
                                Progression::Skip => {}
                            }
                        }
                        Ok(created)
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await
    }

    /// Recomputes whether the criterion holds right now and records a
    /// completed row if so. Idempotent.
    pub async fn update_status(
        &self,
        user_id: Uuid,
        achievement_id: &str,
    ) -> CoreResult<UpdateOutcome> {
        if !WIN_ACHIEVEMENT_IDS.contains(&achievement_id) {
            return Err(CoreError::bad_request("unsupported achievement id"));
        }
        let mut conn = get_conn(&self.pool).await?;
        let achievement = achievement_store::achievement_by_id(&mut conn, achievement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("achievement not found"))?;
        let need_steps = achievement.steps.max(1);

        let completed = if achievement_id == "first_bet_success" {
            bet_store::has_winning_bet(&mut conn, user_id).await?
        } else {
            bet_store::count_winning_bets(&mut conn, user_id).await? >= need_steps as i64
        };
        if !completed {
            return Ok(UpdateOutcome::NotCompleted);
        }

        let created = achievement_store::insert_if_absent(
            &mut conn,
            &NewUserAchievement {
                user_id,
                achievement_id: achievement_id.to_owned(),
                steps_got: need_steps,
                need_steps,
                claimed_status: false,
                updated_at: self.clock.now_ms(),
            },
        )
        .await?;
        Ok(if created {
            UpdateOutcome::Created
        } else {
            UpdateOutcome::AlreadyExists
        })
    }

    /// Mints the achievement prize and credits the ledger, flipping
    /// `claimed_status` exactly once; all three writes commit together.
    pub async fn claim(&self, user_id: Uuid, achievement_id: &str) -> CoreResult<Prize> {
        let mut conn = get_conn(&self.pool).await?;
        let achievement = achievement_store::achievement_by_id(&mut conn, achievement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("achievement not found"))?;
        let status = achievement_store::user_achievement(&mut conn, user_id, achievement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user achievement not found"))?;
        if status.claimed_status {
            return Err(Conflict::AlreadyClaimed.into());
        }

        let mut need_steps = status.need_steps;
        if need_steps <= 0 {
            need_steps = achievement.steps;
            if need_steps > 0 {
                achievement_store::set_need_steps(
                    &mut conn,
                    user_id,
                    achievement_id,
                    need_steps,
                    self.clock.now_ms(),
                )
                .await?;
            }
        }
        if status.steps_got < need_steps {
            return Err(Conflict::NotReady.into());
        }

        let prize_value_id = achievement
            .prize_id
            .ok_or_else(|| CoreError::not_found("achievement has no prize"))?;
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
        let achievement_id = achievement_id.to_owned();
        with_retries(|| {
            let pool = self.pool.clone();
            let achievement_id = achievement_id.clone();
            let prize_label = prize_label.clone();
            let event_id = prize_value.event_id.clone();
            let points = prize_value.value;
            async move {
                let mut conn = get_conn(&pool).await?;
                conn.transaction::<_, CoreError, _>(|conn| {
                    async move {
                        let prize = prize_store::insert_prize(
                            conn,
                            &NewPrize {
                                event_id: Some(event_id),
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
                        if points != 0 {
                            rating_store::append(
                                conn,
                                &NewRatingEntry {
                                    user_id,
                                    points,
                                    got_prize_id: Some(prize.id),
                                    bet_id: None,
                                    description: format!(
                                        "Achievement {achievement_id}: {points} points"
                                    ),
                                    created_at: now,
                                },
                            )
                            .await?;
                        }
                        let claimed = achievement_store::mark_claimed(
                            conn,
                            user_id,
                            &achievement_id,
                            now,
                        )
                        .await?;
                        if !claimed {
                            return Err(Conflict::AlreadyClaimed.into());
                        }
                        Ok(prize)
                    }
                    .scope_boxed()
                })
                .await
            }
        })
        .await
    }

    /// The placement achievement bound to an event prize value, claimed in
    /// one step when the event prize is taken. Returns its image url.
    pub async fn claim_placement_by_prize_value(
        &self,
        user_id: Uuid,
        prize_value_id: i32,
    ) -> CoreResult<Option<String>> {
        let mut conn = get_conn(&self.pool).await?;
        let Some(achievement) =
            achievement_store::achievement_by_prize_value(&mut conn, prize_value_id).await?
        else {
            return Ok(None);
        };
        achievement_store::upsert_progress(
            &mut conn,
            user_id,
            &achievement.id,
            1,
            1,
            true,
            self.clock.now_ms(),
        )
        .await?;
        Ok(Some(achievement.image_url))
    }

    pub async fn placement_image_by_prize_value(
        &self,
        prize_value_id: i32,
    ) -> CoreResult<Option<String>> {
        let mut conn = get_conn(&self.pool).await?;
        Ok(
            achievement_store::achievement_by_prize_value(&mut conn, prize_value_id)
                .await?
                .map(|achievement| achievement.image_url),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(steps_got: i32, need_steps: i32, claimed: bool) -> UserAchievement {
        UserAchievement {
            id: 1,
            user_id: Uuid::nil(),
            achievement_id: "wins_10".into(),
            steps_got,
            need_steps,
            claimed_status: claimed,
            updated_at: 0,
        }
    }

    #[test]
    fn first_win_creates_with_one_step() {
        assert_eq!(
            next_progress(None, 10),
            Progression::Create { steps_got: 1 }
        );
    }

    #[test]
    fn single_step_achievement_completes_on_creation() {
        assert_eq!(next_progress(None, 1), Progression::Create { steps_got: 1 });
    }

    #[test]
    fn progress_bumps_until_full() {
        assert_eq!(
            next_progress(Some(&row(3, 10, false)), 10),
            Progression::Bump { steps_got: 4 }
        );
        assert_eq!(next_progress(Some(&row(10, 10, false)), 10), Progression::Skip);
    }

    #[test]
    fn claimed_rows_are_frozen() {
        assert_eq!(next_progress(Some(&row(10, 10, true)), 10), Progression::Skip);
    }

    #[test]
    fn bump_never_exceeds_need_steps() {
        // A row with a stale zero need falls back to the catalog value.
        assert_eq!(
            next_progress(Some(&row(0, 0, false)), 5),
            Progression::Bump { steps_got: 1 }
        );
        assert_eq!(
            next_progress(Some(&row(9, 10, false)), 10),
            Progression::Bump { steps_got: 10 }
        );
    }
}
