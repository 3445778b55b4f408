use crate::database::models::UserRecord;
use crate::database::queries;
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;

/// Where and when a tracked message was sent.
#[derive(Debug, Clone)]
pub struct MessageActivity {
    pub guild_id: i64,
    pub guild_name: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityOutcome {
    pub streak_gained: bool,
    pub reactivated: bool,
}

/// Counts one message towards the user's totals and, while loyal, towards the next streak day.
pub fn apply_message(
    user: &mut UserRecord,
    activity: &MessageActivity,
    streak_threshold: i64,
) -> ActivityOutcome {
    let mut outcome = ActivityOutcome::default();

    user.last_activity = Some(activity.date);
    user.total_messages += 1;
    user.messages_since_last_streak += 1;

    if user.is_inactive {
        user.is_inactive = false;
        outcome.reactivated = true;
    }

    if user.main_guild_id != Some(activity.guild_id) {
        user.main_guild_id = Some(activity.guild_id);
        user.main_guild_name = activity.guild_name.clone();
    }

    if user.is_loyal && user.messages_since_last_streak >= streak_threshold {
        user.streak += 1;
        user.messages_since_last_streak = 0;
        outcome.streak_gained = true;
    }

    outcome
}

/// Marks the user as having opted in at `guild_id`. Returns `false` if they already were loyal.
pub fn apply_opt_in(
    user: &mut UserRecord,
    guild_id: i64,
    guild_name: &str,
    date: NaiveDate,
) -> bool {
    if user.is_loyal {
        return false;
    }

    user.is_loyal = true;
    user.is_inactive = false;
    user.opt_in_date = Some(date);
    user.last_activity = Some(date);
    user.origin_guild_id = Some(guild_id);
    user.origin_guild_name = Some(guild_name.to_string());
    user.main_guild_id = Some(guild_id);
    user.main_guild_name = Some(guild_name.to_string());
    user.streak = 0;
    user.messages_since_last_streak = 0;
    true
}

/// Returns `false` if the user was not loyal to begin with.
pub fn apply_leave(user: &mut UserRecord) -> bool {
    if !user.is_loyal {
        return false;
    }

    user.is_loyal = false;
    user.streak = 0;
    user.messages_since_last_streak = 0;
    true
}

pub struct ActivityTracker {
    pool: SqlitePool,
    streak_threshold: i64,
}

impl ActivityTracker {
    pub fn new(pool: SqlitePool, streak_threshold: i64) -> Self {
        Self {
            pool,
            streak_threshold,
        }
    }

    pub async fn record_message(
        &self,
        user_id: i64,
        activity: &MessageActivity,
    ) -> Result<(UserRecord, ActivityOutcome)> {
        let mut user = queries::get_or_create_user(&self.pool, user_id).await?;
        let outcome = apply_message(&mut user, activity, self.streak_threshold);
        queries::save_user(&self.pool, &user).await?;

        if outcome.streak_gained {
            tracing::info!("User {} reached streak {}", user_id, user.streak);
        }
        Ok((user, outcome))
    }

    /// Opts the user in and counts the join. Returns `None` when they were already loyal.
    pub async fn opt_in(
        &self,
        user_id: i64,
        guild_id: i64,
        guild_name: &str,
        date: NaiveDate,
    ) -> Result<Option<UserRecord>> {
        let mut user = queries::get_or_create_user(&self.pool, user_id).await?;
        if !apply_opt_in(&mut user, guild_id, guild_name, date) {
            return Ok(None);
        }

        queries::save_user(&self.pool, &user).await?;
        queries::increment_daily_joins(&self.pool, date).await?;
        tracing::info!("User {} joined the network from guild {}", user_id, guild_id);
        Ok(Some(user))
    }

    pub async fn leave(&self, user_id: i64, date: NaiveDate) -> Result<bool> {
        let mut user = queries::get_or_create_user(&self.pool, user_id).await?;
        if !apply_leave(&mut user) {
            return Ok(false);
        }

        queries::save_user(&self.pool, &user).await?;
        queries::increment_daily_leaves(&self.pool, date).await?;
        tracing::info!("User {} left the network", user_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    fn activity(guild_id: i64) -> MessageActivity {
        MessageActivity {
            guild_id,
            guild_name: Some(format!("guild-{}", guild_id)),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    fn loyal_user() -> UserRecord {
        let mut user = UserRecord::new(1);
        apply_opt_in(&mut user, 10, "guild-10", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        user
    }

    #[test]
    fn hundred_messages_while_loyal_earn_one_streak_day() {
        let mut user = loyal_user();
        let gained = (0..100)
            .filter(|_| apply_message(&mut user, &activity(10), 100).streak_gained)
            .count();

        assert_eq!(gained, 1);
        assert_eq!(user.streak, 1);
        assert_eq!(user.messages_since_last_streak, 0);
        assert_eq!(user.total_messages, 100);
    }

    #[test]
    fn ninety_nine_messages_are_not_enough() {
        let mut user = loyal_user();
        for _ in 0..99 {
            apply_message(&mut user, &activity(10), 100);
        }

        assert_eq!(user.streak, 0);
        assert_eq!(user.messages_since_last_streak, 99);
    }

    #[test]
    fn non_loyal_users_never_accrue_streak() {
        let mut user = UserRecord::new(2);
        for _ in 0..350 {
            assert!(!apply_message(&mut user, &activity(10), 100).streak_gained);
        }

        assert_eq!(user.streak, 0);
        assert_eq!(user.total_messages, 350);
    }

    #[test]
    fn message_reactivates_and_moves_main_guild() {
        let mut user = loyal_user();
        user.is_inactive = true;

        let outcome = apply_message(&mut user, &activity(20), 100);

        assert!(outcome.reactivated);
        assert!(!user.is_inactive);
        assert_eq!(user.main_guild_id, Some(20));
        assert_eq!(user.main_guild_name.as_deref(), Some("guild-20"));
        assert_eq!(user.origin_guild_id, Some(10));
        assert_eq!(user.last_activity, Some(activity(20).date));
    }

    #[test]
    fn opt_in_resets_counters_once() {
        let mut user = UserRecord::new(3);
        user.streak = 4;
        user.messages_since_last_streak = 60;
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert!(apply_opt_in(&mut user, 10, "Gateway", date));
        assert_eq!(user.streak, 0);
        assert_eq!(user.messages_since_last_streak, 0);
        assert_eq!(user.opt_in_date, Some(date));

        user.streak = 2;
        assert!(!apply_opt_in(&mut user, 20, "Other", date));
        assert_eq!(user.streak, 2);
        assert_eq!(user.origin_guild_id, Some(10));
    }

    #[test]
    fn leaving_clears_streak() {
        let mut user = loyal_user();
        user.streak = 5;

        assert!(apply_leave(&mut user));
        assert!(!user.is_loyal);
        assert_eq!(user.streak, 0);
        assert!(!apply_leave(&mut user));
    }

    #[tokio::test]
    async fn tracker_persists_streak_after_opt_in() {
        let pool = test_pool().await;
        let tracker = ActivityTracker::new(pool.clone(), 100);
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert!(tracker.opt_in(5, 10, "Gateway", date).await.unwrap().is_some());
        assert!(tracker.opt_in(5, 10, "Gateway", date).await.unwrap().is_none());

        for _ in 0..100 {
            tracker.record_message(5, &activity(10)).await.unwrap();
        }

        let stored = queries::get_user(&pool, 5).await.unwrap().unwrap();
        assert_eq!(stored.streak, 1);
        assert_eq!(stored.messages_since_last_streak, 0);

        let stats = queries::get_daily_stats_since(&pool, date).await.unwrap();
        assert_eq!(stats[0].joins, 1);
    }
}
