use crate::database::models::UserRecord;
use crate::database::queries;
use crate::utils::time::days_between;
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;

/// A loyal, still-active user whose last activity is at least `threshold_days` old.
/// Users with no recorded activity are never swept.
pub fn is_due(user: &UserRecord, today: NaiveDate, threshold_days: i64) -> bool {
    if !user.is_active_loyal() {
        return false;
    }

    user.last_activity
        .map(|last| days_between(last, today) >= threshold_days)
        .unwrap_or(false)
}

pub struct InactivitySweep {
    pool: SqlitePool,
    threshold_days: i64,
}

impl InactivitySweep {
    pub fn new(pool: SqlitePool, threshold_days: i64) -> Self {
        Self {
            pool,
            threshold_days,
        }
    }

    /// Marks every due user inactive and returns only the users marked by this run, so the
    /// caller notifies each of them once.
    pub async fn run(&self, today: NaiveDate) -> Result<Vec<UserRecord>> {
        let mut marked = Vec::new();

        for mut user in queries::list_loyal_users(&self.pool).await? {
            if !is_due(&user, today, self.threshold_days) {
                continue;
            }

            user.is_inactive = true;
            queries::save_user(&self.pool, &user).await?;
            tracing::info!(
                "Marked user {} as inactive (last active {:?})",
                user.user_id,
                user.last_activity
            );
            marked.push(user);
        }

        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn loyal(user_id: i64, last_active: u32) -> UserRecord {
        let mut user = UserRecord::new(user_id);
        user.is_loyal = true;
        user.last_activity = Some(day(last_active));
        user
    }

    #[test]
    fn due_only_after_threshold() {
        assert!(!is_due(&loyal(1, 10), day(16), 7));
        assert!(is_due(&loyal(1, 10), day(17), 7));
    }

    #[test]
    fn ignores_non_loyal_and_never_active() {
        let mut user = loyal(1, 1);
        user.is_loyal = false;
        assert!(!is_due(&user, day(30), 7));

        let mut silent = loyal(2, 1);
        silent.last_activity = None;
        assert!(!is_due(&silent, day(30), 7));
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let pool = test_pool().await;
        queries::save_user(&pool, &loyal(1, 1)).await.unwrap();
        queries::save_user(&pool, &loyal(2, 20)).await.unwrap();

        let sweep = InactivitySweep::new(pool.clone(), 7);

        let first = sweep.run(day(21)).await.unwrap();
        assert_eq!(first.iter().map(|u| u.user_id).collect::<Vec<_>>(), vec![1]);

        let second = sweep.run(day(21)).await.unwrap();
        assert!(second.is_empty());

        let stored = queries::get_user(&pool, 1).await.unwrap().unwrap();
        assert!(stored.is_inactive);
        assert!(stored.is_loyal);
        assert_eq!(queries::count_active_loyal_users(&pool).await.unwrap(), 1);
    }
}
