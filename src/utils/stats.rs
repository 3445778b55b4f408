use crate::database::models::{DailyStat, UserRecord};
use crate::database::queries;
use crate::utils::time::last_n_days;
use anyhow::Result;
use chrono::{Days, NaiveDate};
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkOverview {
    pub total_guilds: i64,
    pub total_users: i64,
    pub loyal_users: i64,
    pub active_loyal_users: i64,
    pub blacklisted_users: i64,
    pub trusted_users: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityStats {
    pub total_loyal: i64,
    pub active_today: i64,
    pub activity_percentage: i64,
    pub average_messages: i64,
    pub average_streak: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub joins: i64,
    pub leaves: i64,
    pub net: i64,
}

pub async fn network_overview(pool: &SqlitePool) -> Result<NetworkOverview> {
    Ok(NetworkOverview {
        total_guilds: queries::count_guilds(pool).await?,
        total_users: queries::count_users(pool).await?,
        loyal_users: queries::count_loyal_users(pool).await?,
        active_loyal_users: queries::count_active_loyal_users(pool).await?,
        blacklisted_users: queries::count_blacklist(pool).await?,
        trusted_users: queries::list_trusted_users(pool).await?.len() as i64,
    })
}

/// Averages over loyal users only; integer division like the rest of the counters.
pub fn activity_stats(users: &[UserRecord], today: NaiveDate) -> ActivityStats {
    let loyal: Vec<&UserRecord> = users.iter().filter(|user| user.is_loyal).collect();
    let total = loyal.len() as i64;
    if total == 0 {
        return ActivityStats::default();
    }

    let active_today = loyal
        .iter()
        .filter(|user| user.last_activity == Some(today))
        .count() as i64;
    let messages: i64 = loyal.iter().map(|user| user.total_messages).sum();
    let streaks: i64 = loyal.iter().map(|user| user.streak).sum();

    ActivityStats {
        total_loyal: total,
        active_today,
        activity_percentage: active_today * 100 / total,
        average_messages: messages / total,
        average_streak: streaks / total,
    }
}

/// One point per day for the `days` days ending today, zero-filled where nothing was recorded.
pub fn network_trends(stats: &[DailyStat], today: NaiveDate, days: u64) -> Vec<TrendPoint> {
    let by_date: HashMap<NaiveDate, &DailyStat> =
        stats.iter().map(|stat| (stat.date, stat)).collect();

    last_n_days(today, days)
        .into_iter()
        .map(|date| {
            let (joins, leaves) = by_date
                .get(&date)
                .map(|stat| (stat.joins, stat.leaves))
                .unwrap_or((0, 0));
            TrendPoint {
                date,
                joins,
                leaves,
                net: joins - leaves,
            }
        })
        .collect()
}

pub async fn load_network_trends(
    pool: &SqlitePool,
    today: NaiveDate,
    days: u64,
) -> Result<Vec<TrendPoint>> {
    let since = today
        .checked_sub_days(Days::new(days.saturating_sub(1)))
        .unwrap_or(today);
    let stats = queries::get_daily_stats_since(pool, since).await?;
    Ok(network_trends(&stats, today, days))
}

/// Writes today's loyal/active counts.
pub async fn record_snapshot(pool: &SqlitePool, today: NaiveDate) -> Result<()> {
    let loyal = queries::count_loyal_users(pool).await?;
    let active = queries::count_active_loyal_users(pool).await?;
    queries::record_activity_snapshot(pool, today, loyal, active).await?;
    tracing::info!("Recorded activity snapshot: {} loyal, {} active", loyal, active);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn user(user_id: i64, loyal: bool, messages: i64, streak: i64, last: u32) -> UserRecord {
        let mut user = UserRecord::new(user_id);
        user.is_loyal = loyal;
        user.total_messages = messages;
        user.streak = streak;
        user.last_activity = Some(day(last));
        user
    }

    #[test]
    fn activity_averages_cover_loyal_users_only() {
        let users = vec![
            user(1, true, 300, 3, 10),
            user(2, true, 100, 1, 9),
            user(3, false, 10_000, 0, 10),
        ];

        let stats = activity_stats(&users, day(10));

        assert_eq!(
            stats,
            ActivityStats {
                total_loyal: 2,
                active_today: 1,
                activity_percentage: 50,
                average_messages: 200,
                average_streak: 2,
            }
        );
    }

    #[test]
    fn no_loyal_users_yields_zeroes() {
        assert_eq!(activity_stats(&[], day(10)), ActivityStats::default());
    }

    #[test]
    fn trends_fill_missing_days() {
        let stats = vec![
            DailyStat { date: day(8), joins: 3, leaves: 1 },
            DailyStat { date: day(10), joins: 0, leaves: 2 },
        ];

        let trend = network_trends(&stats, day(10), 3);

        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0], TrendPoint { date: day(8), joins: 3, leaves: 1, net: 2 });
        assert_eq!(trend[1], TrendPoint { date: day(9), joins: 0, leaves: 0, net: 0 });
        assert_eq!(trend[2].net, -2);
    }

    #[tokio::test]
    async fn overview_counts_every_table() {
        let pool = test_pool().await;
        queries::get_or_create_guild(&pool, 10, "Gateway", false, "$").await.unwrap();
        queries::save_user(&pool, &user(1, true, 1, 0, 1)).await.unwrap();
        queries::save_user(&pool, &user(2, false, 1, 0, 1)).await.unwrap();
        queries::add_to_blacklist(&pool, 3, None).await.unwrap();
        queries::add_trusted_user(&pool, 4).await.unwrap();

        let overview = network_overview(&pool).await.unwrap();

        assert_eq!(
            overview,
            NetworkOverview {
                total_guilds: 1,
                total_users: 2,
                loyal_users: 1,
                active_loyal_users: 1,
                blacklisted_users: 1,
                trusted_users: 1,
            }
        );
    }
}
