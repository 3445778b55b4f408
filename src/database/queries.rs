use crate::database::migrations::REQUIRED_TABLES;
use crate::database::models::{
    ActivitySnapshot, BlacklistEntry, DailyStat, GuildRecord, NetworkConfig, Table, UserRecord,
};
use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Executor, Sqlite, SqlitePool};

const GUILD_COLUMNS: &str = "guild_id, name, is_hub, prefix, announcement_channel_id, loyal_role_id, \
     creed_message_id, creed_channel_id, \
     dashboard_channel_id, dashboard_msg_id, leaderboard_size, backup_invite";

const USER_COLUMNS: &str = "user_id, is_loyal, is_inactive, streak, total_messages, \
     messages_since_last_streak, last_activity, opt_in_date, origin_guild_id, \
     origin_guild_name, main_guild_id, main_guild_name, is_muted";

// Network configuration

pub async fn seed_network_config(
    pool: &SqlitePool,
    seed: &NetworkConfig,
    owner_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO network_config
            (id, main_hub_id, main_hub_name, main_hub_invite, hub_ann_channel_id, system_active)
         VALUES (1, ?, ?, ?, ?, ?)",
    )
    .bind(seed.main_hub_id)
    .bind(&seed.main_hub_name)
    .bind(&seed.main_hub_invite)
    .bind(seed.hub_ann_channel_id)
    .bind(seed.system_active)
    .execute(pool)
    .await?;

    add_trusted_user(pool, owner_id).await?;
    Ok(())
}

pub async fn get_network_config(pool: &SqlitePool) -> Result<Option<NetworkConfig>> {
    let config = sqlx::query_as::<_, NetworkConfig>(
        "SELECT main_hub_id, main_hub_name, main_hub_invite, hub_ann_channel_id, system_active
         FROM network_config WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(config)
}

pub async fn is_system_active(pool: &SqlitePool) -> Result<bool> {
    Ok(get_network_config(pool)
        .await?
        .map(|config| config.system_active)
        .unwrap_or(true))
}

pub async fn set_system_active<'c, E>(executor: E, active: bool) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO network_config (id, system_active) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET
            system_active = excluded.system_active,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(active)
    .execute(executor)
    .await?;

    Ok(())
}

// Trusted users

pub async fn is_trusted(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trusted_users WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn list_trusted_users(pool: &SqlitePool) -> Result<Vec<i64>> {
    let users = sqlx::query_scalar("SELECT user_id FROM trusted_users ORDER BY created_at")
        .fetch_all(pool)
        .await?;

    Ok(users)
}

/// Returns `false` when the user was already trusted.
pub async fn add_trusted_user<'c, E>(executor: E, user_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("INSERT OR IGNORE INTO trusted_users (user_id) VALUES (?)")
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove_trusted_user(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM trusted_users WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Drops every trusted user except the owner. Returns how many were removed.
pub async fn reset_trusted_users(pool: &SqlitePool, owner_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM trusted_users WHERE user_id != ?")
        .bind(owner_id)
        .execute(pool)
        .await?;

    add_trusted_user(pool, owner_id).await?;
    Ok(result.rows_affected())
}

// Guilds

pub async fn get_guild<'c, E>(executor: E, guild_id: i64) -> Result<Option<GuildRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM guilds WHERE guild_id = ?", GUILD_COLUMNS);
    let guild = sqlx::query_as::<_, GuildRecord>(&sql)
        .bind(guild_id)
        .fetch_optional(executor)
        .await?;

    Ok(guild)
}

/// Inserts a guild row unless one exists; stored settings are left alone.
pub async fn insert_guild<'c, E>(
    executor: E,
    guild_id: i64,
    name: &str,
    is_hub: bool,
    default_prefix: &str,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("INSERT OR IGNORE INTO guilds (guild_id, name, is_hub, prefix) VALUES (?, ?, ?, ?)")
        .bind(guild_id)
        .bind(name)
        .bind(is_hub)
        .bind(default_prefix)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn get_or_create_guild(
    pool: &SqlitePool,
    guild_id: i64,
    name: &str,
    is_hub: bool,
    default_prefix: &str,
) -> Result<GuildRecord> {
    insert_guild(pool, guild_id, name, is_hub, default_prefix).await?;

    get_guild(pool, guild_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("guild {} vanished after insert", guild_id))
}

pub async fn list_guilds(pool: &SqlitePool) -> Result<Vec<GuildRecord>> {
    let sql = format!("SELECT {} FROM guilds ORDER BY guild_id", GUILD_COLUMNS);
    let guilds = sqlx::query_as::<_, GuildRecord>(&sql).fetch_all(pool).await?;

    Ok(guilds)
}

pub async fn count_guilds(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM guilds")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn update_guild_name(pool: &SqlitePool, guild_id: i64, name: &str) -> Result<()> {
    sqlx::query("UPDATE guilds SET name = ? WHERE guild_id = ?")
        .bind(name)
        .bind(guild_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_guild_prefix(pool: &SqlitePool, guild_id: i64) -> Result<Option<String>> {
    let prefix = sqlx::query_scalar("SELECT prefix FROM guilds WHERE guild_id = ?")
        .bind(guild_id)
        .fetch_optional(pool)
        .await?;

    Ok(prefix)
}

pub async fn set_guild_prefix(pool: &SqlitePool, guild_id: i64, prefix: &str) -> Result<()> {
    sqlx::query("UPDATE guilds SET prefix = ? WHERE guild_id = ?")
        .bind(prefix)
        .bind(guild_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_announcement_channel<'c, E>(
    executor: E,
    guild_id: i64,
    channel_id: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE guilds SET announcement_channel_id = ? WHERE guild_id = ?")
        .bind(channel_id)
        .bind(guild_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn set_loyal_role<'c, E>(executor: E, guild_id: i64, role_id: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE guilds SET loyal_role_id = ? WHERE guild_id = ?")
        .bind(role_id)
        .bind(guild_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn set_creed<'c, E>(
    executor: E,
    guild_id: i64,
    channel_id: i64,
    message_id: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE guilds SET creed_channel_id = ?, creed_message_id = ? WHERE guild_id = ?")
        .bind(channel_id)
        .bind(message_id)
        .bind(guild_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn set_dashboard<'c, E>(
    executor: E,
    guild_id: i64,
    channel_id: i64,
    message_id: i64,
    leaderboard_size: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE guilds SET dashboard_channel_id = ?, dashboard_msg_id = ?, leaderboard_size = ?
         WHERE guild_id = ?",
    )
    .bind(channel_id)
    .bind(message_id)
    .bind(leaderboard_size)
    .bind(guild_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn set_dashboard_message(pool: &SqlitePool, guild_id: i64, message_id: i64) -> Result<()> {
    sqlx::query("UPDATE guilds SET dashboard_msg_id = ? WHERE guild_id = ?")
        .bind(message_id)
        .bind(guild_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Persists the outcome of a completed setup wizard in one statement.
pub async fn apply_setup(
    pool: &SqlitePool,
    guild_id: i64,
    creed_channel_id: i64,
    creed_message_id: i64,
    role_id: i64,
    backup_invite: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE guilds SET creed_channel_id = ?, creed_message_id = ?, loyal_role_id = ?,
            backup_invite = ?
         WHERE guild_id = ?",
    )
    .bind(creed_channel_id)
    .bind(creed_message_id)
    .bind(role_id)
    .bind(backup_invite)
    .bind(guild_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn remove_guild(pool: &SqlitePool, guild_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM guilds WHERE guild_id = ?")
        .bind(guild_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn add_local_trusted<'c, E>(executor: E, guild_id: i64, user_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("INSERT OR IGNORE INTO guild_trusted (guild_id, user_id) VALUES (?, ?)")
        .bind(guild_id)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove_local_trusted(pool: &SqlitePool, guild_id: i64, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM guild_trusted WHERE guild_id = ? AND user_id = ?")
        .bind(guild_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_local_trusted(pool: &SqlitePool, guild_id: i64, user_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM guild_trusted WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

pub async fn list_local_trusted(pool: &SqlitePool, guild_id: i64) -> Result<Vec<i64>> {
    let users = sqlx::query_scalar("SELECT user_id FROM guild_trusted WHERE guild_id = ?")
        .bind(guild_id)
        .fetch_all(pool)
        .await?;

    Ok(users)
}

// Users

pub async fn get_user<'c, E>(executor: E, user_id: i64) -> Result<Option<UserRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

    Ok(user)
}

pub async fn get_or_create_user(pool: &SqlitePool, user_id: i64) -> Result<UserRecord> {
    if let Some(user) = get_user(pool, user_id).await? {
        return Ok(user);
    }

    let user = UserRecord::new(user_id);
    save_user(pool, &user).await?;
    Ok(user)
}

pub async fn save_user<'c, E>(executor: E, user: &UserRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO users (user_id, is_loyal, is_inactive, streak, total_messages,
            messages_since_last_streak, last_activity, opt_in_date, origin_guild_id,
            origin_guild_name, main_guild_id, main_guild_name, is_muted)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            is_loyal = excluded.is_loyal,
            is_inactive = excluded.is_inactive,
            streak = excluded.streak,
            total_messages = excluded.total_messages,
            messages_since_last_streak = excluded.messages_since_last_streak,
            last_activity = excluded.last_activity,
            opt_in_date = excluded.opt_in_date,
            origin_guild_id = excluded.origin_guild_id,
            origin_guild_name = excluded.origin_guild_name,
            main_guild_id = excluded.main_guild_id,
            main_guild_name = excluded.main_guild_name,
            is_muted = excluded.is_muted,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user.user_id)
    .bind(user.is_loyal)
    .bind(user.is_inactive)
    .bind(user.streak)
    .bind(user.total_messages)
    .bind(user.messages_since_last_streak)
    .bind(user.last_activity)
    .bind(user.opt_in_date)
    .bind(user.origin_guild_id)
    .bind(&user.origin_guild_name)
    .bind(user.main_guild_id)
    .bind(&user.main_guild_name)
    .bind(user.is_muted)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<UserRecord>> {
    let sql = format!("SELECT {} FROM users ORDER BY user_id", USER_COLUMNS);
    let users = sqlx::query_as::<_, UserRecord>(&sql).fetch_all(pool).await?;

    Ok(users)
}

pub async fn list_loyal_users(pool: &SqlitePool) -> Result<Vec<UserRecord>> {
    let sql = format!("SELECT {} FROM users WHERE is_loyal = TRUE ORDER BY user_id", USER_COLUMNS);
    let users = sqlx::query_as::<_, UserRecord>(&sql).fetch_all(pool).await?;

    Ok(users)
}

/// Loyal users whose most recent activity was in the given guild.
pub async fn list_loyal_users_in_guild(pool: &SqlitePool, guild_id: i64) -> Result<Vec<UserRecord>> {
    let sql = format!(
        "SELECT {} FROM users WHERE is_loyal = TRUE AND main_guild_id = ? ORDER BY user_id",
        USER_COLUMNS
    );
    let users = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(guild_id)
        .fetch_all(pool)
        .await?;

    Ok(users)
}

pub async fn top_loyal_users(pool: &SqlitePool, limit: i64) -> Result<Vec<UserRecord>> {
    let sql = format!(
        "SELECT {} FROM users
         WHERE is_loyal = TRUE AND is_inactive = FALSE
         ORDER BY streak DESC, total_messages DESC, user_id ASC
         LIMIT ?",
        USER_COLUMNS
    );
    let users = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(users)
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn count_loyal_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_loyal = TRUE")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

pub async fn count_active_loyal_users(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE is_loyal = TRUE AND is_inactive = FALSE",
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn count_loyal_in_guild(pool: &SqlitePool, guild_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE is_loyal = TRUE AND main_guild_id = ?",
    )
    .bind(guild_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn set_user_muted(pool: &SqlitePool, user_id: i64, muted: bool) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (user_id, is_muted) VALUES (?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            is_muted = excluded.is_muted,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(muted)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn is_user_muted(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE user_id = ? AND is_muted = TRUE")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

// Blacklist

/// Returns `false` when the user was already blacklisted.
pub async fn add_to_blacklist<'c, E>(executor: E, user_id: i64, reason: Option<&str>) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("INSERT OR IGNORE INTO blacklist (user_id, reason) VALUES (?, ?)")
        .bind(user_id)
        .bind(reason)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove_from_blacklist(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM blacklist WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_blacklisted(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blacklist WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn list_blacklist(pool: &SqlitePool) -> Result<Vec<BlacklistEntry>> {
    let entries = sqlx::query_as::<_, BlacklistEntry>(
        "SELECT user_id, reason FROM blacklist ORDER BY created_at, user_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

pub async fn count_blacklist(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM blacklist")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// Stats

pub async fn increment_daily_joins(pool: &SqlitePool, date: NaiveDate) -> Result<()> {
    sqlx::query(
        "INSERT INTO daily_stats (date, joins) VALUES (?, 1)
         ON CONFLICT(date) DO UPDATE SET joins = joins + 1",
    )
    .bind(date)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn increment_daily_leaves(pool: &SqlitePool, date: NaiveDate) -> Result<()> {
    sqlx::query(
        "INSERT INTO daily_stats (date, leaves) VALUES (?, 1)
         ON CONFLICT(date) DO UPDATE SET leaves = leaves + 1",
    )
    .bind(date)
    .execute(pool)
    .await?;

    Ok(())
}

/// Adds imported counters on top of whatever is already stored for the date.
pub async fn add_daily_stats<'c, E>(executor: E, date: NaiveDate, joins: i64, leaves: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO daily_stats (date, joins, leaves) VALUES (?, ?, ?)
         ON CONFLICT(date) DO UPDATE SET
            joins = joins + excluded.joins,
            leaves = leaves + excluded.leaves",
    )
    .bind(date)
    .bind(joins)
    .bind(leaves)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_daily_stats_since(pool: &SqlitePool, since: NaiveDate) -> Result<Vec<DailyStat>> {
    let stats = sqlx::query_as::<_, DailyStat>(
        "SELECT date, joins, leaves FROM daily_stats WHERE date >= ? ORDER BY date",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(stats)
}

pub async fn list_daily_stats(pool: &SqlitePool) -> Result<Vec<DailyStat>> {
    let stats = sqlx::query_as::<_, DailyStat>("SELECT date, joins, leaves FROM daily_stats ORDER BY date")
        .fetch_all(pool)
        .await?;

    Ok(stats)
}

pub async fn record_activity_snapshot(
    pool: &SqlitePool,
    date: NaiveDate,
    loyal_count: i64,
    active_count: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO activity_snapshots (date, loyal_count, active_count) VALUES (?, ?, ?)
         ON CONFLICT(date) DO UPDATE SET
            loyal_count = excluded.loyal_count,
            active_count = excluded.active_count",
    )
    .bind(date)
    .bind(loyal_count)
    .bind(active_count)
    .execute(pool)
    .await?;

    Ok(())
}

/// Keeps any snapshot already stored for the date. Legacy history only carries loyal counts.
pub async fn import_activity_snapshot<'c, E>(executor: E, date: NaiveDate, loyal_count: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO activity_snapshots (date, loyal_count, active_count) VALUES (?, ?, 0)",
    )
    .bind(date)
    .bind(loyal_count)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_activity_snapshots(pool: &SqlitePool) -> Result<Vec<ActivitySnapshot>> {
    let snapshots = sqlx::query_as::<_, ActivitySnapshot>(
        "SELECT date, loyal_count, active_count FROM activity_snapshots ORDER BY date",
    )
    .fetch_all(pool)
    .await?;

    Ok(snapshots)
}

// Legacy import bookkeeping

pub async fn is_legacy_imported(pool: &SqlitePool, source: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM legacy_imports WHERE source = ?")
        .bind(source)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn record_legacy_import<'c, E>(executor: E, source: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("INSERT OR IGNORE INTO legacy_imports (source) VALUES (?)")
        .bind(source)
        .execute(executor)
        .await?;

    Ok(())
}

// Diagnostics

/// Lists problems with the stored schema. An empty list means healthy.
pub async fn schema_issues(pool: &SqlitePool) -> Result<Vec<String>> {
    let mut issues = Vec::new();

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(pool)
            .await?;

    for table in REQUIRED_TABLES {
        if !existing.iter().any(|name| name == table) {
            issues.push(format!("Missing {} table", table));
        }
    }

    if existing.iter().any(|name| name == "network_config") && get_network_config(pool).await?.is_none() {
        issues.push("Missing network_config row".to_string());
    }

    let integrity: Vec<String> = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_all(pool)
        .await?;
    issues.extend(
        integrity
            .into_iter()
            .filter(|line| line != "ok")
            .map(|line| format!("Integrity: {}", line)),
    );

    Ok(issues)
}

pub async fn dump_table(pool: &SqlitePool, table: Table) -> Result<serde_json::Value> {
    let value = match table {
        Table::NetworkConfig => serde_json::to_value(get_network_config(pool).await?)?,
        Table::TrustedUsers => serde_json::to_value(list_trusted_users(pool).await?)?,
        Table::Guilds => serde_json::to_value(list_guilds(pool).await?)?,
        Table::Users => serde_json::to_value(list_users(pool).await?)?,
        Table::Blacklist => serde_json::to_value(list_blacklist(pool).await?)?,
        Table::Stats => {
            let daily = list_daily_stats(pool).await?;
            let snapshots = list_activity_snapshots(pool).await?;
            serde_json::json!({
                "daily_stats": daily,
                "activity_snapshots": snapshots,
            })
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    fn seed() -> NetworkConfig {
        NetworkConfig {
            main_hub_id: Some(1000),
            main_hub_name: "Hub".to_string(),
            main_hub_invite: None,
            hub_ann_channel_id: None,
            system_active: true,
        }
    }

    #[tokio::test]
    async fn banning_twice_keeps_one_blacklist_entry() {
        let pool = test_pool().await;

        assert!(add_to_blacklist(&pool, 77, Some("spam")).await.unwrap());
        assert!(!add_to_blacklist(&pool, 77, Some("again")).await.unwrap());

        let entries = list_blacklist(&pool).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn blacklist_is_network_wide() {
        let pool = test_pool().await;
        add_to_blacklist(&pool, 77, None).await.unwrap();

        // No guild id involved: a blacklisted id is rejected wherever it joins.
        assert!(is_blacklisted(&pool, 77).await.unwrap());
        assert!(!is_blacklisted(&pool, 78).await.unwrap());

        assert!(remove_from_blacklist(&pool, 77).await.unwrap());
        assert!(!is_blacklisted(&pool, 77).await.unwrap());
    }

    #[tokio::test]
    async fn seeding_trusts_owner_and_keeps_existing_config() {
        let pool = test_pool().await;
        seed_network_config(&pool, &seed(), 1).await.unwrap();
        set_system_active(&pool, false).await.unwrap();

        // A second seed (next startup) must not reset the flag.
        seed_network_config(&pool, &seed(), 1).await.unwrap();

        assert!(!is_system_active(&pool).await.unwrap());
        assert!(is_trusted(&pool, 1).await.unwrap());
    }

    #[tokio::test]
    async fn reset_trusted_keeps_owner() {
        let pool = test_pool().await;
        seed_network_config(&pool, &seed(), 1).await.unwrap();
        add_trusted_user(&pool, 2).await.unwrap();
        add_trusted_user(&pool, 3).await.unwrap();

        let removed = reset_trusted_users(&pool, 1).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(list_trusted_users(&pool).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn guild_is_created_lazily_and_removed_explicitly() {
        let pool = test_pool().await;

        assert!(get_guild(&pool, 10).await.unwrap().is_none());
        let guild = get_or_create_guild(&pool, 10, "Gateway", false, "$").await.unwrap();
        assert_eq!(guild.prefix, "$");
        assert_eq!(guild.leaderboard_size, 10);

        set_guild_prefix(&pool, 10, "!").await.unwrap();
        let again = get_or_create_guild(&pool, 10, "Renamed", false, "$").await.unwrap();
        assert_eq!(again.prefix, "!");
        assert_eq!(again.name, "Gateway");

        add_local_trusted(&pool, 10, 5).await.unwrap();
        assert!(is_local_trusted(&pool, 10, 5).await.unwrap());

        assert!(remove_guild(&pool, 10).await.unwrap());
        assert!(!remove_guild(&pool, 10).await.unwrap());
        assert!(!is_local_trusted(&pool, 10, 5).await.unwrap());
    }

    #[tokio::test]
    async fn user_round_trips_through_save() {
        let pool = test_pool().await;
        let mut user = get_or_create_user(&pool, 9).await.unwrap();
        user.is_loyal = true;
        user.streak = 3;
        user.last_activity = NaiveDate::from_ymd_opt(2024, 5, 1);
        user.main_guild_id = Some(10);
        save_user(&pool, &user).await.unwrap();

        assert_eq!(get_user(&pool, 9).await.unwrap(), Some(user));
        assert_eq!(count_loyal_in_guild(&pool, 10).await.unwrap(), 1);
        assert_eq!(count_active_loyal_users(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn daily_counters_accumulate() {
        let pool = test_pool().await;
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        increment_daily_joins(&pool, day).await.unwrap();
        increment_daily_joins(&pool, day).await.unwrap();
        increment_daily_leaves(&pool, day).await.unwrap();

        let stats = get_daily_stats_since(&pool, day).await.unwrap();
        assert_eq!(stats, vec![DailyStat { date: day, joins: 2, leaves: 1 }]);
    }

    #[tokio::test]
    async fn fresh_schema_is_healthy_once_seeded() {
        let pool = test_pool().await;
        let issues = schema_issues(&pool).await.unwrap();
        assert_eq!(issues, vec!["Missing network_config row".to_string()]);

        seed_network_config(&pool, &seed(), 1).await.unwrap();
        assert!(schema_issues(&pool).await.unwrap().is_empty());
    }
}
