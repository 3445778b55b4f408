use crate::database::models::UserRecord;
use crate::database::queries;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

/// Ids were written as numbers by some versions and as strings by others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LegacyId {
    Int(i64),
    Str(String),
}

impl LegacyId {
    fn to_i64(&self) -> Option<i64> {
        let id = match self {
            LegacyId::Int(id) => *id,
            LegacyId::Str(id) => id.trim().parse().ok()?,
        };
        (id > 0).then_some(id)
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn parse_date(raw: &Option<String>) -> Option<NaiveDate> {
    raw.as_deref()
        .and_then(|date| NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyDocument {
    network_config: Option<LegacyNetworkConfig>,
    global_blacklist: Vec<LegacyId>,
    global_users: HashMap<String, LegacyUser>,
    guilds: HashMap<String, LegacyGuild>,
    stats: LegacyStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyNetworkConfig {
    system_active: Option<bool>,
    trusted_users: Vec<LegacyId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyUser {
    is_loyal: bool,
    is_inactive: bool,
    is_muted: bool,
    streak: i64,
    total_messages: i64,
    messages_since_last_streak: i64,
    last_activity: Option<String>,
    opt_in_date: Option<String>,
    #[serde(alias = "origin_gateway_id")]
    origin_guild_id: Option<LegacyId>,
    #[serde(alias = "origin_gateway_name")]
    origin_guild_name: Option<String>,
    #[serde(alias = "main_server_id")]
    main_guild_id: Option<LegacyId>,
    #[serde(alias = "main_server_name")]
    main_guild_name: Option<String>,
}

impl LegacyUser {
    fn to_record(&self, user_id: i64) -> UserRecord {
        UserRecord {
            user_id,
            is_loyal: self.is_loyal,
            is_inactive: self.is_inactive,
            streak: self.streak.max(0),
            total_messages: self.total_messages.max(0),
            messages_since_last_streak: self.messages_since_last_streak.max(0),
            last_activity: parse_date(&self.last_activity),
            opt_in_date: parse_date(&self.opt_in_date),
            origin_guild_id: self.origin_guild_id.as_ref().and_then(LegacyId::to_i64),
            origin_guild_name: self.origin_guild_name.clone(),
            main_guild_id: self.main_guild_id.as_ref().and_then(LegacyId::to_i64),
            main_guild_name: self.main_guild_name.clone(),
            is_muted: self.is_muted,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyGuild {
    name: Option<String>,
    is_hub: bool,
    prefix: Option<String>,
    #[serde(alias = "announcement_channel")]
    announcement_channel_id: Option<LegacyId>,
    loyal_role_id: Option<LegacyId>,
    creed_message_id: Option<LegacyId>,
    creed_channel_id: Option<LegacyId>,
    dashboard_msg_id: Option<LegacyId>,
    dashboard_channel_id: Option<LegacyId>,
    trusted_local: Vec<LegacyId>,
    loyalty: Option<LegacyGuildLoyalty>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyGuildLoyalty {
    members: HashMap<String, LegacyUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyStats {
    daily_joins: HashMap<String, i64>,
    daily_leaves: HashMap<String, i64>,
    /// Date to loyal member count.
    activity_snapshots: HashMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub guilds: usize,
    pub blacklisted: usize,
    pub trusted: usize,
    pub stat_days: usize,
    pub snapshots: usize,
    pub skipped_ids: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    NoFile,
    AlreadyImported,
    /// The file could not be parsed; nothing was written and it will be retried next start.
    Unreadable,
    Imported(ImportSummary),
}

/// Folds a second sighting of the same user into the first: counters keep the larger value,
/// flags are OR-ed, and the latest activity wins.
pub fn merge_user(into: &mut UserRecord, other: &UserRecord) {
    into.is_loyal |= other.is_loyal;
    into.is_muted |= other.is_muted;
    into.is_inactive |= other.is_inactive;
    into.streak = into.streak.max(other.streak);
    into.total_messages = into.total_messages.max(other.total_messages);
    into.messages_since_last_streak = into
        .messages_since_last_streak
        .max(other.messages_since_last_streak);
    into.last_activity = into.last_activity.max(other.last_activity);
    into.opt_in_date = match (into.opt_in_date, other.opt_in_date) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    if into.origin_guild_id.is_none() {
        into.origin_guild_id = other.origin_guild_id;
        into.origin_guild_name = other.origin_guild_name.clone();
    }
    if into.main_guild_id.is_none() {
        into.main_guild_id = other.main_guild_id;
        into.main_guild_name = other.main_guild_name.clone();
    }
}

/// Imports the legacy JSON file at `path` once. Later calls are no-ops.
pub async fn import_file(
    pool: &SqlitePool,
    path: &Path,
    default_prefix: &str,
) -> Result<ImportOutcome> {
    if !path.exists() {
        return Ok(ImportOutcome::NoFile);
    }

    let source = path.display().to_string();
    if queries::is_legacy_imported(pool, &source).await? {
        return Ok(ImportOutcome::AlreadyImported);
    }

    let raw = tokio::fs::read_to_string(path).await?;
    let document = match serde_json::from_str::<LegacyDocument>(&raw) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!("Skipping unreadable legacy data file {}: {}", source, e);
            return Ok(ImportOutcome::Unreadable);
        }
    };

    // Stats are additive, so the data and the import marker commit together or not at all.
    let mut tx = pool.begin().await?;
    let summary = import_document(&mut *tx, &document, default_prefix).await?;
    queries::record_legacy_import(&mut *tx, &source).await?;
    tx.commit().await?;
    tracing::info!("Imported legacy data from {}: {:?}", source, summary);

    Ok(ImportOutcome::Imported(summary))
}

pub async fn import_str(pool: &SqlitePool, raw: &str, default_prefix: &str) -> Result<ImportSummary> {
    let document: LegacyDocument = serde_json::from_str(raw)?;
    let mut tx = pool.begin().await?;
    let summary = import_document(&mut *tx, &document, default_prefix).await?;
    tx.commit().await?;
    Ok(summary)
}

async fn import_document(
    conn: &mut SqliteConnection,
    document: &LegacyDocument,
    default_prefix: &str,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    if let Some(config) = &document.network_config {
        if let Some(active) = config.system_active {
            queries::set_system_active(&mut *conn, active).await?;
        }
        for id in &config.trusted_users {
            match id.to_i64() {
                Some(user_id) => {
                    queries::add_trusted_user(&mut *conn, user_id).await?;
                    summary.trusted += 1;
                }
                None => summary.skipped_ids += 1,
            }
        }
    }

    for id in &document.global_blacklist {
        match id.to_i64() {
            Some(user_id) => {
                queries::add_to_blacklist(&mut *conn, user_id, Some("Imported from legacy blacklist"))
                    .await?;
                summary.blacklisted += 1;
            }
            None => summary.skipped_ids += 1,
        }
    }

    let mut users: HashMap<i64, UserRecord> = HashMap::new();
    let mut collect = |raw_id: &str, legacy: &LegacyUser, skipped: &mut usize| {
        let Some(user_id) = parse_id(raw_id) else {
            *skipped += 1;
            return;
        };
        let record = legacy.to_record(user_id);
        users
            .entry(user_id)
            .and_modify(|existing| merge_user(existing, &record))
            .or_insert(record);
    };

    for (raw_id, legacy) in &document.global_users {
        collect(raw_id, legacy, &mut summary.skipped_ids);
    }
    for guild in document.guilds.values() {
        if let Some(loyalty) = &guild.loyalty {
            for (raw_id, legacy) in &loyalty.members {
                collect(raw_id, legacy, &mut summary.skipped_ids);
            }
        }
    }

    for (_, mut record) in users {
        if let Some(stored) = queries::get_user(&mut *conn, record.user_id).await? {
            merge_user(&mut record, &stored);
        }
        queries::save_user(&mut *conn, &record).await?;
        summary.users += 1;
    }

    for (raw_id, legacy) in &document.guilds {
        let Some(guild_id) = parse_id(raw_id) else {
            summary.skipped_ids += 1;
            continue;
        };
        import_guild(&mut *conn, guild_id, legacy, default_prefix).await?;
        summary.guilds += 1;
    }

    let mut days: HashMap<NaiveDate, (i64, i64)> = HashMap::new();
    for (date, joins) in &document.stats.daily_joins {
        if let Some(date) = parse_date(&Some(date.clone())) {
            days.entry(date).or_default().0 += joins;
        }
    }
    for (date, leaves) in &document.stats.daily_leaves {
        if let Some(date) = parse_date(&Some(date.clone())) {
            days.entry(date).or_default().1 += leaves;
        }
    }
    for (date, (joins, leaves)) in &days {
        queries::add_daily_stats(&mut *conn, *date, *joins, *leaves).await?;
    }
    summary.stat_days = days.len();

    for (date, loyal_count) in &document.stats.activity_snapshots {
        if let Some(date) = parse_date(&Some(date.clone())) {
            if queries::import_activity_snapshot(&mut *conn, date, *loyal_count).await? {
                summary.snapshots += 1;
            }
        }
    }

    Ok(summary)
}

async fn import_guild(
    conn: &mut SqliteConnection,
    guild_id: i64,
    legacy: &LegacyGuild,
    default_prefix: &str,
) -> Result<()> {
    let name = legacy.name.as_deref().unwrap_or("Unknown");
    let prefix = legacy
        .prefix
        .as_deref()
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or(default_prefix);
    queries::insert_guild(&mut *conn, guild_id, name, legacy.is_hub, prefix).await?;
    let leaderboard_size = queries::get_guild(&mut *conn, guild_id)
        .await?
        .map(|guild| guild.leaderboard_size)
        .unwrap_or(10);

    let id = |value: &Option<LegacyId>| value.as_ref().and_then(LegacyId::to_i64);

    if let Some(channel_id) = id(&legacy.announcement_channel_id) {
        queries::set_announcement_channel(&mut *conn, guild_id, channel_id).await?;
    }
    if let Some(role_id) = id(&legacy.loyal_role_id) {
        queries::set_loyal_role(&mut *conn, guild_id, role_id).await?;
    }
    if let (Some(channel_id), Some(message_id)) =
        (id(&legacy.creed_channel_id), id(&legacy.creed_message_id))
    {
        queries::set_creed(&mut *conn, guild_id, channel_id, message_id).await?;
    }
    if let (Some(channel_id), Some(message_id)) =
        (id(&legacy.dashboard_channel_id), id(&legacy.dashboard_msg_id))
    {
        queries::set_dashboard(&mut *conn, guild_id, channel_id, message_id, leaderboard_size)
            .await?;
    }
    for user_id in legacy.trusted_local.iter().filter_map(LegacyId::to_i64) {
        queries::add_local_trusted(&mut *conn, guild_id, user_id).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    const FLAT: &str = r#"{
        "network_config": { "system_active": false, "trusted_users": [1, "2"] },
        "global_blacklist": ["66", 67, "not-an-id"],
        "global_users": {
            "100": {
                "is_loyal": true,
                "streak": 4,
                "total_messages": 450,
                "messages_since_last_streak": 50,
                "last_activity": "2024-05-01",
                "opt_in_date": "2024-04-01",
                "origin_gateway_id": 10,
                "origin_gateway_name": "Gateway"
            }
        },
        "guilds": {
            "10": {
                "name": "Gateway",
                "prefix": "!",
                "loyal_role_id": 555,
                "creed_channel_id": 444,
                "creed_message_id": 333,
                "trusted_local": [7]
            }
        },
        "stats": {
            "daily_joins": { "2024-05-01": 3 },
            "daily_leaves": { "2024-05-01": 1, "2024-05-02": 2 },
            "activity_snapshots": { "2024-05-01": 40, "2024-05-02": 42 }
        }
    }"#;

    #[tokio::test]
    async fn imports_flat_schema() {
        let pool = test_pool().await;

        let summary = import_str(&pool, FLAT, "$").await.unwrap();

        assert_eq!(summary.users, 1);
        assert_eq!(summary.guilds, 1);
        assert_eq!(summary.blacklisted, 2);
        assert_eq!(summary.skipped_ids, 1);
        assert_eq!(summary.stat_days, 2);
        assert_eq!(summary.snapshots, 2);

        assert!(!queries::is_system_active(&pool).await.unwrap());
        assert!(queries::is_trusted(&pool, 2).await.unwrap());
        assert!(queries::is_blacklisted(&pool, 66).await.unwrap());

        let user = queries::get_user(&pool, 100).await.unwrap().unwrap();
        assert!(user.is_loyal);
        assert_eq!(user.streak, 4);
        assert_eq!(user.origin_guild_id, Some(10));
        assert_eq!(user.last_activity, NaiveDate::from_ymd_opt(2024, 5, 1));

        let guild = queries::get_guild(&pool, 10).await.unwrap().unwrap();
        assert_eq!(guild.prefix, "!");
        assert_eq!(guild.loyal_role_id, Some(555));
        assert_eq!(guild.creed_message_id, Some(333));
        assert!(queries::is_local_trusted(&pool, 10, 7).await.unwrap());

        let snapshots = queries::list_activity_snapshots(&pool).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].loyal_count, 40);
        assert_eq!(snapshots[1].loyal_count, 42);
    }

    #[tokio::test]
    async fn nested_members_merge_with_global_users() {
        let pool = test_pool().await;
        let raw = r#"{
            "global_users": {
                "100": { "is_loyal": false, "streak": 1, "total_messages": 900,
                         "last_activity": "2024-05-01" }
            },
            "guilds": {
                "10": { "name": "Gateway", "loyalty": { "members": {
                    "100": { "is_loyal": true, "streak": 3, "total_messages": 300,
                             "last_activity": "2024-05-09" },
                    "200": { "is_loyal": true, "streak": 2 }
                } } }
            }
        }"#;

        let summary = import_str(&pool, raw, "$").await.unwrap();
        assert_eq!(summary.users, 2);

        let merged = queries::get_user(&pool, 100).await.unwrap().unwrap();
        assert!(merged.is_loyal);
        assert_eq!(merged.streak, 3);
        assert_eq!(merged.total_messages, 900);
        assert_eq!(merged.last_activity, NaiveDate::from_ymd_opt(2024, 5, 9));
    }

    #[tokio::test]
    async fn file_is_imported_once_and_garbage_is_skipped() {
        let pool = test_pool().await;
        let dir = std::env::temp_dir().join(format!("legacy-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let broken = dir.join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(
            import_file(&pool, &broken, "$").await.unwrap(),
            ImportOutcome::Unreadable
        );
        assert!(!queries::is_legacy_imported(&pool, &broken.display().to_string()).await.unwrap());

        let good = dir.join("good.json");
        std::fs::write(&good, FLAT).unwrap();
        assert!(matches!(
            import_file(&pool, &good, "$").await.unwrap(),
            ImportOutcome::Imported(_)
        ));
        assert_eq!(
            import_file(&pool, &good, "$").await.unwrap(),
            ImportOutcome::AlreadyImported
        );

        // Stats are additive, so a second import would have doubled them.
        let stats = queries::list_daily_stats(&pool).await.unwrap();
        assert_eq!(stats[0].joins, 3);

        assert_eq!(
            import_file(&pool, &dir.join("missing.json"), "$").await.unwrap(),
            ImportOutcome::NoFile
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn failed_import_leaves_nothing_behind() {
        let pool = test_pool().await;
        let dir = std::env::temp_dir().join(format!("legacy-rollback-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data.json");
        std::fs::write(&path, FLAT).unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_import BEFORE INSERT ON legacy_imports
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();
        assert!(import_file(&pool, &path, "$").await.is_err());
        assert!(queries::list_daily_stats(&pool).await.unwrap().is_empty());
        assert!(queries::get_user(&pool, 100).await.unwrap().is_none());

        sqlx::query("DROP TRIGGER reject_import").execute(&pool).await.unwrap();
        assert!(matches!(
            import_file(&pool, &path, "$").await.unwrap(),
            ImportOutcome::Imported(_)
        ));
        let stats = queries::list_daily_stats(&pool).await.unwrap();
        assert_eq!(stats[0].joins, 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn imported_snapshots_never_overwrite_live_ones() {
        let pool = test_pool().await;
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        queries::record_activity_snapshot(&pool, date, 50, 20).await.unwrap();

        let summary = import_str(&pool, FLAT, "$").await.unwrap();
        assert_eq!(summary.snapshots, 1);

        let snapshots = queries::list_activity_snapshots(&pool).await.unwrap();
        assert_eq!(snapshots[0].loyal_count, 50);
        assert_eq!(snapshots[0].active_count, 20);
    }
}
