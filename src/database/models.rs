use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub main_hub_id: Option<i64>,
    pub main_hub_name: String,
    pub main_hub_invite: Option<String>,
    pub hub_ann_channel_id: Option<i64>,
    pub system_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GuildRecord {
    pub guild_id: i64,
    pub name: String,
    pub is_hub: bool,
    pub prefix: String,
    pub announcement_channel_id: Option<i64>,
    pub loyal_role_id: Option<i64>,
    pub creed_message_id: Option<i64>,
    pub creed_channel_id: Option<i64>,
    pub dashboard_channel_id: Option<i64>,
    pub dashboard_msg_id: Option<i64>,
    pub leaderboard_size: i64,
    pub backup_invite: Option<String>,
}

/// Network-wide profile of a single member.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub is_loyal: bool,
    pub is_inactive: bool,
    pub streak: i64,
    pub total_messages: i64,
    pub messages_since_last_streak: i64,
    pub last_activity: Option<NaiveDate>,
    pub opt_in_date: Option<NaiveDate>,
    pub origin_guild_id: Option<i64>,
    pub origin_guild_name: Option<String>,
    pub main_guild_id: Option<i64>,
    pub main_guild_name: Option<String>,
    pub is_muted: bool,
}

impl UserRecord {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            is_loyal: false,
            is_inactive: false,
            streak: 0,
            total_messages: 0,
            messages_since_last_streak: 0,
            last_activity: None,
            opt_in_date: None,
            origin_guild_id: None,
            origin_guild_name: None,
            main_guild_id: None,
            main_guild_name: None,
            is_muted: false,
        }
    }

    pub fn is_active_loyal(&self) -> bool {
        self.is_loyal && !self.is_inactive
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub user_id: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub joins: i64,
    pub leaves: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub date: NaiveDate,
    pub loyal_count: i64,
    pub active_count: i64,
}

/// Tables an owner may dump with `su schema view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    NetworkConfig,
    TrustedUsers,
    Guilds,
    Users,
    Blacklist,
    Stats,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::NetworkConfig,
        Table::TrustedUsers,
        Table::Guilds,
        Table::Users,
        Table::Blacklist,
        Table::Stats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::NetworkConfig => "network_config",
            Table::TrustedUsers => "trusted_users",
            Table::Guilds => "guilds",
            Table::Users => "users",
            Table::Blacklist => "blacklist",
            Table::Stats => "stats",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|table| table.as_str() == name)
    }
}
