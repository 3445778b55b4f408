use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

pub const REQUIRED_TABLES: [&str; 9] = [
    "network_config",
    "trusted_users",
    "guilds",
    "guild_trusted",
    "users",
    "blacklist",
    "daily_stats",
    "activity_snapshots",
    "legacy_imports",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    create_network_config_table(pool).await?;
    create_trusted_users_table(pool).await?;
    create_guilds_table(pool).await?;
    create_guild_trusted_table(pool).await?;
    create_users_table(pool).await?;
    create_blacklist_table(pool).await?;
    create_stats_tables(pool).await?;
    create_legacy_imports_table(pool).await?;

    info!("Database migrations completed successfully");
    Ok(())
}

async fn create_network_config_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS network_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            main_hub_id INTEGER,
            main_hub_name TEXT NOT NULL DEFAULT 'Main Hub',
            main_hub_invite TEXT,
            hub_ann_channel_id INTEGER,
            system_active BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_trusted_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trusted_users (
            user_id INTEGER PRIMARY KEY,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guilds_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guilds (
            guild_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL DEFAULT 'Unknown',
            is_hub BOOLEAN NOT NULL DEFAULT FALSE,
            prefix TEXT NOT NULL DEFAULT '$',
            announcement_channel_id INTEGER,
            loyal_role_id INTEGER,
            creed_message_id INTEGER,
            creed_channel_id INTEGER,
            dashboard_channel_id INTEGER,
            dashboard_msg_id INTEGER,
            leaderboard_size INTEGER NOT NULL DEFAULT 10,
            backup_invite TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_guild_trusted_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guild_trusted (
            guild_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (guild_id, user_id),
            FOREIGN KEY (guild_id) REFERENCES guilds (guild_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            is_loyal BOOLEAN NOT NULL DEFAULT FALSE,
            is_inactive BOOLEAN NOT NULL DEFAULT FALSE,
            streak INTEGER NOT NULL DEFAULT 0,
            total_messages INTEGER NOT NULL DEFAULT 0,
            messages_since_last_streak INTEGER NOT NULL DEFAULT 0,
            last_activity DATE,
            opt_in_date DATE,
            origin_guild_id INTEGER,
            origin_guild_name TEXT,
            main_guild_id INTEGER,
            main_guild_name TEXT,
            is_muted BOOLEAN NOT NULL DEFAULT FALSE,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_loyal ON users (is_loyal, is_inactive)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_blacklist_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blacklist (
            user_id INTEGER PRIMARY KEY,
            reason TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_stats_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_stats (
            date DATE PRIMARY KEY,
            joins INTEGER NOT NULL DEFAULT 0,
            leaves INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_snapshots (
            date DATE PRIMARY KEY,
            loyal_count INTEGER NOT NULL DEFAULT 0,
            active_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_legacy_imports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS legacy_imports (
            source TEXT PRIMARY KEY,
            imported_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
