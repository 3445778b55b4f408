use crate::bot::Data;
use crate::bot::commands::loyalty::refresh_dashboard;
use crate::database::models::UserRecord;
use crate::database::queries;
use crate::utils::format::{create_warning_embed, inactivity_dm, network_footer};
use crate::utils::inactivity::InactivitySweep;
use crate::utils::stats;
use crate::utils::time::get_current_date_utc;
use anyhow::Result;
use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;
use std::time::Duration;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

fn hours(n: u64) -> Duration {
    Duration::from_secs(n * 60 * 60)
}

pub fn default_activity(loyal_members: i64) -> serenity::ActivityData {
    serenity::ActivityData::watching(format!("{} loyal members", loyal_members))
}

/// Guilds where a user holds the loyalty role: origin and main, without duplicates.
pub fn loyal_role_guilds(user: &UserRecord) -> Vec<i64> {
    let mut targets = Vec::new();
    for guild_id in [user.origin_guild_id, user.main_guild_id].into_iter().flatten() {
        if !targets.contains(&guild_id) {
            targets.push(guild_id);
        }
    }
    targets
}

/// Starts every periodic job. Each runs once immediately, then on its own interval.
pub fn spawn_all(ctx: serenity::Context, data: Data) {
    tracing::info!(
        "Starting background tasks (presence {}m, dashboards {}h, inactivity {}h)",
        data.config.presence_refresh_minutes,
        data.config.dashboard_refresh_hours,
        data.config.inactivity_sweep_hours
    );

    {
        let (ctx, data) = (ctx.clone(), data.clone());
        tokio::spawn(async move {
            let period = Duration::from_secs(data.config.presence_refresh_minutes * 60);
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = refresh_presence(&ctx, &data).await {
                    tracing::warn!("Presence refresh failed: {:?}", e);
                }
            }
        });
    }

    {
        let (ctx, data) = (ctx.clone(), data.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(hours(data.config.dashboard_refresh_hours));
            loop {
                interval.tick().await;
                if let Err(e) = refresh_dashboards(&ctx, &data).await {
                    tracing::warn!("Dashboard refresh failed: {:?}", e);
                }
            }
        });
    }

    {
        let (ctx, data) = (ctx.clone(), data.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(hours(data.config.inactivity_sweep_hours));
            loop {
                interval.tick().await;
                if let Err(e) = sweep_inactive(&ctx, &data).await {
                    tracing::error!("Inactivity sweep failed: {:?}", e);
                }
            }
        });
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = stats::record_snapshot(&data.pool, get_current_date_utc()).await {
                tracing::warn!("Activity snapshot failed: {:?}", e);
            }
        }
    });
}

async fn refresh_presence(ctx: &serenity::Context, data: &Data) -> Result<()> {
    if data.custom_presence.load(Ordering::Relaxed) {
        return Ok(());
    }
    let loyal = queries::count_loyal_users(&data.pool).await?;
    ctx.set_activity(Some(default_activity(loyal)));
    Ok(())
}

async fn refresh_dashboards(ctx: &serenity::Context, data: &Data) -> Result<()> {
    let mut refreshed = 0;
    for guild in queries::list_guilds(&data.pool).await? {
        match refresh_dashboard(ctx, data, &guild).await {
            Ok(true) => refreshed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!("Dashboard refresh failed for guild {}: {:?}", guild.guild_id, e),
        }
    }
    tracing::debug!("Refreshed {} dashboards", refreshed);
    Ok(())
}

async fn sweep_inactive(ctx: &serenity::Context, data: &Data) -> Result<()> {
    let days = data.config.inactivity_days;
    let marked = InactivitySweep::new(data.pool.clone(), days)
        .run(get_current_date_utc())
        .await?;
    if marked.is_empty() {
        return Ok(());
    }

    for user in &marked {
        let user_id = serenity::UserId::new(user.user_id as u64);

        for guild_id in loyal_role_guilds(user) {
            let Some(role_id) = queries::get_guild(&data.pool, guild_id)
                .await?
                .and_then(|guild| guild.loyal_role_id)
            else {
                continue;
            };
            if let Err(e) = ctx
                .http
                .remove_member_role(
                    serenity::GuildId::new(guild_id as u64),
                    user_id,
                    serenity::RoleId::new(role_id as u64),
                    Some("Inactive loyal member"),
                )
                .await
            {
                tracing::warn!("Failed to revoke role from {} in {}: {:?}", user_id, guild_id, e);
            }
        }

        let embed = create_warning_embed(
            "Marked Inactive",
            &inactivity_dm(&data.config.network_name, days),
        )
        .footer(network_footer(
            user.origin_guild_name.as_deref(),
            &data.config.network_name,
        ));
        if let Err(e) = user_id
            .direct_message(ctx, serenity::CreateMessage::new().embed(embed))
            .await
        {
            tracing::warn!("Failed to send inactivity DM to {}: {:?}", user_id, e);
        }
    }

    tracing::info!("Inactivity sweep marked {} users", marked.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_guilds_dedupe_origin_and_main() {
        let mut user = UserRecord::new(1);
        assert!(loyal_role_guilds(&user).is_empty());

        user.origin_guild_id = Some(10);
        user.main_guild_id = Some(10);
        assert_eq!(loyal_role_guilds(&user), vec![10]);

        user.main_guild_id = Some(20);
        assert_eq!(loyal_role_guilds(&user), vec![10, 20]);
    }

    #[test]
    fn default_activity_shows_loyal_count() {
        let activity = default_activity(12);
        assert_eq!(activity.name, "12 loyal members");
        assert_eq!(activity.kind, serenity::ActivityType::Watching);
    }
}
