use crate::bot::commands::{
    admin_or_trusted, parse_target_user, reply, send_module_help, trusted,
};
use crate::bot::{Context, Error};
use crate::database::queries;
use crate::utils::format::{
    HelpEntry, create_error_embed, create_info_embed, create_success_embed, format_bulk_result,
};
use crate::utils::activity::ActivityTracker;
use crate::utils::time::get_current_date_utc;
use crate::utils::validation::parse_timeout_minutes;
use chrono::NaiveDate;
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;

const HELP: [HelpEntry; 8] = [
    ("sec ban <user_id> [reason]", "Blacklist and ban from every network server"),
    ("sec unban <user_id>", "Lift a network ban"),
    ("sec timeout <user_id> <duration>", "Time out everywhere (5-60 minutes)"),
    ("sec mute <user_id>", "Delete the user's messages network-wide"),
    ("sec unmute <user_id>", "Lift a network mute"),
    ("sec stop", "Pause the loyalty system"),
    ("sec start", "Resume the loyalty system"),
    ("sec trusted add <@user>", "Add a network trusted admin"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    succeeded: usize,
    failed: usize,
}

impl Tally {
    fn record<T, E: std::fmt::Debug>(&mut self, what: &str, guild_id: i64, result: Result<T, E>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                tracing::warn!("{} failed in guild {}: {:?}", what, guild_id, e);
                self.failed += 1;
            }
        }
    }
}

/// Takes a banned user out of the loyalty network. The leave is counted the same way as
/// `l user leave`; a user who was not loyal records nothing.
async fn revoke_membership(
    pool: &SqlitePool,
    tracker: &ActivityTracker,
    user_id: i64,
    date: NaiveDate,
) -> anyhow::Result<bool> {
    let left = tracker.leave(user_id, date).await?;
    queries::set_user_muted(pool, user_id, false).await?;
    Ok(left)
}

async fn network_guild_ids(ctx: Context<'_>) -> Result<Vec<i64>, Error> {
    Ok(queries::list_guilds(&ctx.data().pool)
        .await?
        .into_iter()
        .map(|guild| guild.guild_id)
        .collect())
}

/// Security module: bans, timeouts and system control
#[poise::command(
    prefix_command,
    guild_only,
    rename = "sec",
    aliases("security"),
    subcommands("ban", "unban", "timeout", "mute", "unmute", "stop", "start", "trusted_group")
)]
pub async fn security(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "🔒 Security Module", &HELP).await
}

/// Blacklist a user and ban them from every network server
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn ban(
    ctx: Context<'_>,
    user: String,
    #[rest] reason: Option<String>,
) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    let pool = &ctx.data().pool;
    let reason = reason.unwrap_or_else(|| "Network ban".to_string());

    let newly_listed = queries::add_to_blacklist(pool, user_id.get() as i64, Some(&reason)).await?;
    revoke_membership(
        pool,
        &ctx.data().tracker(),
        user_id.get() as i64,
        get_current_date_utc(),
    )
    .await?;

    let mut tally = Tally::default();
    for guild_id in network_guild_ids(ctx).await? {
        let result = serenity::GuildId::new(guild_id as u64)
            .ban_with_reason(ctx.http(), user_id, 0, &reason)
            .await;
        tally.record("Ban", guild_id, result);
    }
    tracing::info!("Network ban of {} by {}: {:?}", user_id, ctx.author().id, tally);

    let note = if newly_listed { "" } else { "\n*User was already blacklisted.*" };
    reply(
        ctx,
        create_success_embed(
            "User Banned",
            &format!(
                "<@{}> has been banned from the network\n**Reason:** {}\n{}{}",
                user_id,
                reason,
                format_bulk_result("Servers", tally.succeeded, tally.failed),
                note
            ),
        ),
    )
    .await
}

/// Lift a network ban
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn unban(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    let was_listed = queries::remove_from_blacklist(&ctx.data().pool, user_id.get() as i64).await?;

    let mut tally = Tally::default();
    for guild_id in network_guild_ids(ctx).await? {
        let result = serenity::GuildId::new(guild_id as u64)
            .unban(ctx.http(), user_id)
            .await;
        tally.record("Unban", guild_id, result);
    }

    let note = if was_listed { "" } else { "\n*User was not blacklisted.*" };
    reply(
        ctx,
        create_success_embed(
            "User Unbanned",
            &format!(
                "<@{}> has been unbanned from the network\n{}{}",
                user_id,
                format_bulk_result("Servers", tally.succeeded, tally.failed),
                note
            ),
        ),
    )
    .await
}

/// Time a user out in every network server
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn timeout(ctx: Context<'_>, user: String, duration: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    let minutes = match parse_timeout_minutes(&duration) {
        Ok(minutes) => minutes,
        Err(e) => return reply(ctx, create_error_embed("Invalid Duration", &e.to_string())).await,
    };

    let until = serenity::Timestamp::from_unix_timestamp(chrono::Utc::now().timestamp() + minutes * 60)?;

    let mut tally = Tally::default();
    for guild_id in network_guild_ids(ctx).await? {
        let result = serenity::GuildId::new(guild_id as u64)
            .edit_member(
                ctx.serenity_context(),
                user_id,
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason("Network timeout"),
            )
            .await;
        tally.record("Timeout", guild_id, result);
    }

    reply(
        ctx,
        create_success_embed(
            "User Timed Out",
            &format!(
                "<@{}> timed out for {} minutes across the network\n{}",
                user_id,
                minutes,
                format_bulk_result("Servers", tally.succeeded, tally.failed)
            ),
        ),
    )
    .await
}

/// Delete a user's messages network-wide
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn mute(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    queries::set_user_muted(&ctx.data().pool, user_id.get() as i64, true).await?;

    reply(
        ctx,
        create_success_embed(
            "User Muted",
            &format!("Messages from <@{}> will be deleted across the network", user_id),
        ),
    )
    .await
}

/// Lift a network mute
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn unmute(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    queries::set_user_muted(&ctx.data().pool, user_id.get() as i64, false).await?;

    reply(ctx, create_success_embed("User Unmuted", &format!("<@{}> can talk again", user_id))).await
}

/// Pause the loyalty system
#[poise::command(prefix_command, guild_only, check = "trusted")]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    queries::set_system_active(&ctx.data().pool, false).await?;
    tracing::info!("Loyalty system stopped by {}", ctx.author().id);

    reply(ctx, create_success_embed("System Stopped", "Loyalty system has been disabled")).await
}

/// Resume the loyalty system
#[poise::command(prefix_command, guild_only, check = "trusted")]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    queries::set_system_active(&ctx.data().pool, true).await?;
    tracing::info!("Loyalty system started by {}", ctx.author().id);

    reply(ctx, create_success_embed("System Started", "Loyalty system has been enabled")).await
}

/// Manage trusted admins
#[poise::command(
    prefix_command,
    guild_only,
    rename = "trusted",
    check = "trusted",
    subcommands("add")
)]
pub async fn trusted_group(ctx: Context<'_>) -> Result<(), Error> {
    let trusted = queries::list_trusted_users(&ctx.data().pool).await?;
    let list = trusted
        .iter()
        .map(|id| format!("• <@{}>", id))
        .collect::<Vec<_>>()
        .join("\n");

    reply(ctx, create_info_embed("Trusted Admins", &list)).await
}

/// Add a network trusted admin
#[poise::command(prefix_command, guild_only, check = "trusted")]
pub async fn add(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;

    let embed = if queries::add_trusted_user(&ctx.data().pool, user_id.get() as i64).await? {
        tracing::info!("User {} trusted by {}", user_id, ctx.author().id);
        create_success_embed("User Trusted", &format!("<@{}> added to trusted list", user_id))
    } else {
        create_info_embed("Already Trusted", &format!("<@{}> is already trusted", user_id))
    };

    reply(ctx, embed).await
}
