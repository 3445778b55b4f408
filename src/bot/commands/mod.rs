pub mod loyalty;
pub mod network;
pub mod security;
pub mod server;
pub mod sudo;

use crate::bot::{Context, Error};
use crate::database::queries;
use crate::utils::format::{HelpEntry, create_info_embed, create_warning_embed, format_module_help, network_footer};
use crate::utils::permissions::{AccessLevel, access_level};
use poise::serenity_prelude as serenity;

async fn is_guild_admin(ctx: Context<'_>) -> bool {
    let Some(member) = ctx.author_member().await else {
        return false;
    };
    ctx.guild()
        .map(|guild| guild.member_permissions(&member).administrator())
        .unwrap_or(false)
}

pub async fn caller_access(ctx: Context<'_>) -> Result<AccessLevel, Error> {
    let is_admin = is_guild_admin(ctx).await;
    let level = access_level(
        &ctx.data().pool,
        ctx.data().config.owner_id,
        ctx.guild_id().map(|id| id.get()),
        ctx.author().id.get(),
        is_admin,
    )
    .await?;

    Ok(level)
}

/// Guild administrators, local trusted admins and network trusted users.
pub async fn admin_or_trusted(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(caller_access(ctx).await?.can_administer())
}

pub async fn trusted(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(caller_access(ctx).await?.is_network_trusted())
}

pub async fn owner(ctx: Context<'_>) -> Result<bool, Error> {
    Ok(ctx.author().id.get() == ctx.data().config.owner_id)
}

pub fn footer(ctx: Context<'_>) -> serenity::CreateEmbedFooter {
    let guild_name = ctx.guild_id().and_then(|id| id.name(ctx.cache()));
    network_footer(guild_name.as_deref(), &ctx.data().config.network_name)
}

pub async fn reply(ctx: Context<'_>, embed: serenity::CreateEmbed) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().embed(embed.footer(footer(ctx))))
        .await?;
    Ok(())
}

pub async fn guild_prefix(ctx: Context<'_>) -> Result<String, Error> {
    let stored = match ctx.guild_id() {
        Some(guild_id) => queries::get_guild_prefix(&ctx.data().pool, guild_id.get() as i64).await?,
        None => None,
    };
    Ok(stored.unwrap_or_else(|| ctx.data().config.default_prefix.clone()))
}

pub async fn send_module_help(
    ctx: Context<'_>,
    title: &str,
    entries: &[HelpEntry],
) -> Result<(), Error> {
    let prefix = guild_prefix(ctx).await?;
    reply(ctx, create_info_embed(title, &format_module_help(&prefix, entries))).await
}

/// Replies with a notice and returns `false` while the loyalty system is stopped.
pub async fn ensure_system_active(ctx: Context<'_>) -> Result<bool, Error> {
    if queries::is_system_active(&ctx.data().pool).await? {
        return Ok(true);
    }

    reply(
        ctx,
        create_warning_embed(
            "System Paused",
            "The loyalty system is currently stopped by a network administrator.",
        ),
    )
    .await?;
    Ok(false)
}

/// Makes sure the invoking guild has a stored record.
pub async fn current_guild(
    ctx: Context<'_>,
) -> Result<crate::database::models::GuildRecord, Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command can only be used in a server.")?;
    let name = guild_id
        .name(ctx.cache())
        .unwrap_or_else(|| "Unknown".to_string());
    let guild = queries::get_or_create_guild(
        &ctx.data().pool,
        guild_id.get() as i64,
        &name,
        ctx.data().config.is_hub(guild_id.get()),
        &ctx.data().config.default_prefix,
    )
    .await?;

    Ok(guild)
}

/// Accepts a mention or a raw id.
pub fn parse_target_user(input: &str) -> Result<serenity::UserId, Error> {
    crate::utils::setup_wizard::parse_user_ref(input)
        .map(serenity::UserId::new)
        .ok_or_else(|| format!("`{}` is not a valid user id", input.trim()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_user_accepts_mentions_and_ids() {
        assert_eq!(parse_target_user("<@!12>").unwrap().get(), 12);
        assert_eq!(parse_target_user("12").unwrap().get(), 12);
        assert!(parse_target_user("someone").is_err());
    }
}
