use crate::bot::commands::{admin_or_trusted, current_guild, ensure_system_active, reply, send_module_help};
use crate::bot::handlers::reaction::CREED_EMOJI;
use crate::bot::{Context, Data, Error};
use crate::database::models::{GuildRecord, UserRecord};
use crate::database::queries;
use crate::utils::format::{
    HelpEntry, create_dashboard_embed, create_embed, create_error_embed, create_info_embed,
    create_profile_embed, create_setup_embed, create_success_embed, format_leaderboard,
    network_footer,
};
use crate::utils::setup_wizard::{SetupAnswers, WizardStep};
use crate::utils::time::get_current_date_utc;
use crate::utils::validation::normalize_leaderboard_size;
use anyhow::Result;
use poise::serenity_prelude as serenity;

const HELP: [HelpEntry; 7] = [
    ("l creed <#channel> <text>", "Post the creed message members react to"),
    ("l leaderboard <#channel> [5|10]", "Create the leaderboard dashboard"),
    ("l refresh", "Refresh the leaderboard now"),
    ("l role <@role>", "Set the loyalty role"),
    ("l setup", "Guided setup wizard"),
    ("l user stats [@user]", "Show a loyalty profile"),
    ("l user leave", "Leave the loyalty network"),
];

/// Loyalty module: creed, roles and leaderboards
#[poise::command(
    prefix_command,
    guild_only,
    rename = "l",
    aliases("loyalty"),
    subcommands("creed", "leaderboard", "refresh", "role", "setup", "user")
)]
pub async fn loyalty(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "🛡️ Loyalty Module", &HELP).await
}

/// Posts the creed embed and seeds it with the opt-in reaction.
pub async fn post_creed(
    ctx: &serenity::Context,
    channel_id: serenity::ChannelId,
    guild_name: &str,
    network_name: &str,
    text: &str,
) -> Result<serenity::Message> {
    let embed = create_embed(
        "📜 Creed",
        &format!("{}\n\nReact with {} to join the loyalty network.", text, CREED_EMOJI),
    )
    .footer(network_footer(Some(guild_name), network_name));

    let message = channel_id
        .send_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await?;
    message
        .react(ctx, serenity::ReactionType::Unicode(CREED_EMOJI.to_string()))
        .await?;

    Ok(message)
}

/// Applies the answers of a completed setup wizard.
pub async fn finish_setup(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    answers: &SetupAnswers,
    data: &Data,
) -> Result<serenity::CreateEmbed> {
    let name = guild_id.name(&ctx.cache).unwrap_or_else(|| "Unknown".to_string());
    queries::get_or_create_guild(
        &data.pool,
        guild_id.get() as i64,
        &name,
        data.config.is_hub(guild_id.get()),
        &data.config.default_prefix,
    )
    .await?;

    let channel_id = serenity::ChannelId::new(answers.creed_channel_id);
    let creed = match post_creed(ctx, channel_id, &name, &data.config.network_name, &answers.creed_text).await {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Setup could not post creed in {}: {:?}", channel_id, e);
            return Ok(create_error_embed(
                "Setup Failed",
                &format!("Could not post the creed in <#{}>. Check my permissions there.", channel_id),
            ));
        }
    };

    queries::apply_setup(
        &data.pool,
        guild_id.get() as i64,
        channel_id.get() as i64,
        creed.id.get() as i64,
        answers.role_id as i64,
        answers.backup_invite.as_deref(),
    )
    .await?;
    tracing::info!("Completed loyalty setup for guild {}", guild_id);

    Ok(create_success_embed(
        "Setup Complete",
        &format!(
            "**Creed:** posted in <#{}>\n**Loyalty Role:** <@&{}>\n**Backup Invite:** {}",
            channel_id,
            answers.role_id,
            answers.backup_invite.as_deref().unwrap_or("None")
        ),
    )
    .footer(network_footer(Some(&name), &data.config.network_name)))
}

fn display_name(cache: &serenity::Cache, guild_id: serenity::GuildId, user_id: serenity::UserId) -> String {
    cache
        .guild(guild_id)
        .and_then(|guild| {
            guild
                .members
                .get(&user_id)
                .map(|member| member.display_name().to_string())
        })
        .or_else(|| cache.user(user_id).map(|user| user.name.clone()))
        .unwrap_or_else(|| format!("User {}", user_id))
}

pub async fn render_dashboard(
    cache: &serenity::Cache,
    data: &Data,
    guild: &GuildRecord,
) -> Result<serenity::CreateEmbed> {
    let guild_id = serenity::GuildId::new(guild.guild_id as u64);
    let top = queries::top_loyal_users(&data.pool, guild.leaderboard_size).await?;
    let entries: Vec<(String, &UserRecord)> = top
        .iter()
        .map(|user| {
            let user_id = serenity::UserId::new(user.user_id as u64);
            (display_name(cache, guild_id, user_id), user)
        })
        .collect();

    let loyal = queries::count_loyal_users(&data.pool).await?;
    let active = queries::count_active_loyal_users(&data.pool).await?;

    Ok(create_dashboard_embed(
        &guild.name,
        &data.config.network_name,
        loyal,
        active,
        &format_leaderboard(&entries),
    ))
}

/// Re-renders a guild's dashboard, reposting it if the old message is gone.
/// Returns `false` when the guild has no dashboard configured.
pub async fn refresh_dashboard(
    ctx: &serenity::Context,
    data: &Data,
    guild: &GuildRecord,
) -> Result<bool> {
    let Some(channel_id) = guild.dashboard_channel_id else {
        return Ok(false);
    };
    let channel_id = serenity::ChannelId::new(channel_id as u64);
    let embed = render_dashboard(&ctx.cache, data, guild).await?;

    if let Some(message_id) = guild.dashboard_msg_id {
        let edited = channel_id
            .edit_message(
                ctx,
                serenity::MessageId::new(message_id as u64),
                serenity::EditMessage::new().embed(embed.clone()),
            )
            .await;
        match edited {
            Ok(_) => return Ok(true),
            Err(e) => tracing::warn!(
                "Dashboard message in guild {} could not be edited, reposting: {:?}",
                guild.guild_id,
                e
            ),
        }
    }

    let message = channel_id
        .send_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await?;
    queries::set_dashboard_message(&data.pool, guild.guild_id, message.id.get() as i64).await?;
    Ok(true)
}

/// Post the creed message
#[poise::command(prefix_command, guild_only, aliases("c"), check = "admin_or_trusted")]
pub async fn creed(
    ctx: Context<'_>,
    channel: serenity::GuildChannel,
    #[rest] text: String,
) -> Result<(), Error> {
    if !ensure_system_active(ctx).await? {
        return Ok(());
    }
    let guild = current_guild(ctx).await?;

    let message = match post_creed(
        ctx.serenity_context(),
        channel.id,
        &guild.name,
        &ctx.data().config.network_name,
        &text,
    )
    .await
    {
        Ok(message) => message,
        Err(e) => {
            reply(ctx, create_error_embed("Error", &format!("Failed to set creed: {}", e))).await?;
            return Ok(());
        }
    };

    queries::set_creed(
        &ctx.data().pool,
        guild.guild_id,
        channel.id.get() as i64,
        message.id.get() as i64,
    )
    .await?;

    reply(
        ctx,
        create_success_embed("Creed Message Set", &format!("Creed message posted in <#{}>", channel.id)),
    )
    .await
}

/// Create the leaderboard dashboard
#[poise::command(prefix_command, guild_only, aliases("lb"), check = "admin_or_trusted")]
pub async fn leaderboard(
    ctx: Context<'_>,
    channel: serenity::GuildChannel,
    size: Option<u32>,
) -> Result<(), Error> {
    let mut guild = current_guild(ctx).await?;
    guild.leaderboard_size = normalize_leaderboard_size(size);

    let embed = render_dashboard(ctx.cache(), ctx.data(), &guild).await?;
    let message = match channel
        .id
        .send_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await
    {
        Ok(message) => message,
        Err(e) => {
            reply(ctx, create_error_embed("Error", &format!("Failed to set leaderboard: {}", e)))
                .await?;
            return Ok(());
        }
    };

    queries::set_dashboard(
        &ctx.data().pool,
        guild.guild_id,
        channel.id.get() as i64,
        message.id.get() as i64,
        guild.leaderboard_size,
    )
    .await?;

    reply(
        ctx,
        create_success_embed(
            "Leaderboard Set",
            &format!(
                "Leaderboard dashboard set in <#{}>\nShowing top {}",
                channel.id, guild.leaderboard_size
            ),
        ),
    )
    .await
}

/// Refresh the leaderboard now
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn refresh(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;

    let embed = match refresh_dashboard(ctx.serenity_context(), ctx.data(), &guild).await {
        Ok(true) => create_success_embed("Leaderboard Refreshed", "Leaderboard updated successfully"),
        Ok(false) => create_error_embed(
            "Not Configured",
            "Leaderboard not yet configured. Use `l leaderboard` first.",
        ),
        Err(e) => create_error_embed("Error", &format!("Failed to refresh leaderboard: {}", e)),
    };

    reply(ctx, embed).await
}

/// Set the loyalty role
#[poise::command(prefix_command, guild_only, aliases("r"), check = "admin_or_trusted")]
pub async fn role(ctx: Context<'_>, role: serenity::Role) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    queries::set_loyal_role(&ctx.data().pool, guild.guild_id, role.id.get() as i64).await?;

    reply(
        ctx,
        create_success_embed("Loyalty Role Set", &format!("Loyalty role updated to <@&{}>", role.id)),
    )
    .await
}

/// Guided four-step setup
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn setup(ctx: Context<'_>) -> Result<(), Error> {
    if !ensure_system_active(ctx).await? {
        return Ok(());
    }
    let guild = current_guild(ctx).await?;

    let replaced = {
        let mut wizards = ctx
            .data()
            .wizards
            .lock()
            .map_err(|_| "setup wizard lock poisoned")?;
        wizards.start(
            guild.guild_id as u64,
            ctx.author().id.get(),
            ctx.channel_id().get(),
        )
    };

    let note = replaced.then_some("A previous setup session for this server was replaced.");
    reply(ctx, create_setup_embed(WizardStep::CreedText, note)).await
}

/// Your loyalty profile
#[poise::command(prefix_command, guild_only, aliases("u"), subcommands("stats", "leave"))]
pub async fn user(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = crate::bot::commands::guild_prefix(ctx).await?;
    reply(
        ctx,
        create_info_embed(
            "User Commands",
            &format!("Use `{p}l user stats [@user]` or `{p}l user leave`", p = prefix),
        ),
    )
    .await
}

/// Show a loyalty profile
#[poise::command(prefix_command, guild_only, aliases("s", "info"))]
pub async fn stats(ctx: Context<'_>, member: Option<serenity::Member>) -> Result<(), Error> {
    let (user_id, name) = match &member {
        Some(member) => (member.user.id, member.display_name().to_string()),
        None => (ctx.author().id, ctx.author().name.clone()),
    };

    let record = queries::get_user(&ctx.data().pool, user_id.get() as i64)
        .await?
        .unwrap_or_else(|| UserRecord::new(user_id.get() as i64));

    reply(ctx, create_profile_embed(&name, &record)).await
}

/// Leave the loyalty network
#[poise::command(prefix_command, guild_only)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    let author_id = ctx.author().id;

    let left = ctx
        .data()
        .tracker()
        .leave(author_id.get() as i64, get_current_date_utc())
        .await?;
    if !left {
        return reply(
            ctx,
            create_info_embed("Not a Member", "You are not part of the loyalty network."),
        )
        .await;
    }

    if let Some(role_id) = guild.loyal_role_id {
        if let Err(e) = ctx
            .http()
            .remove_member_role(
                serenity::GuildId::new(guild.guild_id as u64),
                author_id,
                serenity::RoleId::new(role_id as u64),
                Some("Left the loyalty network"),
            )
            .await
        {
            tracing::warn!("Failed to remove loyalty role from {}: {:?}", author_id, e);
        }
    }

    reply(ctx, create_success_embed("Left Network", "You have left the loyalty network.")).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creed_answers_to_short_alias() {
        let module = loyalty();
        let creed = module
            .subcommands
            .iter()
            .find(|command| command.name == "creed")
            .unwrap();

        assert!(creed.aliases.iter().any(|alias| alias == "c"));
    }
}
