use crate::bot::commands::{admin_or_trusted, current_guild, reply, send_module_help};
use crate::bot::{Context, Error};
use crate::database::queries;
use crate::utils::format::{
    HelpEntry, create_embed, create_error_embed, create_info_embed, create_success_embed,
    format_bulk_result, format_guild_config, network_footer,
};
use crate::utils::validation::validate_server_name;
use poise::serenity_prelude as serenity;

const HELP: [HelpEntry; 5] = [
    ("s name <name>", "Rename this server"),
    ("s leave", "Remove this server from the network"),
    ("s gate lock", "Stop @everyone from talking in every channel"),
    ("s gate nuke", "Delete every channel and leave a hub invite"),
    ("s config", "Show this server's network configuration"),
];

const INVITE_CHANNEL: &str = "hub-invite";

fn everyone_overwrite(
    guild_id: serenity::GuildId,
    allow: serenity::Permissions,
) -> serenity::PermissionOverwrite {
    serenity::PermissionOverwrite {
        allow,
        deny: serenity::Permissions::SEND_MESSAGES,
        kind: serenity::PermissionOverwriteType::Role(guild_id.everyone_role()),
    }
}

fn reset_notice(hub_invite: Option<&str>, backup_invite: Option<&str>) -> String {
    let mut lines = vec!["This server was reset.".to_string()];
    match hub_invite {
        Some(invite) => lines.push(format!("Join the main hub:\n{}", invite)),
        None => lines.push("Ask a network admin for the main hub invite.".to_string()),
    }
    if let Some(backup) = backup_invite {
        lines.push(format!("Backup server:\n{}", backup));
    }
    lines.join("\n\n")
}

/// Server module: naming, gating and configuration
#[poise::command(
    prefix_command,
    guild_only,
    rename = "s",
    aliases("server"),
    subcommands("name", "leave", "gate", "config")
)]
pub async fn server(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "🏢 Server Module", &HELP).await
}

/// Rename this server
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn name(ctx: Context<'_>, #[rest] name: String) -> Result<(), Error> {
    if let Err(e) = validate_server_name(&name) {
        return reply(ctx, create_error_embed("Invalid Name", &e.to_string())).await;
    }
    let guild = current_guild(ctx).await?;
    let guild_id = serenity::GuildId::new(guild.guild_id as u64);

    if let Err(e) = guild_id
        .edit(ctx, serenity::EditGuild::new().name(name.trim()))
        .await
    {
        tracing::warn!("Failed to rename guild {}: {:?}", guild_id, e);
        return reply(
            ctx,
            create_error_embed("Rename Failed", &format!("Failed to rename server: {}", e)),
        )
        .await;
    }
    queries::update_guild_name(&ctx.data().pool, guild.guild_id, name.trim()).await?;

    reply(
        ctx,
        create_success_embed("Server Renamed", &format!("'{}' → '{}'", guild.name, name.trim())),
    )
    .await
}

/// Remove this server from the network
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command can only be used in a server.")?;
    let guild_name = guild_id
        .name(ctx.cache())
        .unwrap_or_else(|| "This server".to_string());

    let embed = if queries::remove_guild(&ctx.data().pool, guild_id.get() as i64).await? {
        tracing::info!("Guild {} left the network (by {})", guild_id, ctx.author().id);
        create_success_embed(
            "Server Removed",
            &format!("{} has been removed from the network", guild_name),
        )
    } else {
        create_info_embed("Not in Network", "Server is not in the network")
    };

    reply(ctx, embed).await
}

/// Lock or nuke every channel
#[poise::command(prefix_command, guild_only, subcommands("lock", "nuke"), check = "admin_or_trusted")]
pub async fn gate(ctx: Context<'_>) -> Result<(), Error> {
    reply(ctx, create_error_embed("Invalid Action", "Use `lock` or `nuke`")).await
}

/// Deny @everyone from sending messages in every channel
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn lock(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command can only be used in a server.")?;
    let channels = guild_id.channels(ctx.http()).await?;

    let (mut locked, mut failed) = (0, 0);
    for channel_id in channels.keys() {
        let overwrite = everyone_overwrite(guild_id, serenity::Permissions::empty());
        match channel_id.create_permission(ctx.http(), overwrite).await {
            Ok(()) => locked += 1,
            Err(e) => {
                tracing::warn!("Failed to lock channel {}: {:?}", channel_id, e);
                failed += 1;
            }
        }
    }
    tracing::info!("Guild {} locked by {}", guild_id, ctx.author().id);

    reply(
        ctx,
        create_success_embed(
            "Server Locked",
            &format!(
                "Members can no longer send messages\n{}",
                format_bulk_result("Channels", locked, failed)
            ),
        ),
    )
    .await
}

/// Delete every channel and leave a locked hub invite channel
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn nuke(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    let guild_id = serenity::GuildId::new(guild.guild_id as u64);
    let channels = guild_id.channels(ctx.http()).await?;
    tracing::warn!(
        "Guild {} is being nuked by {} ({} channels)",
        guild_id,
        ctx.author().id,
        channels.len()
    );

    let (mut deleted, mut failed) = (0, 0);
    for channel_id in channels.keys() {
        match channel_id.delete(ctx).await {
            Ok(_) => deleted += 1,
            Err(e) => {
                tracing::warn!("Failed to delete channel {}: {:?}", channel_id, e);
                failed += 1;
            }
        }
    }

    let config = &ctx.data().config;
    let created = guild_id
        .create_channel(
            ctx,
            serenity::CreateChannel::new(INVITE_CHANNEL)
                .kind(serenity::ChannelType::Text)
                .permissions(vec![everyone_overwrite(
                    guild_id,
                    serenity::Permissions::VIEW_CHANNEL,
                )]),
        )
        .await;
    let channel = match created {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!("Failed to create {} channel in {}: {:?}", INVITE_CHANNEL, guild_id, e);
            return Ok(());
        }
    };

    let footer = network_footer(Some(&guild.name), &config.network_name);
    let notice = create_embed(
        &format!("🏢 Welcome to {}", config.network_name),
        &reset_notice(config.hub_invite.as_deref(), guild.backup_invite.as_deref()),
    )
    .footer(footer.clone());
    let summary = create_success_embed(
        "Server Nuked",
        &format!("Reset complete\n{}", format_bulk_result("Channels deleted", deleted, failed)),
    )
    .footer(footer);

    // The invoking channel is gone, so results go to the new channel.
    if let Err(e) = channel
        .id
        .send_message(ctx, serenity::CreateMessage::new().embed(notice).embed(summary))
        .await
    {
        tracing::warn!("Failed to post hub invite in {}: {:?}", channel.id, e);
    }

    Ok(())
}

/// Show this server's network configuration
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn config(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    let local_trusted = queries::list_local_trusted(&ctx.data().pool, guild.guild_id).await?;

    reply(
        ctx,
        create_info_embed(
            &format!("⚙️ {} Configuration", guild.name),
            &format_guild_config(&guild, &local_trusted),
        ),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_notice_lists_available_invites() {
        let notice = reset_notice(Some("https://discord.gg/hub"), Some("https://discord.gg/backup"));
        assert!(notice.contains("https://discord.gg/hub"));
        assert!(notice.contains("Backup server"));

        let bare = reset_notice(None, None);
        assert!(bare.contains("Ask a network admin"));
        assert!(!bare.contains("Backup"));
    }

    #[test]
    fn everyone_overwrite_denies_sending() {
        let guild_id = serenity::GuildId::new(42);
        let overwrite = everyone_overwrite(guild_id, serenity::Permissions::VIEW_CHANNEL);

        assert_eq!(overwrite.deny, serenity::Permissions::SEND_MESSAGES);
        assert_eq!(overwrite.allow, serenity::Permissions::VIEW_CHANNEL);
        assert_eq!(
            overwrite.kind,
            serenity::PermissionOverwriteType::Role(serenity::RoleId::new(42))
        );
    }
}
