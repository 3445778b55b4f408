use crate::bot::Data;
use crate::database::queries;
use crate::utils::format::{create_success_embed, network_footer, welcome_dm};
use crate::utils::time::get_current_date_utc;
use anyhow::Result;
use poise::serenity_prelude as serenity;

pub const CREED_EMOJI: &str = "✅";

/// Opts a member in when they react to their guild's creed message.
pub async fn handle_reaction_add(
    ctx: &serenity::Context,
    reaction: &serenity::Reaction,
    data: &Data,
) -> Result<()> {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id == ctx.cache.current_user().id || !reaction.emoji.unicode_eq(CREED_EMOJI) {
        return Ok(());
    }
    if reaction.member.as_ref().is_some_and(|member| member.user.bot) {
        return Ok(());
    }

    let Some(guild) = queries::get_guild(&data.pool, guild_id.get() as i64).await? else {
        return Ok(());
    };
    if guild.creed_message_id != Some(reaction.message_id.get() as i64) {
        return Ok(());
    }

    if !queries::is_system_active(&data.pool).await? {
        return Ok(());
    }
    if queries::is_blacklisted(&data.pool, user_id.get() as i64).await? {
        tracing::info!("Ignoring creed reaction from blacklisted user {}", user_id);
        return Ok(());
    }

    let Some(user) = data
        .tracker()
        .opt_in(
            user_id.get() as i64,
            guild.guild_id,
            &guild.name,
            get_current_date_utc(),
        )
        .await?
    else {
        return Ok(());
    };

    if let Some(role_id) = guild.loyal_role_id {
        if let Err(e) = ctx
            .http
            .add_member_role(
                guild_id,
                user_id,
                serenity::RoleId::new(role_id as u64),
                Some("Loyalty opt-in"),
            )
            .await
        {
            tracing::warn!("Failed to grant loyalty role to {}: {:?}", user_id, e);
        }
    }

    let in_hub = match data.config.main_hub_id {
        Some(hub_id) => ctx
            .cache
            .guild(serenity::GuildId::new(hub_id))
            .is_some_and(|hub| hub.members.contains_key(&user_id)),
        None => false,
    };
    let hub_line = if in_hub {
        "✅ You're already in the main hub!".to_string()
    } else {
        format!("📨 Watch for invites to join **{}**", data.config.main_hub_name)
    };

    let embed = create_success_embed(
        "Welcome!",
        &format!(
            "{}\n\nStay active to build your streak ({} messages per streak). \
             Your loyalty status is tracked network-wide.\n{}",
            welcome_dm(&guild.name, &data.config.network_name),
            data.config.streak_threshold,
            hub_line
        ),
    )
    .footer(network_footer(Some(&guild.name), &data.config.network_name));

    if let Err(e) = user_id
        .direct_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await
    {
        tracing::warn!("Failed to send welcome DM to {}: {:?}", user.user_id, e);
    }

    Ok(())
}
