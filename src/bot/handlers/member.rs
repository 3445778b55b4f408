use crate::bot::Data;
use crate::database::queries;
use anyhow::Result;
use poise::serenity_prelude as serenity;

/// Blacklisted users are banned from any network guild they join.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<()> {
    if member.user.bot {
        return Ok(());
    }

    if !queries::is_blacklisted(&data.pool, member.user.id.get() as i64).await? {
        return Ok(());
    }

    match member
        .guild_id
        .ban_with_reason(ctx, member.user.id, 0, "Global blacklist - Auto-ban on join")
        .await
    {
        Ok(()) => tracing::info!(
            "Auto-banned blacklisted user {} from guild {}",
            member.user.id,
            member.guild_id
        ),
        Err(e) => tracing::warn!(
            "Failed to auto-ban blacklisted user {} from guild {}: {:?}",
            member.user.id,
            member.guild_id,
            e
        ),
    }

    Ok(())
}
