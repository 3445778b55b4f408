pub mod member;
pub mod message;
pub mod reaction;

use crate::bot::{Data, Error};
use crate::database::queries;
use poise::serenity_prelude as serenity;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(
                "Bot logged in as {} in {} guilds",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );
            let loyal = queries::count_loyal_users(&data.pool).await?;
            let active = queries::count_active_loyal_users(&data.pool).await?;
            tracing::info!("Loyal members: {} ({} active)", loyal, active);
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            let guild_id = guild.id.get();
            let stored = queries::get_or_create_guild(
                &data.pool,
                guild_id as i64,
                &guild.name,
                data.config.is_hub(guild_id),
                &data.config.default_prefix,
            )
            .await?;
            if stored.name != guild.name {
                queries::update_guild_name(&data.pool, guild_id as i64, &guild.name).await?;
            }
            if is_new.unwrap_or(false) {
                tracing::info!("Joined new guild {} ({})", guild.name, guild_id);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = member::handle_member_join(ctx, new_member, data).await {
                tracing::error!("Error handling member join: {:?}", e);
            }
        }
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = message::handle_message(ctx, new_message, data).await {
                tracing::error!("Error handling message: {:?}", e);
            }
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            if let Err(e) = reaction::handle_reaction_add(ctx, add_reaction, data).await {
                tracing::error!("Error handling reaction: {:?}", e);
            }
        }
        _ => {}
    }
    Ok(())
}
