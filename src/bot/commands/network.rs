use crate::bot::commands::{
    admin_or_trusted, current_guild, parse_target_user, reply, send_module_help, trusted,
};
use crate::bot::{Context, Error};
use crate::database::queries;
use crate::utils::format::{
    HelpEntry, create_embed, create_error_embed, create_info_embed, create_success_embed,
    format_guild_config, network_footer,
};
use crate::utils::validation::{clamp_pick_amount, validate_prefix};
use poise::serenity_prelude as serenity;
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;

const HELP: [HelpEntry; 9] = [
    ("net guild", "Show this server's network settings"),
    ("net guild prefix <prefix>", "Change the command prefix"),
    ("net guild ann <#channel>", "Set the announcement channel"),
    ("net guild trust <@user>", "Trust a local admin"),
    ("net broadcast dm <msg>", "DM loyal members in this gateway"),
    ("net broadcast global <msg>", "DM all loyal members network-wide"),
    ("net invite", "Send the hub invite to loyal members"),
    ("net pick [amount]", "Pick random loyal members (1-10)"),
    ("net dm <user> <msg>", "DM a single user"),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// DMs every user the same embed, pausing `delay` between sends.
pub async fn deliver_dms(
    ctx: &serenity::Context,
    user_ids: &[i64],
    embed: serenity::CreateEmbed,
    delay: Duration,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for (index, user_id) in user_ids.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let message = serenity::CreateMessage::new().embed(embed.clone());
        match serenity::UserId::new(*user_id as u64)
            .direct_message(ctx, message)
            .await
        {
            Ok(_) => report.sent += 1,
            Err(e) => {
                tracing::warn!("Failed to DM user {}: {:?}", user_id, e);
                report.failed += 1;
            }
        }
    }

    report
}

fn delivery_summary(report: DeliveryReport) -> String {
    format!("✅ Sent: {}\n❌ Failed: {}", report.sent, report.failed)
}

/// Picks up to `amount` distinct ids.
pub fn pick_random<R: Rng + ?Sized>(ids: &[i64], amount: usize, rng: &mut R) -> Vec<i64> {
    ids.choose_multiple(rng, amount).copied().collect()
}

/// Network module: broadcasts, invites and guild settings
#[poise::command(
    prefix_command,
    guild_only,
    rename = "net",
    aliases("network"),
    subcommands("guild_settings", "broadcast", "invite", "pick", "dm")
)]
pub async fn network(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "🌐 Network Module", &HELP).await
}

/// Show this server's network settings
#[poise::command(
    prefix_command,
    guild_only,
    rename = "guild",
    check = "admin_or_trusted",
    subcommands("prefix", "ann", "trust", "untrust")
)]
pub async fn guild_settings(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    let local_trusted = queries::list_local_trusted(&ctx.data().pool, guild.guild_id).await?;

    reply(
        ctx,
        create_info_embed(
            &format!("{} Settings", guild.name),
            &format_guild_config(&guild, &local_trusted),
        ),
    )
    .await
}

/// Change the command prefix
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn prefix(ctx: Context<'_>, prefix: String) -> Result<(), Error> {
    if let Err(e) = validate_prefix(&prefix) {
        return reply(ctx, create_error_embed("Invalid Prefix", &e.to_string())).await;
    }

    let guild = current_guild(ctx).await?;
    queries::set_guild_prefix(&ctx.data().pool, guild.guild_id, &prefix).await?;
    tracing::info!("Guild {} prefix set to {}", guild.guild_id, prefix);

    reply(ctx, create_success_embed("Prefix Updated", &format!("New prefix: `{}`", prefix))).await
}

/// Set the announcement channel
#[poise::command(prefix_command, guild_only, aliases("announcement"), check = "admin_or_trusted")]
pub async fn ann(ctx: Context<'_>, channel: serenity::GuildChannel) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    queries::set_announcement_channel(&ctx.data().pool, guild.guild_id, channel.id.get() as i64)
        .await?;

    reply(
        ctx,
        create_success_embed(
            "Announcement Channel Set",
            &format!("Announcements will go to <#{}>", channel.id),
        ),
    )
    .await
}

/// Trust a local admin for this server
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn trust(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    let guild = current_guild(ctx).await?;

    let added = queries::add_local_trusted(&ctx.data().pool, guild.guild_id, user_id.get() as i64).await?;
    let embed = if added {
        create_success_embed("Trusted", &format!("<@{}> is now trusted in this server", user_id))
    } else {
        create_info_embed("Already Trusted", &format!("<@{}> is already trusted here", user_id))
    };

    reply(ctx, embed).await
}

/// Revoke local trust
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn untrust(ctx: Context<'_>, user: String) -> Result<(), Error> {
    let user_id = parse_target_user(&user)?;
    let guild = current_guild(ctx).await?;

    let removed =
        queries::remove_local_trusted(&ctx.data().pool, guild.guild_id, user_id.get() as i64).await?;
    let embed = if removed {
        create_success_embed("Trust Removed", &format!("<@{}> is no longer trusted here", user_id))
    } else {
        create_error_embed("Not Trusted", &format!("<@{}> was not trusted here", user_id))
    };

    reply(ctx, embed).await
}

/// Broadcast messages to loyal members
#[poise::command(
    prefix_command,
    guild_only,
    aliases("bc"),
    check = "admin_or_trusted",
    subcommands("broadcast_dm", "broadcast_global")
)]
pub async fn broadcast(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = crate::bot::commands::guild_prefix(ctx).await?;
    reply(
        ctx,
        create_info_embed(
            "Broadcast Help",
            &format!(
                "`{p}net broadcast dm <msg>` - This gateway\n`{p}net broadcast global <msg>` - All servers",
                p = prefix
            ),
        ),
    )
    .await
}

/// DM loyal members whose main server is this one
#[poise::command(prefix_command, guild_only, rename = "dm", check = "admin_or_trusted")]
pub async fn broadcast_dm(ctx: Context<'_>, #[rest] message: String) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    let recipients: Vec<i64> = queries::list_loyal_users_in_guild(&ctx.data().pool, guild.guild_id)
        .await?
        .into_iter()
        .map(|user| user.user_id)
        .collect();

    let embed = create_embed(&format!("Message from {}", guild.name), &message)
        .footer(network_footer(Some(&guild.name), &ctx.data().config.network_name));
    let report = deliver_dms(
        ctx.serenity_context(),
        &recipients,
        embed,
        Duration::from_millis(ctx.data().config.broadcast_delay_ms),
    )
    .await;
    tracing::info!("Local broadcast in guild {}: {:?}", guild.guild_id, report);

    reply(ctx, create_success_embed("Broadcast Complete", &delivery_summary(report))).await
}

/// DM every loyal member in the network
#[poise::command(prefix_command, guild_only, rename = "global", check = "trusted")]
pub async fn broadcast_global(ctx: Context<'_>, #[rest] message: String) -> Result<(), Error> {
    let recipients: Vec<i64> = queries::list_loyal_users(&ctx.data().pool)
        .await?
        .into_iter()
        .map(|user| user.user_id)
        .collect();

    let embed = create_embed("🌐 Network-Wide Message", &message)
        .footer(network_footer(None, &ctx.data().config.network_name));
    let report = deliver_dms(
        ctx.serenity_context(),
        &recipients,
        embed,
        Duration::from_millis(ctx.data().config.broadcast_delay_ms),
    )
    .await;
    tracing::info!("Global broadcast: {:?}", report);

    reply(ctx, create_success_embed("Global Broadcast Complete", &delivery_summary(report))).await
}

/// Send the hub invite to this gateway's loyal members
#[poise::command(prefix_command, guild_only, aliases("inv"), check = "admin_or_trusted")]
pub async fn invite(ctx: Context<'_>) -> Result<(), Error> {
    let guild = current_guild(ctx).await?;
    if guild.is_hub {
        return reply(
            ctx,
            create_error_embed("Cannot Use in Hub", "This command is for gateway servers only"),
        )
        .await;
    }

    let config = &ctx.data().config;
    let Some(hub_invite) = config.hub_invite.as_deref() else {
        return reply(
            ctx,
            create_error_embed("No Hub Invite", "The network has no main hub invite configured."),
        )
        .await;
    };

    let recipients: Vec<i64> = queries::list_loyal_users_in_guild(&ctx.data().pool, guild.guild_id)
        .await?
        .into_iter()
        .map(|user| user.user_id)
        .collect();
    let embed = create_embed(
        &format!("🏢 Join {}", config.main_hub_name),
        &format!("You're invited to the {} main hub!\n\n{}", config.network_name, hub_invite),
    )
    .footer(network_footer(Some(&guild.name), &config.network_name));

    let report = deliver_dms(
        ctx.serenity_context(),
        &recipients,
        embed,
        Duration::from_millis(config.broadcast_delay_ms),
    )
    .await;

    reply(ctx, create_success_embed("Invites Sent", &delivery_summary(report))).await
}

/// Pick random loyal members
#[poise::command(prefix_command, guild_only, check = "admin_or_trusted")]
pub async fn pick(ctx: Context<'_>, amount: Option<usize>) -> Result<(), Error> {
    let amount = clamp_pick_amount(amount);
    let loyal: Vec<i64> = queries::list_loyal_users(&ctx.data().pool)
        .await?
        .into_iter()
        .map(|user| user.user_id)
        .collect();

    if loyal.len() < amount {
        return reply(
            ctx,
            create_error_embed(
                "Not Enough Members",
                &format!("Only {} loyal members available", loyal.len()),
            ),
        )
        .await;
    }

    let picked = pick_random(&loyal, amount, &mut rand::thread_rng());
    let text = picked
        .iter()
        .map(|id| format!("• <@{}>", id))
        .collect::<Vec<_>>()
        .join("\n");

    reply(ctx, create_info_embed(&format!("🎲 Random Pick ({})", amount), &text)).await
}

fn find_member_by_name(ctx: Context<'_>, query: &str) -> Option<serenity::UserId> {
    let query = query.to_lowercase();
    ctx.guild().and_then(|guild| {
        guild
            .members
            .values()
            .find(|member| member.user.name.to_lowercase().contains(&query))
            .map(|member| member.user.id)
    })
}

/// DM a single user by id, mention or name
#[poise::command(prefix_command, guild_only, aliases("message"), check = "admin_or_trusted")]
pub async fn dm(ctx: Context<'_>, user: String, #[rest] message: String) -> Result<(), Error> {
    let target = parse_target_user(&user)
        .ok()
        .or_else(|| find_member_by_name(ctx, &user));
    let Some(target) = target else {
        return reply(ctx, create_error_embed("User Not Found", "Could not find user")).await;
    };

    let guild = current_guild(ctx).await?;
    let embed = create_embed(&format!("Message from {}", guild.name), &message)
        .footer(network_footer(Some(&guild.name), &ctx.data().config.network_name));

    let embed = match target
        .direct_message(ctx.serenity_context(), serenity::CreateMessage::new().embed(embed))
        .await
    {
        Ok(_) => create_success_embed("Message Sent", &format!("DM sent to <@{}>", target)),
        Err(e) => {
            tracing::warn!("Failed to DM user {}: {:?}", target, e);
            create_error_embed("Failed", "Could not DM that user (DMs may be closed)")
        }
    };

    reply(ctx, embed).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn pick_returns_distinct_members() {
        let ids: Vec<i64> = (1..=20).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let mut picked = pick_random(&ids, 10, &mut rng);
        assert_eq!(picked.len(), 10);
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 10);
        assert!(picked.iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn pick_never_exceeds_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_random(&[5, 6], 10, &mut rng).len(), 2);
    }

    #[test]
    fn summary_reports_both_counts() {
        let text = delivery_summary(DeliveryReport { sent: 3, failed: 1 });
        assert_eq!(text, "✅ Sent: 3\n❌ Failed: 1");
    }
}
