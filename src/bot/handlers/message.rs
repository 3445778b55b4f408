use crate::bot::Data;
use crate::bot::commands::loyalty::finish_setup;
use crate::bot::tasks::loyal_role_guilds;
use crate::database::models::UserRecord;
use crate::database::queries;
use crate::utils::activity::{ActivityOutcome, MessageActivity};
use crate::utils::format::{create_embed, create_setup_embed, create_warning_embed, network_footer};
use crate::utils::setup_wizard::{SetupWizards, WizardReply};
use crate::utils::time::get_current_date_utc;
use anyhow::Result;
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Humans,
    Bots,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionQuery {
    Help,
    Count(CountKind),
    Stats,
}

/// Interprets what is left of a message after the bot mention.
pub fn classify_mention(rest: &str) -> MentionQuery {
    let rest = rest.to_lowercase();
    if rest.contains("help") {
        MentionQuery::Help
    } else if rest.contains("count") {
        if rest.contains("member") || rest.contains("human") {
            MentionQuery::Count(CountKind::Humans)
        } else if rest.contains("bot") {
            MentionQuery::Count(CountKind::Bots)
        } else {
            MentionQuery::Count(CountKind::All)
        }
    } else {
        MentionQuery::Stats
    }
}

/// Returns the text after a leading `<@id>` / `<@!id>` mention of `bot_id`.
pub fn strip_bot_mention(content: &str, bot_id: u64) -> Option<&str> {
    let content = content.trim_start();
    let plain = format!("<@{}>", bot_id);
    let nick = format!("<@!{}>", bot_id);
    content
        .strip_prefix(&plain)
        .or_else(|| content.strip_prefix(&nick))
        .map(str::trim)
}

/// The parts of a guild message that decide what happens to it.
#[derive(Debug, Clone)]
pub struct IncomingMessage<'a> {
    pub guild_id: u64,
    pub author_id: u64,
    pub channel_id: u64,
    pub content: &'a str,
    pub mention_count: usize,
}

/// Store lookups gathered before routing, so the wizard lock is never held across an await.
#[derive(Debug, Clone)]
pub struct MessageGates<'a> {
    pub prefix: &'a str,
    pub bot_id: u64,
    pub author_muted: bool,
    pub system_active: bool,
    pub author_blacklisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    DeleteMuted,
    /// Handled by the command framework; never tracked or fed to the wizard.
    Command,
    Wizard(WizardReply),
    Mention(MentionQuery),
    Ignore,
    Track,
}

/// Decides how a message is handled. Commands are recognised before the setup wizard sees
/// anything, so the `l setup` message that opens a session cannot answer its first step.
pub fn route(msg: &IncomingMessage, gates: &MessageGates, wizards: &mut SetupWizards) -> Route {
    if gates.author_muted {
        return Route::DeleteMuted;
    }
    if msg.content.starts_with(gates.prefix) {
        return Route::Command;
    }

    let reply = wizards.advance(msg.guild_id, msg.author_id, msg.channel_id, msg.content);
    if reply != WizardReply::Ignored {
        return Route::Wizard(reply);
    }

    if let Some(rest) = strip_bot_mention(msg.content, gates.bot_id) {
        if msg.mention_count == 1 {
            return Route::Mention(classify_mention(rest));
        }
    }

    if !gates.system_active || gates.author_blacklisted {
        return Route::Ignore;
    }
    Route::Track
}

pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let author_id = msg.author.id.get() as i64;

    let prefix = queries::get_guild_prefix(&data.pool, guild_id.get() as i64)
        .await?
        .unwrap_or_else(|| data.config.default_prefix.clone());
    let bot_id = ctx.cache.current_user().id.get();
    let gates = MessageGates {
        prefix: &prefix,
        bot_id,
        author_muted: queries::is_user_muted(&data.pool, author_id).await?,
        system_active: queries::is_system_active(&data.pool).await?,
        author_blacklisted: queries::is_blacklisted(&data.pool, author_id).await?,
    };
    let incoming = IncomingMessage {
        guild_id: guild_id.get(),
        author_id: msg.author.id.get(),
        channel_id: msg.channel_id.get(),
        content: &msg.content,
        mention_count: msg.mentions.len(),
    };

    let decision = {
        let mut wizards = data
            .wizards
            .lock()
            .map_err(|_| anyhow::anyhow!("setup wizard lock poisoned"))?;
        route(&incoming, &gates, &mut wizards)
    };

    match decision {
        Route::DeleteMuted => {
            if let Err(e) = msg.delete(ctx).await {
                tracing::warn!("Failed to delete message from muted user {}: {:?}", author_id, e);
            }
        }
        Route::Command | Route::Ignore => {}
        Route::Wizard(reply) => handle_wizard_reply(ctx, msg, guild_id, reply, data).await?,
        Route::Mention(query) => answer_mention(ctx, msg, guild_id, query, data).await?,
        Route::Track => {
            let activity = MessageActivity {
                guild_id: guild_id.get() as i64,
                guild_name: guild_id.name(&ctx.cache),
                date: get_current_date_utc(),
            };
            let (user, outcome) = data.tracker().record_message(author_id, &activity).await?;
            let guilds = role_restore_guilds(&user, &outcome);
            if !guilds.is_empty() {
                restore_loyal_role(ctx, data, user.user_id, guilds).await?;
            }
        }
    }

    Ok(())
}

/// Guilds whose loyalty role should come back after this message. Only a loyal user
/// returning from inactivity gets any.
fn role_restore_guilds(user: &UserRecord, outcome: &ActivityOutcome) -> Vec<i64> {
    if outcome.reactivated && user.is_loyal {
        loyal_role_guilds(user)
    } else {
        Vec::new()
    }
}

/// Gives back the loyalty role the inactivity sweep took away.
async fn restore_loyal_role(
    ctx: &serenity::Context,
    data: &Data,
    user_id: i64,
    guilds: Vec<i64>,
) -> Result<()> {
    let user_id = serenity::UserId::new(user_id as u64);

    for guild_id in guilds {
        let Some(role_id) = queries::get_guild(&data.pool, guild_id)
            .await?
            .and_then(|guild| guild.loyal_role_id)
        else {
            continue;
        };
        if let Err(e) = ctx
            .http
            .add_member_role(
                serenity::GuildId::new(guild_id as u64),
                user_id,
                serenity::RoleId::new(role_id as u64),
                Some("Loyal member active again"),
            )
            .await
        {
            tracing::warn!("Failed to restore role for {} in {}: {:?}", user_id, guild_id, e);
        }
    }

    tracing::info!("User {} is active again", user_id);
    Ok(())
}

async fn handle_wizard_reply(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: serenity::GuildId,
    reply: WizardReply,
    data: &Data,
) -> Result<()> {
    let embed = match reply {
        WizardReply::Ignored => return Ok(()),
        WizardReply::Next(step) => create_setup_embed(step, Some("✅ Saved.")),
        WizardReply::Rejected { step, reason } => create_setup_embed(step, Some(reason.as_str())),
        WizardReply::Cancelled => create_warning_embed("Setup Cancelled", "No changes were saved."),
        WizardReply::Completed(answers) => {
            finish_setup(ctx, guild_id, &answers, data).await?
        }
    };

    msg.channel_id
        .send_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

async fn answer_mention(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: serenity::GuildId,
    query: MentionQuery,
    data: &Data,
) -> Result<()> {
    let guild_name = guild_id.name(&ctx.cache);
    let prefix = queries::get_guild_prefix(&data.pool, guild_id.get() as i64)
        .await?
        .unwrap_or_else(|| data.config.default_prefix.clone());

    let embed = match query {
        MentionQuery::Help => create_embed(
            &format!("🌐 {}", data.config.network_name),
            &format!(
                "**Prefix:** `{p}` (customizable per server)\n\n**Available Modules:**\n\
                 `{p}l` - Loyalty (creed, roles, leaderboards)\n\
                 `{p}net` - Network (broadcasts, invites, config)\n\
                 `{p}sec` - Security (bans, timeouts, system control)\n\
                 `{p}s` - Server (management, gate controls)\n\
                 `{p}su` - Sudo (owner-only admin tools)\n\n\
                 *Use `{p}<module>` to see module commands*",
                p = prefix
            ),
        ),
        MentionQuery::Count(kind) => {
            let (total, bots) = msg
                .guild(&ctx.cache)
                .map(|guild| {
                    let bots = guild.members.values().filter(|m| m.user.bot).count() as u64;
                    (guild.member_count, bots)
                })
                .unwrap_or((0, 0));
            let humans = total.saturating_sub(bots);
            match kind {
                CountKind::Humans => {
                    create_embed("👥 Member Count", &format!("**Human Members:** {}", humans))
                }
                CountKind::Bots => create_embed("🤖 Bot Count", &format!("**Bots:** {}", bots)),
                CountKind::All => create_embed(
                    "📊 Server Count",
                    &format!(
                        "**Total Members:** {}\n**Humans:** {}\n**Bots:** {}",
                        total, humans, bots
                    ),
                ),
            }
        }
        MentionQuery::Stats => {
            let stored = queries::get_or_create_guild(
                &data.pool,
                guild_id.get() as i64,
                guild_name.as_deref().unwrap_or("Unknown"),
                data.config.is_hub(guild_id.get()),
                &data.config.default_prefix,
            )
            .await?;
            let members = msg
                .guild(&ctx.cache)
                .map(|guild| guild.member_count)
                .unwrap_or(0);
            let loyal_here = queries::count_loyal_in_guild(&data.pool, guild_id.get() as i64).await?;
            let loyal = queries::count_loyal_users(&data.pool).await?;
            let active = queries::count_active_loyal_users(&data.pool).await?;
            create_embed(
                &format!("📊 {}", guild_name.as_deref().unwrap_or("Server")),
                &format!(
                    "**Members:** {}\n**Loyal (Main Server):** {}\n**Network Loyal:** {}\n\
                     **Active Loyal:** {}\n**Status:** {}",
                    members,
                    loyal_here,
                    loyal,
                    active,
                    if stored.is_hub { "🏢 Main Hub" } else { "🌐 Gateway" }
                ),
            )
        }
    };

    let embed = embed.footer(network_footer(guild_name.as_deref(), &data.config.network_name));
    msg.channel_id
        .send_message(ctx, serenity::CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::activity::apply_message;
    use crate::utils::setup_wizard::WizardStep;

    #[test]
    fn classifies_mention_queries() {
        assert_eq!(classify_mention("HELP me"), MentionQuery::Help);
        assert_eq!(classify_mention("count"), MentionQuery::Count(CountKind::All));
        assert_eq!(classify_mention("count humans"), MentionQuery::Count(CountKind::Humans));
        assert_eq!(classify_mention("count bots"), MentionQuery::Count(CountKind::Bots));
        assert_eq!(classify_mention(""), MentionQuery::Stats);
    }

    #[test]
    fn strips_only_a_leading_bot_mention() {
        assert_eq!(strip_bot_mention("<@42> help", 42), Some("help"));
        assert_eq!(strip_bot_mention("  <@!42>", 42), Some(""));
        assert_eq!(strip_bot_mention("<@43> help", 42), None);
        assert_eq!(strip_bot_mention("hey <@42>", 42), None);
    }

    const GUILD: u64 = 1;
    const ADMIN: u64 = 2;
    const CHANNEL: u64 = 3;
    const BOT: u64 = 99;

    fn incoming(author_id: u64, content: &str) -> IncomingMessage<'_> {
        IncomingMessage {
            guild_id: GUILD,
            author_id,
            channel_id: CHANNEL,
            content,
            mention_count: 0,
        }
    }

    fn open_gates() -> MessageGates<'static> {
        MessageGates {
            prefix: "$",
            bot_id: BOT,
            author_muted: false,
            system_active: true,
            author_blacklisted: false,
        }
    }

    #[test]
    fn setup_command_does_not_answer_its_own_first_step() {
        let mut wizards = SetupWizards::default();
        wizards.start(GUILD, ADMIN, CHANNEL);

        let invoking = route(&incoming(ADMIN, "$l setup"), &open_gates(), &mut wizards);
        assert_eq!(invoking, Route::Command);
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedText));

        let answer = route(&incoming(ADMIN, "Be loyal"), &open_gates(), &mut wizards);
        assert_eq!(answer, Route::Wizard(WizardReply::Next(WizardStep::CreedChannel)));
    }

    #[test]
    fn commands_are_never_tracked() {
        let mut wizards = SetupWizards::default();
        assert_eq!(route(&incoming(5, "$net pick"), &open_gates(), &mut wizards), Route::Command);
        assert_eq!(route(&incoming(5, "hello"), &open_gates(), &mut wizards), Route::Track);
    }

    #[test]
    fn muted_authors_are_deleted_before_anything_else() {
        let mut wizards = SetupWizards::default();
        wizards.start(GUILD, ADMIN, CHANNEL);
        let gates = MessageGates {
            author_muted: true,
            ..open_gates()
        };

        assert_eq!(route(&incoming(ADMIN, "Be loyal"), &gates, &mut wizards), Route::DeleteMuted);
        assert_eq!(route(&incoming(ADMIN, "$l setup"), &gates, &mut wizards), Route::DeleteMuted);
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedText));
    }

    #[test]
    fn paused_system_and_blacklist_stop_tracking() {
        let mut wizards = SetupWizards::default();
        let paused = MessageGates {
            system_active: false,
            ..open_gates()
        };
        let banned = MessageGates {
            author_blacklisted: true,
            ..open_gates()
        };

        assert_eq!(route(&incoming(5, "hello"), &paused, &mut wizards), Route::Ignore);
        assert_eq!(route(&incoming(5, "hello"), &banned, &mut wizards), Route::Ignore);
    }

    #[test]
    fn wizard_still_runs_while_paused_for_its_initiator_only() {
        let mut wizards = SetupWizards::default();
        wizards.start(GUILD, ADMIN, CHANNEL);
        let paused = MessageGates {
            system_active: false,
            ..open_gates()
        };

        assert_eq!(route(&incoming(7, "Be loyal"), &paused, &mut wizards), Route::Ignore);
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedText));
        assert_eq!(
            route(&incoming(ADMIN, "cancel"), &paused, &mut wizards),
            Route::Wizard(WizardReply::Cancelled)
        );
    }

    #[test]
    fn lone_bot_mention_is_answered() {
        let mut wizards = SetupWizards::default();
        let msg = IncomingMessage {
            mention_count: 1,
            ..incoming(5, "<@99> count bots")
        };
        assert_eq!(
            route(&msg, &open_gates(), &mut wizards),
            Route::Mention(MentionQuery::Count(CountKind::Bots))
        );

        let crowded = IncomingMessage {
            mention_count: 2,
            ..incoming(5, "<@99> hi <@5>")
        };
        assert_eq!(route(&crowded, &open_gates(), &mut wizards), Route::Track);
    }

    #[test]
    fn only_reactivated_loyal_users_get_roles_back() {
        let mut user = UserRecord::new(5);
        user.is_loyal = true;
        user.is_inactive = true;
        user.origin_guild_id = Some(GUILD as i64);
        let activity = MessageActivity {
            guild_id: 7,
            guild_name: None,
            date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        };

        let outcome = apply_message(&mut user, &activity, 100);
        assert_eq!(role_restore_guilds(&user, &outcome), vec![GUILD as i64, 7]);

        let outcome = apply_message(&mut user, &activity, 100);
        assert!(role_restore_guilds(&user, &outcome).is_empty());

        let mut drifted = UserRecord::new(6);
        drifted.is_inactive = true;
        let outcome = apply_message(&mut drifted, &activity, 100);
        assert!(outcome.reactivated);
        assert!(role_restore_guilds(&drifted, &outcome).is_empty());
    }
}
