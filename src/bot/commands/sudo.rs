use crate::bot::commands::{owner, reply, send_module_help};
use crate::bot::tasks::default_activity;
use crate::bot::{Context, Data, Error};
use crate::database::models::Table;
use crate::database::queries;
use crate::utils::format::{
    HelpEntry, create_error_embed, create_info_embed, create_success_embed,
    create_warning_embed, format_activity, format_overview, format_trends, truncate,
};
use crate::utils::stats;
use crate::utils::time::get_current_date_utc;
use poise::serenity_prelude as serenity;
use std::sync::atomic::Ordering;

const HELP: [HelpEntry; 8] = [
    ("su trusted remove <user_id|all>", "Remove trusted admins"),
    ("su schema view <table>", "Dump a table as JSON"),
    ("su schema health", "Check tables and database integrity"),
    ("su stats overview", "Network counts"),
    ("su stats activity", "Activity averages"),
    ("su stats network", "7-day join/leave trend"),
    ("su bot presence switch <type> <msg>", "Set a custom presence"),
    ("su bot cmds", "Count registered commands"),
];

const STREAM_URL: &str = "https://twitch.tv/loyaltynetwork";
const DUMP_LIMIT: usize = 1900;
const TREND_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PresenceKind {
    Playing,
    Listening,
    Watching,
    Streaming,
}

impl PresenceKind {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "playing" => Some(Self::Playing),
            "listening" => Some(Self::Listening),
            "watching" => Some(Self::Watching),
            "streaming" => Some(Self::Streaming),
            _ => None,
        }
    }

    fn activity(self, message: &str) -> serenity::Result<serenity::ActivityData> {
        Ok(match self {
            Self::Playing => serenity::ActivityData::playing(message),
            Self::Listening => serenity::ActivityData::listening(message),
            Self::Watching => serenity::ActivityData::watching(message),
            Self::Streaming => serenity::ActivityData::streaming(message, STREAM_URL)?,
        })
    }
}

fn count_commands(commands: &[poise::Command<Data, Error>]) -> usize {
    commands
        .iter()
        .map(|command| 1 + count_commands(&command.subcommands))
        .sum()
}

/// Owner-only diagnostics and controls
#[poise::command(
    prefix_command,
    rename = "su",
    aliases("sudo"),
    check = "owner",
    subcommands("trusted", "schema", "stats_group", "bot")
)]
pub async fn sudo(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP).await
}

#[poise::command(prefix_command, check = "owner", subcommands("remove"))]
pub async fn trusted(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP[..1]).await
}

/// Remove a trusted admin, or everyone but the owner
#[poise::command(prefix_command, check = "owner")]
pub async fn remove(ctx: Context<'_>, target: String) -> Result<(), Error> {
    let pool = &ctx.data().pool;
    let owner_id = ctx.data().config.owner_id;

    if target.eq_ignore_ascii_case("all") {
        let removed = queries::reset_trusted_users(pool, owner_id as i64).await?;
        tracing::info!("Cleared {} trusted users", removed);
        return reply(
            ctx,
            create_success_embed("Trusted Cleared", &format!("Removed {} trusted admins", removed)),
        )
        .await;
    }

    let Some(user_id) = crate::utils::setup_wizard::parse_user_ref(&target) else {
        return reply(ctx, create_error_embed("Invalid User", "Use a user id, a mention or `all`")).await;
    };
    if user_id == owner_id {
        return reply(ctx, create_warning_embed("Cannot Remove", "The owner is always trusted")).await;
    }

    let embed = if queries::remove_trusted_user(pool, user_id as i64).await? {
        create_success_embed("Trust Removed", &format!("<@{}> is no longer trusted", user_id))
    } else {
        create_info_embed("Not Trusted", &format!("<@{}> was not trusted", user_id))
    };
    reply(ctx, embed).await
}

#[poise::command(prefix_command, check = "owner", subcommands("view", "health"))]
pub async fn schema(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP[1..3]).await
}

/// Dump a table as JSON
#[poise::command(prefix_command, check = "owner")]
pub async fn view(ctx: Context<'_>, table: String) -> Result<(), Error> {
    let Some(table) = Table::parse(&table) else {
        let names = Table::ALL
            .iter()
            .map(|table| format!("`{}`", table.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        return reply(ctx, create_error_embed("Unknown Table", &format!("Tables: {}", names))).await;
    };

    let dump = queries::dump_table(&ctx.data().pool, table).await?;
    let json = serde_json::to_string_pretty(&dump)?;

    reply(
        ctx,
        create_info_embed(
            &format!("📄 {}", table.as_str()),
            &format!("```json\n{}\n```", truncate(&json, DUMP_LIMIT)),
        ),
    )
    .await
}

/// Check tables and database integrity
#[poise::command(prefix_command, check = "owner")]
pub async fn health(ctx: Context<'_>) -> Result<(), Error> {
    let issues = queries::schema_issues(&ctx.data().pool).await?;

    let embed = if issues.is_empty() {
        create_success_embed("Schema Healthy", "All tables present and integrity check passed")
    } else {
        tracing::warn!("Schema issues found: {:?}", issues);
        create_warning_embed(
            "Schema Issues",
            &issues
                .iter()
                .map(|issue| format!("• {}", issue))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    };
    reply(ctx, embed).await
}

#[poise::command(
    prefix_command,
    rename = "stats",
    check = "owner",
    subcommands("overview", "activity", "network")
)]
pub async fn stats_group(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP[3..6]).await
}

/// Network counts
#[poise::command(prefix_command, check = "owner")]
pub async fn overview(ctx: Context<'_>) -> Result<(), Error> {
    let overview = stats::network_overview(&ctx.data().pool).await?;
    reply(ctx, create_info_embed("📊 Network Overview", &format_overview(&overview))).await
}

/// Activity averages over loyal members
#[poise::command(prefix_command, check = "owner")]
pub async fn activity(ctx: Context<'_>) -> Result<(), Error> {
    let users = queries::list_users(&ctx.data().pool).await?;
    let activity = stats::activity_stats(&users, get_current_date_utc());
    reply(ctx, create_info_embed("📈 Activity", &format_activity(&activity))).await
}

/// Join and leave trend for the past week
#[poise::command(prefix_command, check = "owner")]
pub async fn network(ctx: Context<'_>) -> Result<(), Error> {
    let trend =
        stats::load_network_trends(&ctx.data().pool, get_current_date_utc(), TREND_DAYS).await?;
    reply(ctx, create_info_embed("🌐 Network Trend (7 days)", &format_trends(&trend))).await
}

#[poise::command(prefix_command, check = "owner", subcommands("presence", "cmds"))]
pub async fn bot(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP[6..]).await
}

#[poise::command(prefix_command, check = "owner", subcommands("switch", "default"))]
pub async fn presence(ctx: Context<'_>) -> Result<(), Error> {
    send_module_help(ctx, "👑 Sudo Module", &HELP[6..7]).await
}

/// Set a custom presence that survives the periodic refresh
#[poise::command(prefix_command, check = "owner")]
pub async fn switch(ctx: Context<'_>, kind: String, #[rest] message: String) -> Result<(), Error> {
    let Some(kind) = PresenceKind::parse(&kind) else {
        return reply(
            ctx,
            create_error_embed("Invalid Type", "Use: streaming, playing, listening, or watching"),
        )
        .await;
    };

    ctx.serenity_context().set_activity(Some(kind.activity(&message)?));
    ctx.data().custom_presence.store(true, Ordering::Relaxed);
    tracing::info!("Presence switched to {:?}: {}", kind, message);

    reply(
        ctx,
        create_success_embed("Presence Updated", &format!("{:?}: {}", kind, message)),
    )
    .await
}

/// Go back to the loyal member count presence
#[poise::command(prefix_command, check = "owner")]
pub async fn default(ctx: Context<'_>) -> Result<(), Error> {
    let loyal = queries::count_loyal_users(&ctx.data().pool).await?;
    ctx.data().custom_presence.store(false, Ordering::Relaxed);
    ctx.serenity_context().set_activity(Some(default_activity(loyal)));

    reply(ctx, create_success_embed("Presence Reset", "Bot presence set to default")).await
}

/// Count registered commands
#[poise::command(prefix_command, check = "owner")]
pub async fn cmds(ctx: Context<'_>) -> Result<(), Error> {
    let commands = &ctx.framework().options().commands;
    reply(
        ctx,
        create_info_embed(
            "🤖 Commands",
            &format!(
                "**Modules:** {}\n**Commands:** {}",
                commands.len(),
                count_commands(commands)
            ),
        ),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_kind_parses_case_insensitively() {
        assert_eq!(PresenceKind::parse("Playing"), Some(PresenceKind::Playing));
        assert_eq!(PresenceKind::parse(" streaming "), Some(PresenceKind::Streaming));
        assert_eq!(PresenceKind::parse("dancing"), None);
    }

    #[test]
    fn streaming_presence_carries_url() {
        let activity = PresenceKind::Streaming.activity("live").unwrap();
        assert_eq!(activity.kind, serenity::ActivityType::Streaming);
        assert!(activity.url.is_some());
    }

    #[test]
    fn command_count_includes_subcommands() {
        let commands = crate::bot::all_commands();
        let total = count_commands(&commands);

        assert_eq!(commands.len(), 5);
        assert!(total > 30);
    }
}
