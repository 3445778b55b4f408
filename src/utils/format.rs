use crate::database::models::{GuildRecord, UserRecord};
use crate::utils::graph::bar_chart;
use crate::utils::setup_wizard::{TOTAL_STEPS, WizardStep};
use crate::utils::stats::{ActivityStats, NetworkOverview, TrendPoint};
use crate::utils::time::format_date;
use poise::serenity_prelude as serenity;

pub mod colors {
    pub const BASE: u32 = 0x2B2D31;
    pub const SUCCESS: u32 = 0x57F287;
    pub const ERROR: u32 = 0xED4245;
    pub const INFO: u32 = 0x5865F2;
    pub const WARNING: u32 = 0xFEE75C;
}

fn base_embed(title: &str, description: &str, color: u32) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .description(description)
        .color(color)
        .timestamp(chrono::Utc::now())
}

pub fn create_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    base_embed(title, description, colors::BASE)
}

pub fn create_success_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    base_embed(&format!("✅ {}", title), description, colors::SUCCESS)
}

pub fn create_error_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    base_embed(&format!("❌ {}", title), description, colors::ERROR)
}

pub fn create_info_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    base_embed(title, description, colors::INFO)
}

pub fn create_warning_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    base_embed(&format!("⚠️ {}", title), description, colors::WARNING)
}

pub fn footer_text(guild_name: Option<&str>, network_name: &str) -> String {
    match guild_name {
        Some(guild) => format!("{} • {}", guild, network_name),
        None => network_name.to_string(),
    }
}

pub fn network_footer(guild_name: Option<&str>, network_name: &str) -> serenity::CreateEmbedFooter {
    serenity::CreateEmbedFooter::new(footer_text(guild_name, network_name))
}

/// `▰▰▰▱▱▱▱▱▱▱` style bar.
pub fn progress_bar(current: u8, total: u8, length: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (current.min(total) as usize * length) / total as usize
    };
    format!("{}{}", "▰".repeat(filled), "▱".repeat(length - filled))
}

pub fn create_setup_embed(step: WizardStep, note: Option<&str>) -> serenity::CreateEmbed {
    let mut description = step.prompt().to_string();
    if let Some(note) = note {
        description = format!("{}\n\n{}", note, description);
    }
    description.push_str("\n\nType `cancel` to stop the setup.");

    create_info_embed("🛠️ Loyalty Setup", &description).footer(serenity::CreateEmbedFooter::new(
        format!(
            "{} Step {}/{}",
            progress_bar(step.number(), TOTAL_STEPS, 10),
            step.number(),
            TOTAL_STEPS
        ),
    ))
}

/// A command line for module help: usage and what it does.
pub type HelpEntry = (&'static str, &'static str);

pub fn format_module_help(prefix: &str, entries: &[HelpEntry]) -> String {
    entries
        .iter()
        .map(|(usage, description)| format!("`{}{}`\n└ {}", prefix, usage, description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leaderboard lines for already-resolved display names, best first.
pub fn format_leaderboard(entries: &[(String, &UserRecord)]) -> String {
    if entries.is_empty() {
        return "No loyal members yet.".to_string();
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, (name, user))| {
            let position = match index {
                0 => "🥇".to_string(),
                1 => "🥈".to_string(),
                2 => "🥉".to_string(),
                _ => format!("`#{:02}`", index + 1),
            };
            format!(
                "{} **{}**\n└ {} messages • {} streak",
                position, name, user.total_messages, user.streak
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn create_dashboard_embed(
    guild_name: &str,
    network_name: &str,
    loyal_count: i64,
    active_count: i64,
    leaderboard: &str,
) -> serenity::CreateEmbed {
    let rate = if loyal_count > 0 {
        active_count as f64 / loyal_count as f64 * 100.0
    } else {
        0.0
    };

    create_embed("📊 Loyalty Dashboard", &format!("**{}** loyalty statistics", guild_name))
        .field("Loyal Members", format!("```{}```", loyal_count), true)
        .field("Active", format!("```{}```", active_count), true)
        .field("Activity Rate", format!("```{:.1}%```", rate), true)
        .field("🏆 Leaderboard", leaderboard, false)
        .footer(network_footer(Some(guild_name), network_name))
}

fn profile_summary(user: &UserRecord) -> String {
    match (user.is_loyal, user.origin_guild_name.as_deref()) {
        (false, _) => "Not part of the loyalty network.".to_string(),
        (true, Some(origin)) => format!("Loyal member since joining through **{}**.", origin),
        (true, None) => "Loyal member.".to_string(),
    }
}

pub fn create_profile_embed(display_name: &str, user: &UserRecord) -> serenity::CreateEmbed {
    let status = if !user.is_loyal {
        "Not loyal"
    } else if user.is_inactive {
        "Inactive"
    } else {
        "Active"
    };

    create_embed(&format!("Profile: {}", display_name), &profile_summary(user))
        .field("Status", format!("```{}```", status), true)
        .field("Opted In", format!("```{}```", format_date(user.opt_in_date)), true)
        .field("Last Active", format!("```{}```", format_date(user.last_activity)), true)
        .field("Messages", format!("```{}```", user.total_messages), true)
        .field("Streak", format!("```{}```", user.streak), true)
        .field(
            "Gateway",
            format!("```{}```", user.origin_guild_name.as_deref().unwrap_or("N/A")),
            true,
        )
}

fn channel_or_unset(id: Option<i64>) -> String {
    id.map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "Not set".to_string())
}

pub fn format_guild_config(guild: &GuildRecord, local_trusted: &[i64]) -> String {
    let role = guild
        .loyal_role_id
        .map(|id| format!("<@&{}>", id))
        .unwrap_or_else(|| "Not set".to_string());
    let trusted = if local_trusted.is_empty() {
        "None".to_string()
    } else {
        local_trusted
            .iter()
            .map(|id| format!("<@{}>", id))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "**Type:** {}\n**Prefix:** `{}`\n**Announcements:** {}\n**Loyalty Role:** {}\n\
         **Creed Channel:** {}\n**Dashboard:** {} (top {})\n**Backup Invite:** {}\n\
         **Local Trusted:** {}",
        if guild.is_hub { "Main Hub" } else { "Gateway" },
        guild.prefix,
        channel_or_unset(guild.announcement_channel_id),
        role,
        channel_or_unset(guild.creed_channel_id),
        channel_or_unset(guild.dashboard_channel_id),
        guild.leaderboard_size,
        guild.backup_invite.as_deref().unwrap_or("Not set"),
        trusted
    )
}

pub fn format_overview(overview: &NetworkOverview) -> String {
    format!(
        "**Guilds:** {}\n**Tracked Users:** {}\n**Loyal:** {}\n**Active Loyal:** {}\n\
         **Blacklisted:** {}\n**Trusted Admins:** {}",
        overview.total_guilds,
        overview.total_users,
        overview.loyal_users,
        overview.active_loyal_users,
        overview.blacklisted_users,
        overview.trusted_users
    )
}

pub fn format_activity(stats: &ActivityStats) -> String {
    format!(
        "**Loyal Members:** {}\n**Active Today:** {} ({}%)\n**Avg Messages:** {}\n\
         **Avg Streak:** {}",
        stats.total_loyal,
        stats.active_today,
        stats.activity_percentage,
        stats.average_messages,
        stats.average_streak
    )
}

pub fn format_trends(trend: &[TrendPoint]) -> String {
    let lines = trend
        .iter()
        .map(|point| {
            format!(
                "`{}` +{} / -{} (net {:+})",
                point.date.format("%m-%d"),
                point.joins,
                point.leaves,
                point.net
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let joins: Vec<i64> = trend.iter().map(|point| point.joins).collect();

    format!("{}\n\n**Joins**\n```\n{}\n```", lines, bar_chart(&joins, 5))
}

/// Tally line for commands that fan out over many guilds or users.
pub fn format_bulk_result(action: &str, succeeded: usize, failed: usize) -> String {
    format!("{}: **{}** succeeded, **{}** failed", action, succeeded, failed)
}

pub fn welcome_dm(guild_name: &str, network_name: &str) -> String {
    format!(
        "Welcome to the **{}**! You are now a loyal member through **{}**. \
         Keep chatting to build your streak.",
        network_name, guild_name
    )
}

pub fn inactivity_dm(network_name: &str, days: i64) -> String {
    format!(
        "You have been marked inactive in the **{}** after {} days without activity, \
         and your loyalty role was removed. Send a message in any network server to become \
         active again.",
        network_name, days
    )
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(1, 4, 8), "▰▰▱▱▱▱▱▱");
        assert_eq!(progress_bar(4, 4, 4), "▰▰▰▰");
        assert_eq!(progress_bar(9, 4, 4), "▰▰▰▰");
        assert_eq!(progress_bar(1, 0, 3), "▱▱▱");
    }

    #[test]
    fn footer_names_guild_and_network() {
        assert_eq!(footer_text(Some("Gateway"), "Net"), "Gateway • Net");
        assert_eq!(footer_text(None, "Net"), "Net");
    }

    #[test]
    fn leaderboard_ranks_entries() {
        let mut first = UserRecord::new(1);
        first.streak = 5;
        first.total_messages = 600;
        let second = UserRecord::new(2);
        let fourth = UserRecord::new(4);

        let text = format_leaderboard(&[
            ("alice".to_string(), &first),
            ("bob".to_string(), &second),
            ("carol".to_string(), &second),
            ("dave".to_string(), &fourth),
        ]);

        assert!(text.starts_with("🥇 **alice**\n└ 600 messages • 5 streak"));
        assert!(text.contains("`#04` **dave**"));
        assert_eq!(format_leaderboard(&[]), "No loyal members yet.");
    }

    #[test]
    fn module_help_uses_guild_prefix() {
        let help = format_module_help("!", &[("l creed", "Post the creed")]);
        assert_eq!(help, "`!l creed`\n└ Post the creed");
    }

    #[test]
    fn truncates_long_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
    }

    #[test]
    fn profile_embed_has_no_blank_text() {
        let mut loyal = UserRecord::new(1);
        loyal.is_loyal = true;
        loyal.origin_guild_name = Some("Gateway".to_string());

        for user in [UserRecord::new(2), loyal] {
            let embed = serde_json::to_value(create_profile_embed("Someone", &user)).unwrap();
            let description = embed["description"].as_str().unwrap();
            assert!(!description.trim().is_empty());

            for field in embed["fields"].as_array().unwrap() {
                assert!(!field["name"].as_str().unwrap().trim().is_empty());
                assert!(!field["value"].as_str().unwrap().trim().is_empty());
            }
        }
    }
}
