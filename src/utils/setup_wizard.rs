use std::collections::HashMap;

pub const TOTAL_STEPS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    CreedText,
    CreedChannel,
    Role,
    BackupInvite,
}

impl WizardStep {
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::CreedText => 1,
            WizardStep::CreedChannel => 2,
            WizardStep::Role => 3,
            WizardStep::BackupInvite => 4,
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            WizardStep::CreedText => "Type the creed text members will agree to.",
            WizardStep::CreedChannel => "Mention the channel where the creed should be posted.",
            WizardStep::Role => "Mention the role loyal members should receive.",
            WizardStep::BackupInvite => {
                "Paste a backup server invite link, or type `skip` to finish without one."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAnswers {
    pub creed_text: String,
    pub creed_channel_id: u64,
    pub role_id: u64,
    pub backup_invite: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardReply {
    /// The message does not belong to the guild's session.
    Ignored,
    Next(WizardStep),
    Rejected { step: WizardStep, reason: String },
    Cancelled,
    Completed(SetupAnswers),
}

#[derive(Debug, Clone)]
struct WizardSession {
    initiator_id: u64,
    channel_id: u64,
    step: WizardStep,
    creed_text: Option<String>,
    creed_channel_id: Option<u64>,
    role_id: Option<u64>,
}

/// In-memory setup sessions, at most one per guild.
#[derive(Debug, Default)]
pub struct SetupWizards {
    sessions: HashMap<u64, WizardSession>,
}

impl SetupWizards {
    /// Starts a session, replacing any earlier one for the guild. Returns `true` if one was
    /// replaced.
    pub fn start(&mut self, guild_id: u64, initiator_id: u64, channel_id: u64) -> bool {
        let session = WizardSession {
            initiator_id,
            channel_id,
            step: WizardStep::CreedText,
            creed_text: None,
            creed_channel_id: None,
            role_id: None,
        };
        self.sessions.insert(guild_id, session).is_some()
    }

    pub fn is_active(&self, guild_id: u64) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn current_step(&self, guild_id: u64) -> Option<WizardStep> {
        self.sessions.get(&guild_id).map(|session| session.step)
    }

    pub fn advance(
        &mut self,
        guild_id: u64,
        author_id: u64,
        channel_id: u64,
        content: &str,
    ) -> WizardReply {
        let Some(session) = self.sessions.get_mut(&guild_id) else {
            return WizardReply::Ignored;
        };
        if session.initiator_id != author_id || session.channel_id != channel_id {
            return WizardReply::Ignored;
        }

        let content = content.trim();
        if content.eq_ignore_ascii_case("cancel") {
            self.sessions.remove(&guild_id);
            return WizardReply::Cancelled;
        }

        let step = session.step;
        match step {
            WizardStep::CreedText => {
                if content.is_empty() {
                    return rejected(step, "The creed text cannot be empty.");
                }
                session.creed_text = Some(content.to_string());
                session.step = WizardStep::CreedChannel;
            }
            WizardStep::CreedChannel => match parse_channel_ref(content) {
                Some(id) => {
                    session.creed_channel_id = Some(id);
                    session.step = WizardStep::Role;
                }
                None => return rejected(step, "That is not a channel mention or id."),
            },
            WizardStep::Role => match parse_role_ref(content) {
                Some(id) => {
                    session.role_id = Some(id);
                    session.step = WizardStep::BackupInvite;
                }
                None => return rejected(step, "That is not a role mention or id."),
            },
            WizardStep::BackupInvite => {
                let backup_invite = match parse_backup_invite(content) {
                    Ok(invite) => invite,
                    Err(reason) => return rejected(step, reason),
                };
                let Some(session) = self.sessions.remove(&guild_id) else {
                    return WizardReply::Ignored;
                };
                return match (session.creed_text, session.creed_channel_id, session.role_id) {
                    (Some(creed_text), Some(creed_channel_id), Some(role_id)) => {
                        WizardReply::Completed(SetupAnswers {
                            creed_text,
                            creed_channel_id,
                            role_id,
                            backup_invite,
                        })
                    }
                    _ => WizardReply::Cancelled,
                };
            }
        }

        WizardReply::Next(session.step)
    }

    pub fn cancel(&mut self, guild_id: u64) -> bool {
        self.sessions.remove(&guild_id).is_some()
    }
}

fn rejected(step: WizardStep, reason: &str) -> WizardReply {
    WizardReply::Rejected {
        step,
        reason: reason.to_string(),
    }
}

fn parse_mention(content: &str, open: &str) -> Option<u64> {
    let content = content.trim();
    let inner = content
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(content);
    inner.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Accepts `<#id>` or a bare id.
pub fn parse_channel_ref(content: &str) -> Option<u64> {
    parse_mention(content, "<#")
}

/// Accepts `<@&id>` or a bare id.
pub fn parse_role_ref(content: &str) -> Option<u64> {
    parse_mention(content, "<@&")
}

/// Accepts `<@id>`, `<@!id>` or a bare id.
pub fn parse_user_ref(content: &str) -> Option<u64> {
    let content = content.trim();
    if let Some(id) = content
        .strip_prefix("<@!")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        return id.parse::<u64>().ok().filter(|id| *id > 0);
    }
    parse_mention(content, "<@")
}

/// `skip`/`none` mean no backup server; anything else must be a Discord invite link.
pub fn parse_backup_invite(content: &str) -> Result<Option<String>, &'static str> {
    let content = content.trim();
    if content.eq_ignore_ascii_case("skip") || content.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    const INVITE_PREFIXES: [&str; 4] = [
        "https://discord.gg/",
        "discord.gg/",
        "https://discord.com/invite/",
        "discord.com/invite/",
    ];
    match INVITE_PREFIXES
        .iter()
        .find_map(|prefix| content.strip_prefix(prefix))
    {
        Some(code) if !code.is_empty() && !code.contains(char::is_whitespace) => {
            Ok(Some(content.to_string()))
        }
        _ => Err("That is not a Discord invite link. Type `skip` to finish without one."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: u64 = 1;
    const ADMIN: u64 = 2;
    const CHANNEL: u64 = 3;

    fn started() -> SetupWizards {
        let mut wizards = SetupWizards::default();
        wizards.start(GUILD, ADMIN, CHANNEL);
        wizards
    }

    #[test]
    fn walks_all_four_steps() {
        let mut wizards = started();

        assert_eq!(
            wizards.advance(GUILD, ADMIN, CHANNEL, "Be loyal"),
            WizardReply::Next(WizardStep::CreedChannel)
        );
        assert_eq!(
            wizards.advance(GUILD, ADMIN, CHANNEL, "<#444>"),
            WizardReply::Next(WizardStep::Role)
        );
        assert_eq!(
            wizards.advance(GUILD, ADMIN, CHANNEL, "<@&555>"),
            WizardReply::Next(WizardStep::BackupInvite)
        );
        assert_eq!(
            wizards.advance(GUILD, ADMIN, CHANNEL, "https://discord.gg/backup"),
            WizardReply::Completed(SetupAnswers {
                creed_text: "Be loyal".to_string(),
                creed_channel_id: 444,
                role_id: 555,
                backup_invite: Some("https://discord.gg/backup".to_string()),
            })
        );
        assert!(!wizards.is_active(GUILD));
    }

    #[test]
    fn ignores_other_users_and_channels() {
        let mut wizards = started();

        assert_eq!(wizards.advance(GUILD, 99, CHANNEL, "hijack"), WizardReply::Ignored);
        assert_eq!(wizards.advance(GUILD, ADMIN, 99, "wrong room"), WizardReply::Ignored);
        assert_eq!(wizards.advance(7, ADMIN, CHANNEL, "other guild"), WizardReply::Ignored);
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedText));
    }

    #[test]
    fn invalid_input_keeps_the_step() {
        let mut wizards = started();
        wizards.advance(GUILD, ADMIN, CHANNEL, "Be loyal");

        let reply = wizards.advance(GUILD, ADMIN, CHANNEL, "general");
        assert!(matches!(
            reply,
            WizardReply::Rejected {
                step: WizardStep::CreedChannel,
                ..
            }
        ));
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedChannel));
    }

    #[test]
    fn backup_invite_can_be_skipped() {
        let mut wizards = started();
        wizards.advance(GUILD, ADMIN, CHANNEL, "Be loyal");
        wizards.advance(GUILD, ADMIN, CHANNEL, "444");
        wizards.advance(GUILD, ADMIN, CHANNEL, "555");

        match wizards.advance(GUILD, ADMIN, CHANNEL, "skip") {
            WizardReply::Completed(answers) => assert_eq!(answers.backup_invite, None),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn cancel_and_restart() {
        let mut wizards = started();
        wizards.advance(GUILD, ADMIN, CHANNEL, "Be loyal");

        assert!(wizards.start(GUILD, 8, 9));
        assert_eq!(wizards.current_step(GUILD), Some(WizardStep::CreedText));
        assert_eq!(wizards.advance(GUILD, ADMIN, CHANNEL, "old admin"), WizardReply::Ignored);

        assert_eq!(wizards.advance(GUILD, 8, 9, "Cancel"), WizardReply::Cancelled);
        assert!(!wizards.is_active(GUILD));
    }

    #[test]
    fn parses_mentions() {
        assert_eq!(parse_channel_ref("<#123>"), Some(123));
        assert_eq!(parse_channel_ref(" 123 "), Some(123));
        assert_eq!(parse_channel_ref("<@&123>"), None);
        assert_eq!(parse_role_ref("<@&123>"), Some(123));
        assert_eq!(parse_user_ref("<@!123>"), Some(123));
        assert_eq!(parse_user_ref("<@123>"), Some(123));
        assert_eq!(parse_user_ref("0"), None);
    }

    #[test]
    fn validates_invites() {
        assert_eq!(parse_backup_invite("none"), Ok(None));
        assert!(parse_backup_invite("discord.com/invite/abc").is_ok());
        assert!(parse_backup_invite("https://example.com").is_err());
        assert!(parse_backup_invite("https://discord.gg/").is_err());
    }
}
