pub mod commands;
pub mod handlers;
pub mod tasks;

use crate::config::Config;
use crate::database::legacy_import::{self, ImportOutcome};
use crate::database::models::NetworkConfig;
use crate::database::{self, queries};
use crate::utils::activity::ActivityTracker;
use crate::utils::format::{create_error_embed, network_footer};
use crate::utils::setup_wizard::SetupWizards;
use anyhow::Result;
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Clone)]
pub struct Data {
    pub pool: SqlitePool,
    pub config: Config,
    pub wizards: Arc<Mutex<SetupWizards>>,
    /// Set while an owner-chosen presence should not be overwritten by the refresh task.
    pub custom_presence: Arc<AtomicBool>,
}

impl Data {
    pub fn tracker(&self) -> ActivityTracker {
        ActivityTracker::new(self.pool.clone(), self.config.streak_threshold)
    }

    pub fn network_seed(&self) -> NetworkConfig {
        NetworkConfig {
            main_hub_id: self.config.main_hub_id.map(|id| id as i64),
            main_hub_name: self.config.main_hub_name.clone(),
            main_hub_invite: self.config.hub_invite.clone(),
            hub_ann_channel_id: self.config.hub_ann_channel_id.map(|id| id as i64),
            system_active: true,
        }
    }
}

pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        commands::loyalty::loyalty(),
        commands::network::network(),
        commands::security::security(),
        commands::server::server(),
        commands::sudo::sudo(),
    ]
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            tracing::error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            if let Some(error) = error {
                tracing::error!("Check for `{}` failed: {:?}", ctx.command().qualified_name, error);
            }
            let embed = create_error_embed(
                "Permission Denied",
                "You don't have permission to use this command.",
            )
            .footer(network_footer(
                ctx.guild_id()
                    .and_then(|id| id.name(ctx.cache()))
                    .as_deref(),
                &ctx.data().config.network_name,
            ));
            if let Err(e) = ctx.send(poise::CreateReply::default().embed(embed)).await {
                tracing::warn!("Failed to send permission error: {:?}", e);
            }
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!("Error in command `{}`: {:?}", ctx.command().qualified_name, error);
            let embed = create_error_embed("Error", &error.to_string());
            if let Err(e) = ctx.send(poise::CreateReply::default().embed(embed)).await {
                tracing::warn!("Failed to report command error: {:?}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Seeds the singleton config row, then runs the one-time legacy import.
pub async fn prepare_store(data: &Data) -> Result<()> {
    queries::seed_network_config(&data.pool, &data.network_seed(), data.config.owner_id as i64)
        .await?;

    match legacy_import::import_file(
        &data.pool,
        &data.config.legacy_data_file,
        &data.config.default_prefix,
    )
    .await?
    {
        ImportOutcome::Imported(summary) => {
            tracing::info!(
                "Legacy import: {} users, {} guilds, {} blacklisted",
                summary.users,
                summary.guilds,
                summary.blacklisted
            );
        }
        ImportOutcome::Unreadable => {
            tracing::warn!("Legacy data file could not be read, starting from the database");
        }
        ImportOutcome::NoFile | ImportOutcome::AlreadyImported => {}
    }

    Ok(())
}

pub async fn create_bot(config: Config) -> Result<serenity::Client> {
    let pool = database::create_connection(&config.database_url).await?;

    let data = Data {
        pool,
        config: config.clone(),
        wizards: Arc::new(Mutex::new(SetupWizards::default())),
        custom_presence: Arc::new(AtomicBool::new(false)),
    };
    prepare_store(&data).await?;

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: all_commands(),
            prefix_options: poise::PrefixFrameworkOptions {
                dynamic_prefix: Some(|ctx| {
                    Box::pin(async move {
                        let data = ctx.framework.user_data;
                        let prefix = match ctx.guild_id {
                            Some(guild_id) => {
                                queries::get_guild_prefix(&data.pool, guild_id.get() as i64)
                                    .await?
                            }
                            None => None,
                        };
                        Ok(Some(prefix.unwrap_or_else(|| data.config.default_prefix.clone())))
                    })
                }),
                mention_as_prefix: false,
                case_insensitive_commands: true,
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, _framework| {
            Box::pin(async move {
                tasks::spawn_all(ctx.clone(), data.clone());
                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    Ok(client)
}
