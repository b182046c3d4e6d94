//! Bot layer - Discord admin surface and notification transport
//!
//! This module provides the Discord interface for the reminder engine: slash
//! commands to run ticks and manage rules, autocomplete handlers, and the
//! direct-message transport the engine delivers notifications through.

/// Discord command implementations (reminders, general)
pub mod commands;
/// Discord interaction handlers (autocomplete, etc.)
pub mod handlers;
/// Direct-message notification transport
pub mod transport;

use crate::core::orchestrator::ReminderEngine;
use crate::core::rule::RuleScope;
use crate::errors::{Error, Result};
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// The engine `/reminders run` ticks on demand
    pub engine: Arc<ReminderEngine>,
    /// Discord user ids with global administrator rights
    pub admins: HashSet<String>,
}

impl BotData {
    /// Creates a new `BotData` instance.
    #[must_use]
    pub const fn new(
        database: DatabaseConnection,
        engine: Arc<ReminderEngine>,
        admins: HashSet<String>,
    ) -> Self {
        Self {
            database,
            engine,
            admins,
        }
    }

    /// Whether `user_id` is a global administrator.
    #[must_use]
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }

    /// Resolves the rule scope of a caller.
    ///
    /// Global administrators act globally; everyone else acts for the team
    /// identified by the server the command was issued in.
    pub fn scope_for(&self, user_id: &str, guild_id: Option<u64>) -> Result<RuleScope> {
        if self.is_admin(user_id) {
            return Ok(RuleScope::Global);
        }
        guild_id
            .map(|guild| RuleScope::Team(guild.to_string()))
            .ok_or_else(|| Error::Forbidden {
                action: "manage reminders outside a server".to_string(),
            })
    }
}

/// Resolves the rule scope of the invoking user.
pub fn caller_scope(ctx: poise::Context<'_, BotData, Error>) -> Result<RuleScope> {
    ctx.data().scope_for(
        &ctx.author().id.to_string(),
        ctx.guild_id().map(serenity::GuildId::get),
    )
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().name, error = %error, "Command failed");
            let reply = match &error {
                Error::Validation { errors } => {
                    let lines: Vec<String> = errors.iter().map(|e| format!("• {e}")).collect();
                    format!("❌ Invalid rule:\n{}", lines.join("\n"))
                }
                Error::Forbidden { .. } | Error::RuleNotFound { .. } => format!("❌ {error}"),
                _ => "❌ Something went wrong. Please try again later.".to_string(),
            };
            if let Err(e) = ctx.say(reply).await {
                error!(error = %e, "Failed to send error message");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!(error = %e, "Error while handling error");
            }
        }
    }
}

/// Connects to Discord and serves the admin commands until the client stops.
#[instrument(skip_all)]
pub async fn run_bot(token: String, data: BotData) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::reminders(), commands::ping(), commands::help()],
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, "Logged in");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered commands globally");
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot client");
    client.start().await?;
    Ok(())
}
