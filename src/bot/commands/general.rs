//! General Discord commands - ping and help.
//! These need no database access.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**ReminderBuddy Help**\n\
        ReminderBuddy watches tasks, quotes and invoices and sends you a direct message \
        when something is due soon, overdue, expired or unpaid.\n\n\
        **Rule Commands**\n\
        • `/reminders list` - Lists the rules visible to you.\n\
        • `/reminders toggle <rule>` - Turns a rule on or off.\n\
        • `/reminders stats [hours]` - Shows recent delivery counts and failures.\n\n\
        **Administrator Commands**\n\
        • `/reminders run` - Runs the engine once right now.\n\
        • `/reminders seed` - Installs the built-in rules that are missing.\n\
        • `/reminders delete <rule>` - Permanently deletes a rule.\n\
        • `/reminders purge [days]` - Deletes old delivery records.\n\n\
        **Utility Commands**\n\
        • `/ping` - Checks if the bot is responsive.\n\
        • `/help` - Shows this help message.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
