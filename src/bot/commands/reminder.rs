//! Reminder Discord commands - `/reminders` and its subcommands.
//!
//! Running the engine, seeding defaults, deleting rules and purging the
//! notification log are reserved for global administrators. Listing,
//! toggling and statistics are available to everyone, scoped to the server
//! the command was issued in. Team statistics only cover the team's own rules.

use crate::core::ledger::LedgerStats;
use crate::core::orchestrator::TickReport;
use crate::entities::ReminderRuleModel;
use std::fmt::Write;

/// Formats a tick report for a chat reply.
pub fn format_tick_report(report: &TickReport) -> Result<String, std::fmt::Error> {
    if report.skipped {
        return Ok("⏳ Another reminder run is in progress. Try again shortly.".to_string());
    }

    let mut out = String::from("✅ **Reminder run complete**\n");
    writeln!(
        out,
        "Rules: {} processed, {} failed",
        report.rules_processed, report.rules_failed
    )?;
    writeln!(out, "Candidates: {}", report.candidates_scanned)?;
    writeln!(
        out,
        "Notifications: {} sent, {} failed, {} suppressed",
        report.notifications_sent, report.notifications_failed, report.notifications_suppressed
    )?;
    writeln!(
        out,
        "Follow-up tasks: {} created, {} failed",
        report.tasks_spawned, report.spawn_failures
    )?;
    if report.cancelled {
        writeln!(out, "⚠️ Run was cancelled before every rule was processed.")?;
    }
    if report.lease_lost {
        writeln!(out, "⚠️ Another instance took over mid-run; it will finish the remaining rules.")?;
    }
    Ok(out)
}

/// Embed field for one rule: name with status, and its trigger summary.
#[must_use]
pub fn rule_field(rule: &ReminderRuleModel) -> (String, String, bool) {
    let status = if rule.is_active { "🟢" } else { "⚪" };
    let scope = rule
        .team_id
        .as_deref()
        .map_or_else(|| "global".to_string(), |team| format!("team {team}"));
    let window = if rule.trigger_type.looks_forward() {
        format!("{} day(s) ahead", rule.days_before)
    } else {
        format!("{} day(s) after", rule.days_after)
    };
    let follow_up = if rule.auto_create_task { " • creates task" } else { "" };
    (
        format!("{status} {}", rule.name),
        format!(
            "{} {} • {window} • {} • {scope}{follow_up}",
            rule.entity_type, rule.trigger_type, rule.priority
        ),
        false,
    )
}

/// Formats ledger statistics for a chat reply.
pub fn format_stats(stats: &LedgerStats, hours: i64) -> Result<String, std::fmt::Error> {
    let mut out = format!("📬 **Notifications in the last {hours}h**\n");
    writeln!(
        out,
        "Sent: {} • Failed: {} • Pending: {}",
        stats.sent, stats.failed, stats.pending
    )?;
    if !stats.recent_failures.is_empty() {
        writeln!(out, "\n**Recent failures**")?;
        for failure in &stats.recent_failures {
            writeln!(
                out,
                "• rule {} → {} {} for <@{}>: {}",
                failure.rule_id,
                failure.entity_type,
                failure.entity_id,
                failure.recipient_id,
                failure.error_message.as_deref().unwrap_or("unknown error")
            )?;
        }
    }
    Ok(out)
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::{format_stats, format_tick_report, rule_field};
    use crate::{
        bot::{BotData, caller_scope, handlers::autocomplete},
        core::{defaults, ledger, rule},
        entities::ReminderRuleModel,
        errors::{Error, Result},
    };
    use chrono::Utc;
    use poise::serenity_prelude as serenity;

    fn require_admin(ctx: poise::Context<'_, BotData, Error>, action: &str) -> Result<()> {
        if ctx.data().is_admin(&ctx.author().id.to_string()) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                action: action.to_string(),
            })
        }
    }

    async fn find_visible_rule(
        ctx: poise::Context<'_, BotData, Error>,
        name: &str,
        scope: &rule::RuleScope,
    ) -> Result<Option<ReminderRuleModel>> {
        let found = rule::get_rule_by_name(&ctx.data().database, name).await?;
        Ok(found.filter(|r| scope.can_view(r.team_id.as_deref())))
    }

    /// Parent command for the reminder engine.
    #[poise::command(
        slash_command,
        subcommands(
            "reminders_run",
            "reminders_seed",
            "reminders_list",
            "reminders_toggle",
            "reminders_delete",
            "reminders_stats",
            "reminders_purge"
        )
    )]
    pub async fn reminders(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Reminder commands: `run`, `seed`, `list`, `toggle`, `delete`, `stats`, `purge`. See `/help`.")
            .await?;
        Ok(())
    }

    /// Runs one reminder tick immediately.
    #[poise::command(slash_command, rename = "run")]
    pub async fn reminders_run(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        require_admin(ctx, "run the reminder engine")?;
        ctx.defer().await?;

        let report = ctx.data().engine.run_tick_now().await;
        ctx.say(format_tick_report(&report)?).await?;
        Ok(())
    }

    /// Installs the built-in rules that are missing.
    #[poise::command(slash_command, rename = "seed")]
    pub async fn reminders_seed(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        require_admin(ctx, "seed default rules")?;
        let author_id = ctx.author().id.to_string();

        let created = defaults::seed_default_rules(&ctx.data().database, &author_id).await?;
        if created.is_empty() {
            ctx.say("ℹ️ All built-in rules are already installed.").await?;
        } else {
            let names: Vec<&str> = created.iter().map(|r| r.name.as_str()).collect();
            ctx.say(format!(
                "✅ Installed {} built-in rule(s): {}",
                created.len(),
                names.join(", ")
            ))
            .await?;
        }
        Ok(())
    }

    /// Lists the reminder rules visible to you.
    #[poise::command(slash_command, rename = "list")]
    pub async fn reminders_list(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let scope = caller_scope(ctx)?;
        let rules = rule::list_rules(&ctx.data().database, &scope).await?;

        if rules.is_empty() {
            ctx.say("📭 No reminder rules yet. An administrator can add the defaults with `/reminders seed`.")
                .await?;
            return Ok(());
        }

        // Discord embeds hold at most 25 fields
        let fields: Vec<_> = rules.iter().take(25).map(rule_field).collect();
        let embed = serenity::CreateEmbed::default()
            .title("⏰ Reminder Rules")
            .color(0x0034_98DB)
            .fields(fields)
            .footer(serenity::CreateEmbedFooter::new(format!(
                "{} rule{}",
                rules.len(),
                if rules.len() == 1 { "" } else { "s" }
            )));

        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Turns a reminder rule on or off.
    #[poise::command(slash_command, rename = "toggle")]
    pub async fn reminders_toggle(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Name of the rule"]
        #[autocomplete = "autocomplete::autocomplete_rule_name"]
        name: String,
    ) -> Result<()> {
        let scope = caller_scope(ctx)?;
        let Some(found) = find_visible_rule(ctx, &name, &scope).await? else {
            ctx.say(format!("❌ No rule named '{name}'.")).await?;
            return Ok(());
        };

        let author_id = ctx.author().id.to_string();
        let toggled = rule::toggle_rule(&ctx.data().database, found.id, &scope, &author_id).await?;
        let state = if toggled.is_active { "enabled" } else { "disabled" };
        ctx.say(format!("✅ Rule '{}' is now {state}.", toggled.name)).await?;
        Ok(())
    }

    /// Permanently deletes a reminder rule.
    #[poise::command(slash_command, rename = "delete")]
    pub async fn reminders_delete(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Name of the rule"]
        #[autocomplete = "autocomplete::autocomplete_rule_name"]
        name: String,
    ) -> Result<()> {
        require_admin(ctx, "delete rules")?;
        let scope = rule::RuleScope::Global;
        let Some(found) = find_visible_rule(ctx, &name, &scope).await? else {
            ctx.say(format!("❌ No rule named '{name}'.")).await?;
            return Ok(());
        };

        rule::delete_rule(&ctx.data().database, found.id, &scope).await?;
        ctx.say(format!("🗑️ Rule '{}' deleted.", found.name)).await?;
        Ok(())
    }

    /// Shows delivery counts and recent failures.
    #[poise::command(slash_command, rename = "stats")]
    pub async fn reminders_stats(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Look-back window in hours (default: 24)"]
        #[min = 1]
        #[max = 2160]
        hours: Option<i64>,
    ) -> Result<()> {
        let scope = caller_scope(ctx)?;
        let hours = hours.unwrap_or(24);
        let since = ledger::hours_before(Utc::now(), hours)?;

        let stats = ledger::stats(&ctx.data().database, &scope, since, 5).await?;
        ctx.say(format_stats(&stats, hours)?).await?;
        Ok(())
    }

    /// Deletes delivery records older than the retention horizon.
    #[poise::command(slash_command, rename = "purge")]
    pub async fn reminders_purge(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Keep records newer than this many days (default: configured retention)"]
        #[min = 1]
        #[max = 3650]
        days: Option<i64>,
    ) -> Result<()> {
        require_admin(ctx, "purge the notification log")?;
        let days = days.unwrap_or(ctx.data().engine.config().retention_days);

        let purged = ledger::purge_older_than(&ctx.data().database, Utc::now(), days).await?;
        ctx.say(format!("🧹 Removed {purged} record(s) older than {days} day(s).")).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
