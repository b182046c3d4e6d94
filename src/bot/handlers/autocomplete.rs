//! Autocomplete handlers for Discord slash command parameters.

use crate::{
    bot::{BotData, caller_scope},
    core::rule,
    entities::ReminderRuleModel,
    errors::Error,
};

/// Discord's limit on autocomplete suggestions
const MAX_SUGGESTIONS: usize = 25;

/// Names of `rules` containing `partial`, case-insensitively, sorted.
#[must_use]
pub fn matching_rule_names(rules: Vec<ReminderRuleModel>, partial: &str) -> Vec<String> {
    let partial_lower = partial.to_lowercase();
    let mut matching: Vec<String> = rules
        .into_iter()
        .filter(|rule| rule.name.to_lowercase().contains(&partial_lower))
        .map(|rule| rule.name)
        .collect();
    matching.sort();
    matching.truncate(MAX_SUGGESTIONS);
    matching
}

/// Suggests names of rules the caller can see.
pub async fn autocomplete_rule_name(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let Ok(scope) = caller_scope(ctx) else {
        return Vec::new();
    };
    let Ok(rules) = rule::list_rules(&ctx.data().database, &scope).await else {
        return Vec::new();
    };
    matching_rule_names(rules, partial)
}
