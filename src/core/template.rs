//! Template rendering - Expands `{placeholder}` tokens against a candidate.
//!
//! Rendering never fails. Unknown tokens are left verbatim and missing
//! candidate fields render as the empty string, so one malformed entity can
//! not abort a rule. Which tokens a rule may use is checked when the rule is
//! written, see [`crate::core::rule`].

use crate::core::scanner::ReminderCandidate;
use crate::entities::{Priority, ReminderRuleModel};
use chrono::{DateTime, Utc};

/// Every placeholder the renderer understands.
pub const PLACEHOLDERS: [&str; 7] = [
    "title",
    "entityType",
    "days",
    "institutionName",
    "assigneeName",
    "amount",
    "id",
];

const SECONDS_PER_DAY: i64 = 86_400;

/// A notification ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNotification {
    /// Rendered title
    pub title: String,
    /// Rendered body
    pub message: String,
    /// Severity, taken from the rule priority
    pub priority: Priority,
    /// Rendered link, if the rule has one
    pub action_url: Option<String>,
    /// Rendered link label, if the rule has one
    pub action_text: Option<String>,
}

/// Returns the `{token}` names used in a template, in order of appearance.
#[must_use]
pub fn placeholders_in(template: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let token = &after[..close];
        if !token.is_empty() && !token.contains('{') {
            tokens.push(token.to_string());
        }
        rest = &after[close + 1..];
    }
    tokens
}

/// Whole days between `now` and `date`, rounded with the ceiling of the
/// signed difference and reported as an absolute value.
#[must_use]
pub fn days_between(date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (date - now).num_seconds();
    let quotient = seconds / SECONDS_PER_DAY;
    // Integer division truncates toward zero, which is already the ceiling
    // for negative differences.
    let ceiling = if seconds % SECONDS_PER_DAY > 0 {
        quotient + 1
    } else {
        quotient
    };
    ceiling.abs()
}

fn placeholder_value(token: &str, candidate: &ReminderCandidate, now: DateTime<Utc>) -> Option<String> {
    let value = match token {
        "title" => candidate.display_name().to_string(),
        "entityType" => candidate.entity_type.as_str().to_string(),
        "days" => days_between(candidate.reference_date, now).to_string(),
        "institutionName" => candidate.institution_name.clone().unwrap_or_default(),
        "assigneeName" => candidate.assignee_name.clone().unwrap_or_default(),
        "amount" => candidate
            .amount
            .map(|amount| format!("{amount:.2}"))
            .unwrap_or_default(),
        "id" => candidate.entity_id.to_string(),
        _ => return None,
    };
    Some(value)
}

/// Substitutes every known placeholder in `template`.
#[must_use]
pub fn render(template: &str, candidate: &ReminderCandidate, now: DateTime<Utc>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let token = &after[..close];
        match placeholder_value(token, candidate, now) {
            Some(value) => output.push_str(&value),
            None => {
                output.push('{');
                output.push_str(token);
                output.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    output.push_str(rest);
    output
}

/// Renders the notification title.
#[must_use]
pub fn render_title(rule: &ReminderRuleModel, candidate: &ReminderCandidate, now: DateTime<Utc>) -> String {
    render(&rule.title_template, candidate, now)
}

/// Renders the notification body.
#[must_use]
pub fn render_message(rule: &ReminderRuleModel, candidate: &ReminderCandidate, now: DateTime<Utc>) -> String {
    render(&rule.message_template, candidate, now)
}

/// Renders the action link, `None` when the rule has no link template.
#[must_use]
pub fn render_action_url(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> Option<String> {
    rule.action_url_template
        .as_deref()
        .map(|template| render(template, candidate, now))
}

/// Renders the action link label, `None` when the rule has no label template.
#[must_use]
pub fn render_action_text(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> Option<String> {
    rule.action_text_template
        .as_deref()
        .map(|template| render(template, candidate, now))
}

/// Renders the follow-up task title. Only meaningful for rules with
/// `auto_create_task` set.
#[must_use]
pub fn render_task_title(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> Option<String> {
    if !rule.auto_create_task {
        return None;
    }
    rule.task_title_template
        .as_deref()
        .filter(|template| !template.trim().is_empty())
        .map(|template| render(template, candidate, now))
}

/// Renders every notification field for one candidate.
#[must_use]
pub fn render_notification(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> RenderedNotification {
    RenderedNotification {
        title: render_title(rule, candidate, now),
        message: render_message(rule, candidate, now),
        priority: rule.priority,
        action_url: render_action_url(rule, candidate, now),
        action_text: render_action_text(rule, candidate, now),
    }
}
