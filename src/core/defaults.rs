//! Built-in reminder rules seeded on first start.

use crate::core::rule::{RuleInput, RuleScope, create_rule, get_rule_by_name};
use crate::entities::{EntityType, Priority, ReminderRuleModel, TriggerType};
use crate::errors::Result;
use sea_orm::DatabaseConnection;

struct DefaultRule {
    name: &'static str,
    description: &'static str,
    entity_type: EntityType,
    trigger_type: TriggerType,
    days_before: i32,
    days_after: i32,
    priority: Priority,
    title: &'static str,
    message: &'static str,
    action_url: &'static str,
    action_text: &'static str,
    follow_up: Option<(&'static str, Priority)>,
}

impl DefaultRule {
    fn to_input(&self) -> RuleInput {
        let mut input = RuleInput::new(
            self.name,
            self.entity_type,
            self.trigger_type,
            self.title,
            self.message,
        );
        input.description = Some(self.description.to_string());
        input.days_before = self.days_before;
        input.days_after = self.days_after;
        input.priority = self.priority;
        input.action_url_template = Some(self.action_url.to_string());
        input.action_text_template = Some(self.action_text.to_string());
        if let Some((task_title, task_priority)) = self.follow_up {
            input.auto_create_task = true;
            input.task_title_template = Some(task_title.to_string());
            input.task_priority = Some(task_priority);
        }
        input
    }
}

const DEFAULT_RULES: [DefaultRule; 6] = [
    DefaultRule {
        name: "Task Due Soon",
        description: "Warns assignees two days before a task is due",
        entity_type: EntityType::Task,
        trigger_type: TriggerType::DueSoon,
        days_before: 2,
        days_after: 0,
        priority: Priority::Medium,
        title: "Task Due Soon",
        message: "Task \"{title}\" is due in {days} day(s)",
        action_url: "/tasks/{id}",
        action_text: "View task",
        follow_up: None,
    },
    DefaultRule {
        name: "Task Overdue",
        description: "Chases tasks still open a day after their due date",
        entity_type: EntityType::Task,
        trigger_type: TriggerType::Overdue,
        days_before: 0,
        days_after: 1,
        priority: Priority::High,
        title: "Task Overdue",
        message: "Task \"{title}\" is {days} day(s) overdue",
        action_url: "/tasks/{id}",
        action_text: "View task",
        follow_up: None,
    },
    DefaultRule {
        name: "Quote Expiring Soon",
        description: "Warns three days before an open quote lapses",
        entity_type: EntityType::Quote,
        trigger_type: TriggerType::DueSoon,
        days_before: 3,
        days_after: 0,
        priority: Priority::Medium,
        title: "Quote Expiring Soon",
        message: "Quote \"{title}\" for {institutionName} expires in {days} day(s)",
        action_url: "/quotes/{id}",
        action_text: "View quote",
        follow_up: None,
    },
    DefaultRule {
        name: "Quote Expired",
        description: "Flags quotes that lapsed without an answer",
        entity_type: EntityType::Quote,
        trigger_type: TriggerType::Expired,
        days_before: 0,
        days_after: 0,
        priority: Priority::High,
        title: "Quote Expired",
        message: "Quote \"{title}\" for {institutionName} has expired",
        action_url: "/quotes/{id}",
        action_text: "View quote",
        follow_up: Some(("Follow up on expired quote {title}", Priority::Medium)),
    },
    DefaultRule {
        name: "Invoice Due Soon",
        description: "Warns five days before an invoice falls due",
        entity_type: EntityType::Invoice,
        trigger_type: TriggerType::DueSoon,
        days_before: 5,
        days_after: 0,
        priority: Priority::Medium,
        title: "Invoice Due Soon",
        message: "Invoice \"{title}\" ({amount}) is due in {days} day(s)",
        action_url: "/invoices/{id}",
        action_text: "View invoice",
        follow_up: None,
    },
    DefaultRule {
        name: "Invoice Unpaid",
        description: "Escalates invoices unpaid a week past due",
        entity_type: EntityType::Invoice,
        trigger_type: TriggerType::Unpaid,
        days_before: 0,
        days_after: 7,
        priority: Priority::Urgent,
        title: "Invoice Unpaid",
        message: "Invoice \"{title}\" for {institutionName} ({amount}) is unpaid, due {days} day(s) ago",
        action_url: "/invoices/{id}",
        action_text: "View invoice",
        follow_up: Some(("Collect payment for invoice {title}", Priority::High)),
    },
];

/// Inserts the built-in rules missing by name, attributed to `admin_id`.
///
/// Returns the rules created by this call; an already seeded database yields
/// an empty list.
pub async fn seed_default_rules(
    db: &DatabaseConnection,
    admin_id: &str,
) -> Result<Vec<ReminderRuleModel>> {
    let mut created = Vec::new();
    for default in &DEFAULT_RULES {
        if get_rule_by_name(db, default.name).await?.is_some() {
            continue;
        }
        created.push(create_rule(db, default.to_input(), &RuleScope::Global, admin_id).await?);
    }

    tracing::info!(
        created = created.len(),
        total = DEFAULT_RULES.len(),
        "Seeded default reminder rules"
    );
    Ok(created)
}
