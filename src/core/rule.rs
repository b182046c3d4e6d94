//! Rule store - Persistence, scoping and validation of reminder rules.
//!
//! Every write runs the same validation, and validation reports every
//! offending field at once. Callers act inside a [`RuleScope`]: a global
//! administrator sees and edits everything, a team caller sees its own rules
//! plus global ones and may only modify its own. Hard deletion is reserved
//! for global administrators; everyone else retires rules by toggling them
//! off.

use crate::core::template::{PLACEHOLDERS, placeholders_in};
use crate::entities::{EntityType, Priority, ReminderRule, TriggerType, reminder_rule};
use crate::errors::{Error, FieldError, Result};
use chrono::Utc;
use sea_orm::{Condition, QueryOrder, Set, prelude::*};
use std::cmp::Reverse;

/// Largest accepted `days_before` / `days_after`.
pub const MAX_WINDOW_DAYS: i32 = 365;

/// Visibility and permission context of a rule store caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// Global administrator, bypasses team scoping
    Global,
    /// Member acting for one team
    Team(String),
}

impl RuleScope {
    /// Whether this scope is a global administrator.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Whether a rule owned by `team_id` is visible in this scope.
    #[must_use]
    pub fn can_view(&self, team_id: Option<&str>) -> bool {
        match self {
            Self::Global => true,
            Self::Team(team) => team_id.is_none_or(|owner| owner == team),
        }
    }

    /// Whether a rule owned by `team_id` may be modified in this scope.
    #[must_use]
    pub fn can_modify(&self, team_id: Option<&str>) -> bool {
        match self {
            Self::Global => true,
            Self::Team(team) => team_id == Some(team.as_str()),
        }
    }

    fn visibility(&self) -> Condition {
        match self {
            Self::Global => Condition::all(),
            Self::Team(team) => Condition::any()
                .add(reminder_rule::Column::TeamId.is_null())
                .add(reminder_rule::Column::TeamId.eq(team.as_str())),
        }
    }
}

/// Complete set of user-editable rule fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInput {
    /// Unique label
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Entity family scanned
    pub entity_type: EntityType,
    /// Temporal predicate
    pub trigger_type: TriggerType,
    /// Forward window in days
    pub days_before: i32,
    /// Backward grace period in days
    pub days_after: i32,
    /// Evaluation order and severity
    pub priority: Priority,
    /// Whether the engine evaluates the rule
    pub is_active: bool,
    /// Notification title template
    pub title_template: String,
    /// Notification body template
    pub message_template: String,
    /// Optional link template
    pub action_url_template: Option<String>,
    /// Optional link label template
    pub action_text_template: Option<String>,
    /// Whether to create a follow-up task
    pub auto_create_task: bool,
    /// Follow-up task title template
    pub task_title_template: Option<String>,
    /// Follow-up task priority
    pub task_priority: Option<Priority>,
    /// Owning team, `None` for global
    pub team_id: Option<String>,
}

impl RuleInput {
    /// Creates an active, medium-priority, global rule with zero-day bounds.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        trigger_type: TriggerType,
        title_template: impl Into<String>,
        message_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            entity_type,
            trigger_type,
            days_before: 0,
            days_after: 0,
            priority: Priority::Medium,
            is_active: true,
            title_template: title_template.into(),
            message_template: message_template.into(),
            action_url_template: None,
            action_text_template: None,
            auto_create_task: false,
            task_title_template: None,
            task_priority: None,
            team_id: None,
        }
    }

    fn from_model(model: &reminder_rule::Model) -> Self {
        Self {
            name: model.name.clone(),
            description: model.description.clone(),
            entity_type: model.entity_type,
            trigger_type: model.trigger_type,
            days_before: model.days_before,
            days_after: model.days_after,
            priority: model.priority,
            is_active: model.is_active,
            title_template: model.title_template.clone(),
            message_template: model.message_template.clone(),
            action_url_template: model.action_url_template.clone(),
            action_text_template: model.action_text_template.clone(),
            auto_create_task: model.auto_create_task,
            task_title_template: model.task_title_template.clone(),
            task_priority: model.task_priority,
            team_id: model.team_id.clone(),
        }
    }

    fn write_to(self, model: &mut reminder_rule::ActiveModel) {
        model.name = Set(self.name.trim().to_string());
        model.description = Set(self.description);
        model.entity_type = Set(self.entity_type);
        model.trigger_type = Set(self.trigger_type);
        model.days_before = Set(self.days_before);
        model.days_after = Set(self.days_after);
        model.priority = Set(self.priority);
        model.is_active = Set(self.is_active);
        model.title_template = Set(self.title_template);
        model.message_template = Set(self.message_template);
        model.action_url_template = Set(self.action_url_template);
        model.action_text_template = Set(self.action_text_template);
        model.auto_create_task = Set(self.auto_create_task);
        model.task_title_template = Set(self.task_title_template);
        model.task_priority = Set(self.task_priority);
        model.team_id = Set(self.team_id);
    }
}

/// Partial update; `None` leaves a field unchanged. Nullable fields take
/// `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::option_option, missing_docs)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub entity_type: Option<EntityType>,
    pub trigger_type: Option<TriggerType>,
    pub days_before: Option<i32>,
    pub days_after: Option<i32>,
    pub priority: Option<Priority>,
    pub is_active: Option<bool>,
    pub title_template: Option<String>,
    pub message_template: Option<String>,
    pub action_url_template: Option<Option<String>>,
    pub action_text_template: Option<Option<String>>,
    pub auto_create_task: Option<bool>,
    pub task_title_template: Option<Option<String>>,
    pub task_priority: Option<Option<Priority>>,
    pub team_id: Option<Option<String>>,
}

impl RuleUpdate {
    fn apply_to(self, input: &mut RuleInput) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    input.$field = value;
                })*
            };
        }
        merge!(
            name,
            description,
            entity_type,
            trigger_type,
            days_before,
            days_after,
            priority,
            is_active,
            title_template,
            message_template,
            action_url_template,
            action_text_template,
            auto_create_task,
            task_title_template,
            task_priority,
            team_id,
        );
    }
}

const fn trigger_applies_to(trigger_type: TriggerType, entity_type: EntityType) -> bool {
    match trigger_type {
        TriggerType::DueSoon | TriggerType::Overdue => true,
        TriggerType::Expired => matches!(entity_type, EntityType::Quote),
        TriggerType::Unpaid => matches!(entity_type, EntityType::Invoice),
    }
}

fn check_placeholders(
    field: &str,
    template: &str,
    entity_type: EntityType,
    errors: &mut Vec<FieldError>,
) {
    for token in placeholders_in(template) {
        if !PLACEHOLDERS.contains(&token.as_str()) {
            errors.push(FieldError::new(field, format!("unknown placeholder {{{token}}}")));
        } else if entity_type == EntityType::Task
            && matches!(token.as_str(), "amount" | "institutionName")
        {
            errors.push(FieldError::new(
                field,
                format!("{{{token}}} is not available for task rules"),
            ));
        }
    }
}

fn check_days(field: &str, days: i32, errors: &mut Vec<FieldError>) {
    if !(0..=MAX_WINDOW_DAYS).contains(&days) {
        errors.push(FieldError::new(
            field,
            format!("must be between 0 and {MAX_WINDOW_DAYS}"),
        ));
    }
}

/// Runs every structural check on a rule, returning all field errors found.
#[must_use]
pub fn validate_rule(input: &RuleInput) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if input.name.trim().is_empty() {
        errors.push(FieldError::new("name", "cannot be empty"));
    }

    if !trigger_applies_to(input.trigger_type, input.entity_type) {
        errors.push(FieldError::new(
            "trigger_type",
            format!(
                "'{}' does not apply to {} rules",
                input.trigger_type, input.entity_type
            ),
        ));
    }

    check_days("days_before", input.days_before, &mut errors);
    check_days("days_after", input.days_after, &mut errors);

    if input.title_template.trim().is_empty() {
        errors.push(FieldError::new("title_template", "cannot be empty"));
    }
    check_placeholders("title_template", &input.title_template, input.entity_type, &mut errors);

    let message_tokens = placeholders_in(&input.message_template);
    if !message_tokens.iter().any(|t| t == "title") {
        errors.push(FieldError::new("message_template", "must contain {title}"));
    }
    if matches!(input.trigger_type, TriggerType::DueSoon | TriggerType::Overdue)
        && !message_tokens.iter().any(|t| t == "days")
    {
        errors.push(FieldError::new(
            "message_template",
            format!("must contain {{days}} for {} rules", input.trigger_type),
        ));
    }
    check_placeholders("message_template", &input.message_template, input.entity_type, &mut errors);

    if let Some(url) = &input.action_url_template {
        if !placeholders_in(url).iter().any(|t| t == "id") {
            errors.push(FieldError::new("action_url_template", "must contain {id}"));
        }
        check_placeholders("action_url_template", url, input.entity_type, &mut errors);
    }
    if let Some(text) = &input.action_text_template {
        check_placeholders("action_text_template", text, input.entity_type, &mut errors);
    }

    match (&input.task_title_template, input.auto_create_task) {
        (Some(title), _) if !title.trim().is_empty() => {
            check_placeholders("task_title_template", title, input.entity_type, &mut errors);
        }
        (_, true) => errors.push(FieldError::new(
            "task_title_template",
            "is required when auto_create_task is enabled",
        )),
        _ => {}
    }

    errors
}

/// Retrieves active rules visible in `scope`, highest priority first.
///
/// Rules of equal priority keep creation order.
pub async fn list_active_rules(
    db: &DatabaseConnection,
    scope: &RuleScope,
) -> Result<Vec<reminder_rule::Model>> {
    let mut rules = ReminderRule::find()
        .filter(reminder_rule::Column::IsActive.eq(true))
        .filter(scope.visibility())
        .order_by_asc(reminder_rule::Column::Id)
        .all(db)
        .await?;
    rules.sort_by_key(|rule| Reverse(rule.priority.rank()));
    Ok(rules)
}

/// Retrieves every rule visible in `scope`, active or not, ordered by name.
pub async fn list_rules(
    db: &DatabaseConnection,
    scope: &RuleScope,
) -> Result<Vec<reminder_rule::Model>> {
    ReminderRule::find()
        .filter(scope.visibility())
        .order_by_asc(reminder_rule::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a rule by its unique name, regardless of scope.
pub async fn get_rule_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<reminder_rule::Model>> {
    ReminderRule::find()
        .filter(reminder_rule::Column::Name.eq(name.trim()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a rule by id, treating rules outside `scope` as missing.
pub async fn get_rule(
    db: &DatabaseConnection,
    rule_id: i64,
    scope: &RuleScope,
) -> Result<reminder_rule::Model> {
    ReminderRule::find_by_id(rule_id)
        .one(db)
        .await?
        .filter(|rule| scope.can_view(rule.team_id.as_deref()))
        .ok_or(Error::RuleNotFound { id: rule_id })
}

async fn ensure_name_available(
    db: &DatabaseConnection,
    name: &str,
    current_id: Option<i64>,
) -> Result<()> {
    if let Some(existing) = get_rule_by_name(db, name).await? {
        if Some(existing.id) != current_id {
            return Err(Error::Validation {
                errors: vec![FieldError::new(
                    "name",
                    format!("a rule named '{}' already exists", existing.name),
                )],
            });
        }
    }
    Ok(())
}

fn apply_scope_to_team(input: &mut RuleInput, scope: &RuleScope) -> Result<()> {
    if let RuleScope::Team(team) = scope {
        match input.team_id.as_deref() {
            None => input.team_id = Some(team.clone()),
            Some(owner) if owner == team => {}
            Some(_) => {
                return Err(Error::Forbidden {
                    action: "assign a rule to another team".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Creates a rule after validating it.
///
/// Team callers always create rules owned by their team.
pub async fn create_rule(
    db: &DatabaseConnection,
    mut input: RuleInput,
    scope: &RuleScope,
    actor_id: &str,
) -> Result<reminder_rule::Model> {
    apply_scope_to_team(&mut input, scope)?;

    let errors = validate_rule(&input);
    if !errors.is_empty() {
        return Err(Error::Validation { errors });
    }
    ensure_name_available(db, &input.name, None).await?;

    let now = Utc::now();
    let mut model = reminder_rule::ActiveModel {
        created_by: Set(actor_id.to_string()),
        updated_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    input.write_to(&mut model);

    let rule = model.insert(db).await?;
    tracing::info!(rule_id = rule.id, name = %rule.name, "Created reminder rule");
    Ok(rule)
}

/// Applies a partial update and re-validates the resulting rule.
pub async fn update_rule(
    db: &DatabaseConnection,
    rule_id: i64,
    update: RuleUpdate,
    scope: &RuleScope,
    actor_id: &str,
) -> Result<reminder_rule::Model> {
    let existing = get_rule(db, rule_id, scope).await?;
    if !scope.can_modify(existing.team_id.as_deref()) {
        return Err(Error::Forbidden {
            action: format!("modify rule {rule_id}"),
        });
    }

    let mut input = RuleInput::from_model(&existing);
    update.apply_to(&mut input);
    apply_scope_to_team(&mut input, scope)?;

    let errors = validate_rule(&input);
    if !errors.is_empty() {
        return Err(Error::Validation { errors });
    }
    ensure_name_available(db, &input.name, Some(rule_id)).await?;

    let mut model: reminder_rule::ActiveModel = existing.into();
    input.write_to(&mut model);
    model.updated_by = Set(Some(actor_id.to_string()));
    model.updated_at = Set(Utc::now());

    let rule = model.update(db).await?;
    tracing::info!(rule_id = rule.id, "Updated reminder rule");
    Ok(rule)
}

/// Flips a rule's `is_active` flag.
pub async fn toggle_rule(
    db: &DatabaseConnection,
    rule_id: i64,
    scope: &RuleScope,
    actor_id: &str,
) -> Result<reminder_rule::Model> {
    let existing = get_rule(db, rule_id, scope).await?;
    let update = RuleUpdate {
        is_active: Some(!existing.is_active),
        ..Default::default()
    };
    update_rule(db, rule_id, update, scope, actor_id).await
}

/// Permanently deletes a rule. Global administrators only.
///
/// Ledger rows referencing the rule are kept as audit trail.
pub async fn delete_rule(db: &DatabaseConnection, rule_id: i64, scope: &RuleScope) -> Result<()> {
    if !scope.is_global() {
        return Err(Error::Forbidden {
            action: "delete rules".to_string(),
        });
    }
    let result = ReminderRule::delete_by_id(rule_id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::RuleNotFound { id: rule_id });
    }
    tracing::info!(rule_id, "Deleted reminder rule");
    Ok(())
}
