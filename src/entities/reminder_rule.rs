//! Reminder rule entity - A persisted trigger configuration.
//!
//! Each rule names one entity type, one temporal trigger, the window bounds,
//! the notification templates and an optional follow-up task template. Rules
//! are configuration, not runtime events: the engine only reads them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Business entity family a rule applies to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Work item with a due date
    #[sea_orm(string_value = "task")]
    Task,
    /// Quote with a valid-until date
    #[sea_orm(string_value = "quote")]
    Quote,
    /// Invoice with a due date
    #[sea_orm(string_value = "invoice")]
    Invoice,
}

impl EntityType {
    /// Lowercase name used in templates, logs and the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Quote => "quote",
            Self::Invoice => "invoice",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal predicate evaluated against an entity's reference date.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Reference date is coming up within `days_before`
    #[sea_orm(string_value = "due_soon")]
    DueSoon,
    /// Reference date passed more than `days_after` ago
    #[sea_orm(string_value = "overdue")]
    Overdue,
    /// Quote validity ended more than `days_after` ago
    #[sea_orm(string_value = "expired")]
    Expired,
    /// Invoice still unpaid more than `days_after` past due
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
}

impl TriggerType {
    /// Whether the window looks forward from now (only `due_soon`).
    #[must_use]
    pub const fn looks_forward(self) -> bool {
        matches!(self, Self::DueSoon)
    }

    /// Snake-case name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DueSoon => "due_soon",
            Self::Overdue => "overdue",
            Self::Expired => "expired",
            Self::Unpaid => "unpaid",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule priority, used both for evaluation order and notification severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest priority
    #[sea_orm(string_value = "low")]
    Low,
    /// Default priority
    #[sea_orm(string_value = "medium")]
    Medium,
    /// Elevated priority
    #[sea_orm(string_value = "high")]
    High,
    /// Evaluated first
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

impl Priority {
    /// Ordering rank, higher is evaluated first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }

    /// Lowercase name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reminder rule database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reminder_rules")]
pub struct Model {
    /// Unique identifier for the rule
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique human-readable label (e.g. "Task Overdue")
    #[sea_orm(unique)]
    pub name: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Which candidate scanner applies
    pub entity_type: EntityType,
    /// Which temporal predicate applies
    pub trigger_type: TriggerType,
    /// Forward window in days for `due_soon`
    pub days_before: i32,
    /// Grace period in days for backward-looking triggers
    pub days_after: i32,
    /// Evaluation order and notification severity
    pub priority: Priority,
    /// Inactive rules are skipped by the engine
    pub is_active: bool,
    /// Notification title template
    pub title_template: String,
    /// Notification body template
    pub message_template: String,
    /// Optional link template
    pub action_url_template: Option<String>,
    /// Optional link label template
    pub action_text_template: Option<String>,
    /// Whether a follow-up task is created on firing
    pub auto_create_task: bool,
    /// Title template for the follow-up task
    pub task_title_template: Option<String>,
    /// Priority for the follow-up task, defaults to the rule priority
    pub task_priority: Option<Priority>,
    /// Owning team, `None` for global rules
    pub team_id: Option<String>,
    /// User who created the rule
    pub created_by: String,
    /// User who last updated the rule
    pub updated_by: Option<String>,
    /// When the rule was created
    pub created_at: DateTimeUtc,
    /// When the rule was last modified
    pub updated_at: DateTimeUtc,
}

/// Rules are referenced by ledger rows but own no foreign keys
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
