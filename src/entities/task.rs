//! Task entity - Work items with a due date, scanned by task rules and
//! created by the follow-up task spawner.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Task database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    /// Unique identifier for the task
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short title shown in reminders
    pub title: String,
    /// Longer description
    pub description: Option<String>,
    /// Workflow status: `todo`, `in_progress`, `done`, `cancelled`
    pub status: String,
    /// `low`, `medium`, `high` or `urgent`
    pub priority: String,
    /// When the task is due
    pub due_date: Option<DateTimeUtc>,
    /// User the task is assigned to
    pub assignee_id: Option<String>,
    /// Owning team
    pub team_id: Option<String>,
    /// User who created the task
    pub created_by: String,
    /// When the task was created
    pub created_at: DateTimeUtc,
}

/// `Task` has no relationships the engine follows
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
