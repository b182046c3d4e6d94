//! Follow-up task creation for rules with `auto_create_task` set.
//!
//! The orchestrator only calls the spawner after at least one recipient was
//! notified in the same guarded step, so a candidate gets at most one
//! follow-up per anti-spam window.

use crate::core::scanner::ReminderCandidate;
use crate::core::template;
use crate::entities::{Priority, ReminderRuleModel};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Fields of a work item to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkItem {
    /// Rendered task title
    pub title: String,
    /// Rendered notification message
    pub description: String,
    /// Task priority
    pub priority: Priority,
    /// When the follow-up is due
    pub due_date: DateTime<Utc>,
    /// Who the follow-up is assigned to
    pub assignee_id: String,
    /// Team context for the new item
    pub team_id: Option<String>,
    /// Recorded creator (the rule's creator)
    pub creator_id: String,
}

/// Write access to the work-item store.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Creates a work item and returns its id.
    async fn create(&self, item: NewWorkItem) -> Result<i64>;
}

/// Builds the follow-up for `candidate`, or `None` when the rule does not
/// auto-create tasks or has no task title template.
#[must_use]
pub fn build_work_item(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    now: DateTime<Utc>,
) -> Option<NewWorkItem> {
    let title = template::render_task_title(rule, candidate, now)?;
    Some(NewWorkItem {
        title,
        description: template::render_message(rule, candidate, now),
        priority: rule.task_priority.unwrap_or(rule.priority),
        due_date: now + Duration::days(1),
        assignee_id: candidate
            .assignee_id
            .clone()
            .unwrap_or_else(|| rule.created_by.clone()),
        team_id: candidate.team_id.clone().or_else(|| rule.team_id.clone()),
        creator_id: rule.created_by.clone(),
    })
}

/// Creates follow-up tasks through a [`WorkItemStore`].
pub struct TaskSpawner {
    store: Arc<dyn WorkItemStore>,
}

impl TaskSpawner {
    /// Creates a spawner over a work-item store.
    #[must_use]
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }

    /// Creates the follow-up task, returning its id, or `Ok(None)` when the
    /// rule is not configured to spawn.
    ///
    /// Store failures are reported as [`Error::Spawn`].
    pub async fn spawn(
        &self,
        rule: &ReminderRuleModel,
        candidate: &ReminderCandidate,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let Some(item) = build_work_item(rule, candidate, now) else {
            return Ok(None);
        };

        let id = self.store.create(item).await.map_err(|e| Error::Spawn {
            message: e.to_string(),
        })?;
        info!(
            rule_id = rule.id,
            entity_id = candidate.entity_id,
            task_id = id,
            "Spawned follow-up task"
        );
        Ok(Some(id))
    }
}
