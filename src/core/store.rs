//! Database-backed collaborators - The entity store, team directory and
//! work-item store the engine talks to, implemented over the `SeaORM` tables.
//!
//! The reference date column comes from the entity profile by name, so a
//! profile change in config.toml needs no code change here.

use crate::core::dispatch::TeamDirectory;
use crate::core::scanner::{CandidateQuery, EntityStore, ReminderCandidate, TriggerWindow};
use crate::core::spawner::{NewWorkItem, WorkItemStore};
use crate::entities::{
    EntityType, Institution, Invoice, Quote, Task, TeamMember, User, institution, invoice, quote,
    task, team_member, user,
};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, Set, Value,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// `SeaORM` implementation of every engine collaborator.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    /// Wraps a database connection.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn user_names(&self, ids: HashSet<String>) -> Result<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = User::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u.display_name)).collect())
    }

    async fn institution_names(&self, ids: HashSet<i64>) -> Result<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let institutions = Institution::find()
            .filter(institution::Column::Id.is_in(ids))
            .all(&self.db)
            .await?;
        Ok(institutions.into_iter().map(|i| (i.id, i.name)).collect())
    }

    async fn scan_tasks(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>> {
        let date_column: task::Column = resolve_column(query)?;
        let rows = windowed(Task::find(), date_column, query)
            .filter(task::Column::Status.is_in(query.open_statuses.clone()))
            .all(&self.db)
            .await?;

        let names = self
            .user_names(rows.iter().filter_map(|t| t.assignee_id.clone()).collect())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let reference_date = datetime_value(row.get(date_column))?;
                Some(ReminderCandidate {
                    entity_type: EntityType::Task,
                    entity_id: row.id,
                    assignee_name: row.assignee_id.as_ref().and_then(|id| names.get(id).cloned()),
                    title: Some(row.title),
                    number: None,
                    reference_date,
                    assignee_id: row.assignee_id,
                    team_id: row.team_id,
                    institution_id: None,
                    institution_name: None,
                    status: row.status,
                    amount: None,
                })
            })
            .collect())
    }

    async fn scan_quotes(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>> {
        let date_column: quote::Column = resolve_column(query)?;
        let rows = windowed(Quote::find(), date_column, query)
            .filter(quote::Column::Status.is_in(query.open_statuses.clone()))
            .all(&self.db)
            .await?;

        let names = self
            .user_names(rows.iter().filter_map(|q| q.assignee_id.clone()).collect())
            .await?;
        let institutions = self
            .institution_names(rows.iter().filter_map(|q| q.institution_id).collect())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let reference_date = datetime_value(row.get(date_column))?;
                Some(ReminderCandidate {
                    entity_type: EntityType::Quote,
                    entity_id: row.id,
                    assignee_name: row.assignee_id.as_ref().and_then(|id| names.get(id).cloned()),
                    institution_name: row.institution_id.and_then(|id| institutions.get(&id).cloned()),
                    title: row.title,
                    number: Some(row.quote_number),
                    reference_date,
                    assignee_id: row.assignee_id,
                    team_id: row.team_id,
                    institution_id: row.institution_id,
                    status: row.status,
                    amount: Some(row.amount),
                })
            })
            .collect())
    }

    async fn scan_invoices(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>> {
        let date_column: invoice::Column = resolve_column(query)?;
        let rows = windowed(Invoice::find(), date_column, query)
            .filter(invoice::Column::Status.is_in(query.open_statuses.clone()))
            .all(&self.db)
            .await?;

        let names = self
            .user_names(rows.iter().filter_map(|i| i.assignee_id.clone()).collect())
            .await?;
        let institutions = self
            .institution_names(rows.iter().filter_map(|i| i.institution_id).collect())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let reference_date = datetime_value(row.get(date_column))?;
                Some(ReminderCandidate {
                    entity_type: EntityType::Invoice,
                    entity_id: row.id,
                    assignee_name: row.assignee_id.as_ref().and_then(|id| names.get(id).cloned()),
                    institution_name: row.institution_id.and_then(|id| institutions.get(&id).cloned()),
                    title: row.title,
                    number: Some(row.invoice_number),
                    reference_date,
                    assignee_id: row.assignee_id,
                    team_id: row.team_id,
                    institution_id: row.institution_id,
                    status: row.status,
                    amount: Some(row.amount),
                })
            })
            .collect())
    }
}

fn resolve_column<C: FromStr>(query: &CandidateQuery) -> Result<C> {
    C::from_str(&query.date_field).map_err(|_| Error::Scan {
        entity_type: query.entity_type.to_string(),
        message: format!("unknown reference date field '{}'", query.date_field),
    })
}

fn windowed<E>(select: Select<E>, column: E::Column, query: &CandidateQuery) -> Select<E>
where
    E: EntityTrait,
{
    let select = match query.window {
        TriggerWindow::Between { start, end } => {
            select.filter(column.gte(start)).filter(column.lte(end))
        }
        TriggerWindow::Before(end) => select.filter(column.lt(end)),
    };
    select.order_by_asc(column).limit(query.limit)
}

fn datetime_value(value: Value) -> Option<DateTime<Utc>> {
    match value {
        Value::ChronoDateTimeUtc(Some(date)) => Some(*date),
        _ => None,
    }
}

#[async_trait]
impl EntityStore for SeaOrmStore {
    async fn find_open_candidates(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>> {
        match query.entity_type {
            EntityType::Task => self.scan_tasks(query).await,
            EntityType::Quote => self.scan_quotes(query).await,
            EntityType::Invoice => self.scan_invoices(query).await,
        }
    }
}

#[async_trait]
impl TeamDirectory for SeaOrmStore {
    async fn list_active_team_members(&self, team_id: &str) -> Result<Vec<String>> {
        let members: Vec<String> = TeamMember::find()
            .filter(team_member::Column::TeamId.eq(team_id))
            .filter(team_member::Column::IsActive.eq(true))
            .order_by_asc(team_member::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        // Users unknown to the directory are kept; only explicit deactivation excludes
        let inactive: HashSet<String> = User::find()
            .filter(user::Column::Id.is_in(members.clone()))
            .filter(user::Column::IsActive.eq(false))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        Ok(members
            .into_iter()
            .filter(|id| !inactive.contains(id))
            .collect())
    }
}

#[async_trait]
impl WorkItemStore for SeaOrmStore {
    async fn create(&self, item: NewWorkItem) -> Result<i64> {
        let task = task::ActiveModel {
            title: Set(item.title),
            description: Set(Some(item.description)),
            status: Set("todo".to_string()),
            priority: Set(item.priority.to_string()),
            due_date: Set(Some(item.due_date)),
            assignee_id: Set(Some(item.assignee_id)),
            team_id: Set(item.team_id),
            created_by: Set(item.creator_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let created = task.insert(&self.db).await?;
        Ok(created.id)
    }
}
