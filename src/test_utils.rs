//! Shared test utilities for `ReminderBuddy`.
//!
//! This module provides helpers for setting up test databases, inserting
//! entity rows with sensible defaults, and in-process fakes for the engine's
//! external collaborators.

use crate::{
    config::engine::AppConfig,
    core::{
        dispatch::NotificationTransport,
        orchestrator::{EngineDeps, ReminderEngine},
        rule::RuleInput,
        scanner::{CandidateQuery, EntityStore, ReminderCandidate},
        store::SeaOrmStore,
        template::RenderedNotification,
    },
    entities::{
        EntityType, Priority, ReminderRuleModel, TriggerType, institution, invoice, quote, task,
        team_member, user,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A fixed, whole-second "now" so stored timestamps compare exactly.
#[allow(clippy::unwrap_used)]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
}

const OVERDUE_MESSAGE: &str = "Task \"{title}\" is {days} day(s) overdue";

/// A valid, unsaved "task overdue by a day" rule.
///
/// # Defaults
/// * priority: high
/// * `action_url_template`: `/tasks/{id}`
pub fn overdue_task_input(name: &str) -> RuleInput {
    let mut input = RuleInput::new(
        name,
        EntityType::Task,
        TriggerType::Overdue,
        "Task Overdue",
        OVERDUE_MESSAGE,
    );
    input.days_after = 1;
    input.priority = Priority::High;
    input.action_url_template = Some("/tasks/{id}".to_string());
    input
}

/// An in-memory rule model matching [`overdue_task_input`], never persisted.
pub fn sample_rule() -> ReminderRuleModel {
    let now = fixed_now();
    ReminderRuleModel {
        id: 1,
        name: "Task Overdue".to_string(),
        description: None,
        entity_type: EntityType::Task,
        trigger_type: TriggerType::Overdue,
        days_before: 0,
        days_after: 1,
        priority: Priority::High,
        is_active: true,
        title_template: "Task Overdue".to_string(),
        message_template: OVERDUE_MESSAGE.to_string(),
        action_url_template: Some("/tasks/{id}".to_string()),
        action_text_template: None,
        auto_create_task: false,
        task_title_template: None,
        task_priority: None,
        team_id: None,
        created_by: "admin".to_string(),
        updated_by: None,
        created_at: now,
        updated_at: now,
    }
}

/// A candidate titled "Sample task", assigned to `U1`, with no display names.
pub fn sample_candidate(
    entity_type: EntityType,
    entity_id: i64,
    reference_date: DateTime<Utc>,
) -> ReminderCandidate {
    ReminderCandidate {
        entity_type,
        entity_id,
        title: Some("Sample task".to_string()),
        number: None,
        reference_date,
        assignee_id: Some("U1".to_string()),
        assignee_name: None,
        team_id: None,
        institution_id: None,
        institution_name: None,
        status: "todo".to_string(),
        amount: None,
    }
}

/// Inserts a task row.
///
/// # Defaults
/// * priority: "medium"
/// * `team_id`: None
/// * `created_by`: "test"
pub async fn create_test_task(
    db: &DatabaseConnection,
    title: &str,
    due_date: Option<DateTime<Utc>>,
    status: &str,
    assignee_id: Option<&str>,
) -> Result<task::Model> {
    let row = task::ActiveModel {
        title: Set(title.to_string()),
        description: Set(None),
        status: Set(status.to_string()),
        priority: Set("medium".to_string()),
        due_date: Set(due_date),
        assignee_id: Set(assignee_id.map(ToString::to_string)),
        team_id: Set(None),
        created_by: Set("test".to_string()),
        created_at: Set(fixed_now()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts an untitled quote row worth 100.0 with no institution.
pub async fn create_test_quote(
    db: &DatabaseConnection,
    quote_number: &str,
    valid_until: Option<DateTime<Utc>>,
    status: &str,
    assignee_id: Option<&str>,
) -> Result<quote::Model> {
    let row = quote::ActiveModel {
        quote_number: Set(quote_number.to_string()),
        title: Set(None),
        status: Set(status.to_string()),
        valid_until: Set(valid_until),
        assignee_id: Set(assignee_id.map(ToString::to_string)),
        institution_id: Set(None),
        team_id: Set(None),
        amount: Set(100.0),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts an untitled invoice row.
pub async fn create_test_invoice(
    db: &DatabaseConnection,
    invoice_number: &str,
    due_date: Option<DateTime<Utc>>,
    status: &str,
    assignee_id: Option<&str>,
    institution_id: Option<i64>,
    amount: f64,
) -> Result<invoice::Model> {
    let row = invoice::ActiveModel {
        invoice_number: Set(invoice_number.to_string()),
        title: Set(None),
        status: Set(status.to_string()),
        due_date: Set(due_date),
        assignee_id: Set(assignee_id.map(ToString::to_string)),
        institution_id: Set(institution_id),
        team_id: Set(None),
        amount: Set(amount),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts an institution row.
pub async fn create_test_institution(
    db: &DatabaseConnection,
    name: &str,
) -> Result<institution::Model> {
    let row = institution::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Inserts a user row.
pub async fn create_test_user(
    db: &DatabaseConnection,
    id: &str,
    display_name: &str,
    is_active: bool,
) -> Result<user::Model> {
    let row = user::ActiveModel {
        id: Set(id.to_string()),
        display_name: Set(display_name.to_string()),
        is_active: Set(is_active),
    };
    Ok(row.insert(db).await?)
}

/// Adds a user to a team.
pub async fn add_team_member(
    db: &DatabaseConnection,
    team_id: &str,
    user_id: &str,
    is_active: bool,
) -> Result<team_member::Model> {
    let row = team_member::ActiveModel {
        team_id: Set(team_id.to_string()),
        user_id: Set(user_id.to_string()),
        is_active: Set(is_active),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

/// Transport that records deliveries instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, RenderedNotification)>>,
    failing: Vec<String>,
    delay: Option<StdDuration>,
}

impl RecordingTransport {
    /// A transport that rejects every send to the given recipients.
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            failing: recipients.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// A transport where every send takes `delay` to complete.
    pub fn with_delay(delay: StdDuration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Successful deliveries in send order.
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<(String, RenderedNotification)> {
        self.sent.lock().unwrap().clone()
    }

    /// Recipients of successful deliveries in send order.
    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|(recipient, _)| recipient).collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    fn channel(&self) -> &str {
        "test"
    }

    #[allow(clippy::unwrap_used)]
    async fn send(&self, recipient_id: &str, notification: &RenderedNotification) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.iter().any(|r| r == recipient_id) {
            return Err(Error::Dispatch {
                recipient: recipient_id.to_string(),
                message: "recipient unreachable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), notification.clone()));
        Ok(())
    }
}

/// Entity store that fails for selected entity types and otherwise delegates
/// to an inner store, or returns nothing when there is none.
#[derive(Default)]
pub struct FailingEntityStore {
    inner: Option<Arc<dyn EntityStore>>,
    failing: Vec<EntityType>,
}

impl FailingEntityStore {
    /// Fails for `entity_types`, empty for everything else.
    pub fn failing(entity_types: &[EntityType]) -> Self {
        Self {
            inner: None,
            failing: entity_types.to_vec(),
        }
    }

    /// Fails for `entity_types`, delegates everything else to `inner`.
    pub fn wrapping(inner: Arc<dyn EntityStore>, entity_types: &[EntityType]) -> Self {
        Self {
            inner: Some(inner),
            failing: entity_types.to_vec(),
        }
    }
}

#[async_trait]
impl EntityStore for FailingEntityStore {
    async fn find_open_candidates(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>> {
        if self.failing.contains(&query.entity_type) {
            return Err(Error::Config {
                message: format!("{} store unavailable", query.entity_type),
            });
        }
        match &self.inner {
            Some(inner) => inner.find_open_candidates(query).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Engine over the test database with default settings.
pub fn test_engine(db: &DatabaseConnection, transport: Arc<RecordingTransport>) -> ReminderEngine {
    ReminderEngine::with_database_collaborators(db.clone(), &AppConfig::default(), transport)
}

/// Engine whose candidates come from `entity_store`; the database still
/// serves as team directory and work-item store.
pub fn test_engine_with_store(
    db: &DatabaseConnection,
    transport: Arc<RecordingTransport>,
    entity_store: Arc<dyn EntityStore>,
) -> ReminderEngine {
    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let deps = EngineDeps {
        entity_store,
        directory: Arc::clone(&store) as _,
        transport,
        work_items: store,
    };
    ReminderEngine::new(db.clone(), &AppConfig::default(), deps)
}
