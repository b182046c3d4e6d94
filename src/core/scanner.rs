//! Candidate scanning - Finds entities whose reference date falls inside a
//! rule's trigger window while their status is still open.
//!
//! The scanner is the only place that knows how an entity type maps to its
//! open statuses and reference date column; it reads that from
//! [`EntityProfiles`] and hands a uniform [`CandidateQuery`] to the
//! [`EntityStore`]. Scans are read-only and bounded by the configured page
//! size; anything past the page is picked up on a later tick because its
//! window condition persists.

use crate::config::engine::EntityProfiles;
use crate::entities::{EntityType, ReminderRuleModel, TriggerType};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Uniform projection of one matched entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderCandidate {
    /// Entity family
    pub entity_type: EntityType,
    /// Id within the entity table
    pub entity_id: i64,
    /// Display title, if the entity has one
    pub title: Option<String>,
    /// Business number (quote/invoice number)
    pub number: Option<String>,
    /// The date the trigger window is measured against
    pub reference_date: DateTime<Utc>,
    /// Assigned user id
    pub assignee_id: Option<String>,
    /// Assigned user's display name
    pub assignee_name: Option<String>,
    /// Owning team id
    pub team_id: Option<String>,
    /// Institution id (quotes and invoices)
    pub institution_id: Option<i64>,
    /// Institution display name
    pub institution_name: Option<String>,
    /// Current status
    pub status: String,
    /// Amount (quotes and invoices)
    pub amount: Option<f64>,
}

impl ReminderCandidate {
    /// Title, falling back to the business number, then to an empty string.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.is_empty())
            .or(self.number.as_deref())
            .unwrap_or_default()
    }
}

/// Date range a candidate's reference date must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerWindow {
    /// `start <= date <= end`
    Between {
        /// Inclusive lower bound
        start: DateTime<Utc>,
        /// Inclusive upper bound
        end: DateTime<Utc>,
    },
    /// `date < end`
    Before(DateTime<Utc>),
}

impl TriggerWindow {
    /// Computes the window for a trigger relative to `now`.
    #[must_use]
    pub fn for_trigger(
        trigger_type: TriggerType,
        days_before: i32,
        days_after: i32,
        now: DateTime<Utc>,
    ) -> Self {
        if trigger_type.looks_forward() {
            Self::Between {
                start: now,
                end: now + Duration::days(i64::from(days_before.max(0))),
            }
        } else {
            Self::Before(now - Duration::days(i64::from(days_after.max(0))))
        }
    }

    /// Computes the window for a rule relative to `now`.
    #[must_use]
    pub fn for_rule(rule: &ReminderRuleModel, now: DateTime<Utc>) -> Self {
        Self::for_trigger(rule.trigger_type, rule.days_before, rule.days_after, now)
    }

    /// Whether a reference date lies inside the window.
    #[must_use]
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        match *self {
            Self::Between { start, end } => start <= date && date <= end,
            Self::Before(end) => date < end,
        }
    }
}

/// Everything an entity store needs to answer one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    /// Entity family to query
    pub entity_type: EntityType,
    /// Column holding the reference date
    pub date_field: String,
    /// Window the reference date must fall in
    pub window: TriggerWindow,
    /// Statuses that still count as open
    pub open_statuses: Vec<String>,
    /// Maximum rows to return
    pub limit: u64,
}

/// Read access to the business entities the engine reminds about.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Returns up to `query.limit` open entities inside the window, earliest
    /// reference date first.
    async fn find_open_candidates(&self, query: &CandidateQuery) -> Result<Vec<ReminderCandidate>>;
}

/// Turns rules into candidate lists.
pub struct CandidateScanner {
    store: Arc<dyn EntityStore>,
    profiles: EntityProfiles,
    page_size: u64,
}

impl CandidateScanner {
    /// Creates a scanner over an entity store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, profiles: EntityProfiles, page_size: u64) -> Self {
        Self {
            store,
            profiles,
            page_size,
        }
    }

    /// Builds the store query for a rule.
    #[must_use]
    pub fn query_for(&self, rule: &ReminderRuleModel, now: DateTime<Utc>) -> CandidateQuery {
        let profile = self.profiles.get(rule.entity_type);
        CandidateQuery {
            entity_type: rule.entity_type,
            date_field: profile.reference_date_field.clone(),
            window: TriggerWindow::for_rule(rule, now),
            open_statuses: profile.open_statuses.clone(),
            limit: self.page_size,
        }
    }

    /// Scans for candidates matching `rule` at `now`.
    ///
    /// Store failures are reported as [`Error::Scan`] for the rule's entity type.
    pub async fn scan(&self, rule: &ReminderRuleModel, now: DateTime<Utc>) -> Result<Vec<ReminderCandidate>> {
        let query = self.query_for(rule, now);
        let candidates = self
            .store
            .find_open_candidates(&query)
            .await
            .map_err(|e| match e {
                Error::Scan { .. } => e,
                other => Error::Scan {
                    entity_type: rule.entity_type.to_string(),
                    message: other.to_string(),
                },
            })?;

        Ok(candidates
            .into_iter()
            .filter(|candidate| {
                query.window.contains(candidate.reference_date)
                    && query.open_statuses.contains(&candidate.status)
            })
            .take(usize::try_from(query.limit).unwrap_or(usize::MAX))
            .collect())
    }
}
