//! Notification dispatch - Resolves recipients and fans a rendered
//! notification out through the transport.
//!
//! The recipient set is the candidate's assignee plus, for team-scoped rules,
//! every active member of the rule's team. The union is de-duplicated before
//! sending, and each recipient's delivery is independent: one failure never
//! blocks the others.

use crate::core::scanner::ReminderCandidate;
use crate::core::template::RenderedNotification;
use crate::entities::ReminderRuleModel;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound delivery channel (Discord DM, email, ...).
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Channel name recorded in the ledger as `notification_type`.
    fn channel(&self) -> &str;

    /// Delivers one notification to one recipient.
    async fn send(&self, recipient_id: &str, notification: &RenderedNotification) -> Result<()>;
}

/// User/team directory used for team fan-out.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    /// Active member ids of a team.
    async fn list_active_team_members(&self, team_id: &str) -> Result<Vec<String>>;
}

/// Delivery result for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    /// Recipient user id
    pub recipient_id: String,
    /// `None` on success, the failure message otherwise
    pub error: Option<String>,
}

impl RecipientOutcome {
    /// Whether delivery succeeded.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.error.is_none()
    }
}

/// Unions the assignee with extra recipients, keeping first-seen order and
/// dropping duplicates and blanks.
#[must_use]
pub fn merge_recipients(assignee: Option<&str>, others: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    assignee
        .into_iter()
        .chain(others.iter().map(String::as_str))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(ToString::to_string)
        .collect()
}

/// Computes who should hear about `candidate` under `rule`.
pub async fn resolve_recipients(
    rule: &ReminderRuleModel,
    candidate: &ReminderCandidate,
    directory: &dyn TeamDirectory,
) -> Result<Vec<String>> {
    let team_members = match rule.team_id.as_deref() {
        Some(team_id) => directory.list_active_team_members(team_id).await?,
        None => Vec::new(),
    };
    Ok(merge_recipients(
        candidate.assignee_id.as_deref(),
        &team_members,
    ))
}

/// Sends rendered notifications through a transport.
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher over a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self { transport }
    }

    /// Channel name of the underlying transport.
    #[must_use]
    pub fn channel(&self) -> &str {
        self.transport.channel()
    }

    /// Sends `notification` to every distinct recipient, returning one
    /// outcome per recipient in send order.
    pub async fn dispatch(
        &self,
        recipient_ids: &[String],
        notification: &RenderedNotification,
    ) -> Vec<RecipientOutcome> {
        let recipients = merge_recipients(None, recipient_ids);
        let mut outcomes = Vec::with_capacity(recipients.len());

        for recipient_id in recipients {
            let error = match self.transport.send(&recipient_id, notification).await {
                Ok(()) => {
                    debug!(recipient = %recipient_id, title = %notification.title, "Notification delivered");
                    None
                }
                Err(e) => {
                    warn!(recipient = %recipient_id, error = %e, "Notification delivery failed");
                    Some(e.to_string())
                }
            };
            outcomes.push(RecipientOutcome {
                recipient_id,
                error,
            });
        }

        outcomes
    }
}
