//! Notification ledger - Deduplication log of every dispatch attempt.
//!
//! A dedup key is the `(rule, entity type, entity id, recipient)` tuple. A
//! successful send inside the anti-spam window suppresses another one for the
//! same key; failed and pending rows never do. Writers holding
//! [`TupleLocks`] for a key have exclusive check-dispatch-record access to it
//! within this process. Across processes, a key must be [`claim`]ed before
//! dispatch; claims live in a table with a unique dedup key.

use crate::core::rule::RuleScope;
use crate::entities::{
    DispatchClaim, EntityType, LogStatus, NotificationLog, ReminderRule, dispatch_claim,
    notification_log, reminder_rule,
};
use crate::errors::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    Condition, PaginatorTrait, QueryOrder, QuerySelect, Set, SqlErr, prelude::*, sea_query::Expr,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identity of one notification for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    /// Rule that produced the notification
    pub rule_id: i64,
    /// Entity family
    pub entity_type: EntityType,
    /// Entity id within its family
    pub entity_id: i64,
    /// Recipient user id
    pub recipient_id: String,
}

impl DedupKey {
    /// Builds a key from its parts.
    pub fn new(
        rule_id: i64,
        entity_type: EntityType,
        entity_id: i64,
        recipient_id: impl Into<String>,
    ) -> Self {
        Self {
            rule_id,
            entity_type,
            entity_id,
            recipient_id: recipient_id.into(),
        }
    }
}

fn matching(key: &DedupKey) -> Select<NotificationLog> {
    NotificationLog::find()
        .filter(notification_log::Column::RuleId.eq(key.rule_id))
        .filter(notification_log::Column::EntityType.eq(key.entity_type))
        .filter(notification_log::Column::EntityId.eq(key.entity_id))
        .filter(notification_log::Column::RecipientId.eq(key.recipient_id.as_str()))
}

fn claim_matching(key: &DedupKey) -> Condition {
    Condition::all()
        .add(dispatch_claim::Column::RuleId.eq(key.rule_id))
        .add(dispatch_claim::Column::EntityType.eq(key.entity_type))
        .add(dispatch_claim::Column::EntityId.eq(key.entity_id))
        .add(dispatch_claim::Column::RecipientId.eq(key.recipient_id.as_str()))
}

/// `now` minus `hours`, or a config error when that is not a representable
/// instant.
pub fn hours_before(now: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(hours)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| Error::Config {
            message: format!("a look-back of {hours} hours is out of range"),
        })
}

fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| Error::Config {
            message: format!("a retention of {days} days is out of range"),
        })
}

/// Returns the most recent successful send for `key` within the last
/// `within_hours`, if any.
pub async fn recently_fired(
    db: &DatabaseConnection,
    key: &DedupKey,
    within_hours: i64,
    now: DateTime<Utc>,
) -> Result<Option<notification_log::Model>> {
    let since = hours_before(now, within_hours)?;
    matching(key)
        .filter(notification_log::Column::Status.eq(LogStatus::Sent))
        .filter(notification_log::Column::SentAt.gte(since))
        .order_by_desc(notification_log::Column::SentAt)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Claims `key` for one dispatch by `holder`.
///
/// Returns `true` when no claim exists yet or the previous one is older than
/// the anti-spam window, and `false` when another dispatch inside the window
/// already holds it. The unique key on the claim table makes the insert path
/// safe between engine instances.
pub async fn claim(
    db: &DatabaseConnection,
    key: &DedupKey,
    holder: &str,
    within_hours: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let since = hours_before(now, within_hours)?;

    let taken = DispatchClaim::update_many()
        .col_expr(dispatch_claim::Column::Holder, Expr::value(holder))
        .col_expr(dispatch_claim::Column::ClaimedAt, Expr::value(now))
        .filter(claim_matching(key))
        .filter(dispatch_claim::Column::ClaimedAt.lt(since))
        .exec(db)
        .await?;
    if taken.rows_affected > 0 {
        return Ok(true);
    }

    let row = dispatch_claim::ActiveModel {
        rule_id: Set(key.rule_id),
        entity_type: Set(key.entity_type),
        entity_id: Set(key.entity_id),
        recipient_id: Set(key.recipient_id.clone()),
        holder: Set(holder.to_string()),
        claimed_at: Set(now),
        ..Default::default()
    };
    match row.insert(db).await {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            tracing::debug!(
                rule_id = key.rule_id,
                entity_id = key.entity_id,
                recipient = %key.recipient_id,
                "Dispatch already claimed"
            );
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Drops the claim `holder` made at `claimed_at`, so the key is retried on
/// the next tick. Claims since taken over by someone else are left alone.
pub async fn release_claim(
    db: &DatabaseConnection,
    key: &DedupKey,
    holder: &str,
    claimed_at: DateTime<Utc>,
) -> Result<()> {
    DispatchClaim::delete_many()
        .filter(claim_matching(key))
        .filter(dispatch_claim::Column::Holder.eq(holder))
        .filter(dispatch_claim::Column::ClaimedAt.eq(claimed_at))
        .exec(db)
        .await?;
    Ok(())
}

/// Appends one ledger row for a dispatch attempt.
pub async fn record(
    db: &DatabaseConnection,
    key: &DedupKey,
    notification_type: &str,
    status: LogStatus,
    error_message: Option<String>,
    now: DateTime<Utc>,
) -> Result<notification_log::Model> {
    let row = notification_log::ActiveModel {
        rule_id: Set(key.rule_id),
        entity_type: Set(key.entity_type),
        entity_id: Set(key.entity_id),
        recipient_id: Set(key.recipient_id.clone()),
        notification_type: Set(notification_type.to_string()),
        status: Set(status),
        error_message: Set(error_message),
        sent_at: Set(now),
        ..Default::default()
    };
    row.insert(db).await.map_err(Into::into)
}

/// Lists every ledger row for `key`, newest first.
pub async fn history(
    db: &DatabaseConnection,
    key: &DedupKey,
) -> Result<Vec<notification_log::Model>> {
    matching(key)
        .order_by_desc(notification_log::Column::SentAt)
        .order_by_desc(notification_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Deletes rows older than `retention_days`, returning how many ledger rows
/// went. Claims past the same horizon go with them.
pub async fn purge_older_than(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    retention_days: i64,
) -> Result<u64> {
    let cutoff = days_before(now, retention_days)?;
    let result = NotificationLog::delete_many()
        .filter(notification_log::Column::SentAt.lt(cutoff))
        .exec(db)
        .await?;
    DispatchClaim::delete_many()
        .filter(dispatch_claim::Column::ClaimedAt.lt(cutoff))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(
            purged = result.rows_affected,
            retention_days,
            "Purged old notification log rows"
        );
    }
    Ok(result.rows_affected)
}

/// Ledger counts by status since a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Successful deliveries
    pub sent: u64,
    /// Failed deliveries
    pub failed: u64,
    /// Attempts still pending
    pub pending: u64,
    /// Most recent failures, newest first
    pub recent_failures: Vec<notification_log::Model>,
}

/// Ids of the rules whose deliveries `scope` may audit: every rule for a
/// global administrator, only the team's own rules otherwise.
async fn audited_rule_ids(db: &DatabaseConnection, scope: &RuleScope) -> Result<Option<Vec<i64>>> {
    let RuleScope::Team(team) = scope else {
        return Ok(None);
    };
    let ids = ReminderRule::find()
        .select_only()
        .column(reminder_rule::Column::Id)
        .filter(reminder_rule::Column::TeamId.eq(team.as_str()))
        .into_tuple::<i64>()
        .all(db)
        .await?;
    Ok(Some(ids))
}

/// Summarises ledger activity visible in `scope` since `since`, keeping up
/// to `failure_limit` of the latest failures.
pub async fn stats(
    db: &DatabaseConnection,
    scope: &RuleScope,
    since: DateTime<Utc>,
    failure_limit: u64,
) -> Result<LedgerStats> {
    let rule_ids = audited_rule_ids(db, scope).await?;
    let in_scope = || {
        let query = NotificationLog::find().filter(notification_log::Column::SentAt.gte(since));
        match &rule_ids {
            Some(ids) => query.filter(notification_log::Column::RuleId.is_in(ids.iter().copied())),
            None => query,
        }
    };
    let count = |status: LogStatus| {
        in_scope()
            .filter(notification_log::Column::Status.eq(status))
            .count(db)
    };

    let sent = count(LogStatus::Sent).await?;
    let failed = count(LogStatus::Failed).await?;
    let pending = count(LogStatus::Pending).await?;
    let recent_failures = in_scope()
        .filter(notification_log::Column::Status.eq(LogStatus::Failed))
        .order_by_desc(notification_log::Column::SentAt)
        .limit(failure_limit)
        .all(db)
        .await?;

    Ok(LedgerStats {
        sent,
        failed,
        pending,
        recent_failures,
    })
}

/// Per-key async locks serializing check-dispatch-record sequences.
///
/// Entries hold weak references, so a key's lock lives only while a guard
/// for it exists.
#[derive(Debug, Default)]
pub struct TupleLocks {
    locks: StdMutex<HashMap<DedupKey, Weak<Mutex<()>>>>,
}

impl TupleLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &DedupKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&fresh));
        fresh
    }

    /// Acquires the locks for every key, in sorted order so that concurrent
    /// callers with overlapping key sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[DedupKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&DedupKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.handle(key).lock_owned().await);
        }
        guards
    }

    /// Number of keys currently locked or awaited.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::rule::create_rule;
    use crate::test_utils::*;
    use std::time::Duration as StdDuration;

    fn key(recipient: &str) -> DedupKey {
        DedupKey::new(1, EntityType::Task, 42, recipient)
    }

    #[tokio::test]
    async fn test_recently_fired_only_counts_sent_rows_in_window() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();

        record(&db, &key("U1"), "test", LogStatus::Failed, Some("boom".into()), now).await?;
        assert!(recently_fired(&db, &key("U1"), 23, now).await?.is_none());

        record(&db, &key("U1"), "test", LogStatus::Sent, None, now - Duration::hours(24)).await?;
        assert!(recently_fired(&db, &key("U1"), 23, now).await?.is_none());

        let recent = record(&db, &key("U1"), "test", LogStatus::Sent, None, now - Duration::hours(1)).await?;
        let found = recently_fired(&db, &key("U1"), 23, now).await?.unwrap();
        assert_eq!(found.id, recent.id);

        assert!(recently_fired(&db, &key("U2"), 23, now).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        record(&db, &key("U1"), "test", LogStatus::Sent, None, now - Duration::hours(23)).await?;
        assert!(recently_fired(&db, &key("U1"), 23, now).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_history_and_purge() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        record(&db, &key("U1"), "test", LogStatus::Sent, None, now - Duration::days(120)).await?;
        record(&db, &key("U1"), "test", LogStatus::Sent, None, now - Duration::days(10)).await?;

        assert_eq!(history(&db, &key("U1")).await?.len(), 2);
        assert_eq!(purge_older_than(&db, now, 90).await?, 1);

        let remaining = history(&db, &key("U1")).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sent_at, now - Duration::days(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        record(&db, &key("U1"), "test", LogStatus::Sent, None, now).await?;
        record(&db, &key("U2"), "test", LogStatus::Sent, None, now).await?;
        record(&db, &key("U3"), "test", LogStatus::Failed, Some("blocked".into()), now).await?;
        record(&db, &key("U4"), "test", LogStatus::Sent, None, now - Duration::days(3)).await?;

        let stats = stats(&db, &RuleScope::Global, now - Duration::days(1), 5).await?;
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.recent_failures.len(), 1);
        assert_eq!(stats.recent_failures[0].error_message.as_deref(), Some("blocked"));
        Ok(())
    }

    #[tokio::test]
    async fn test_team_stats_only_cover_own_rules() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let global = create_rule(&db, overdue_task_input("Global"), &RuleScope::Global, "admin").await?;
        let team_a = RuleScope::Team("team-a".to_string());
        let own = create_rule(&db, overdue_task_input("Team A"), &team_a, "lead").await?;
        let other = create_rule(
            &db,
            overdue_task_input("Team B"),
            &RuleScope::Team("team-b".to_string()),
            "lead",
        )
        .await?;

        record(&db, &DedupKey::new(own.id, EntityType::Task, 1, "U1"), "test", LogStatus::Sent, None, now).await?;
        record(&db, &DedupKey::new(own.id, EntityType::Task, 1, "U2"), "test", LogStatus::Failed, Some("blocked".into()), now).await?;
        record(&db, &DedupKey::new(global.id, EntityType::Task, 2, "U9"), "test", LogStatus::Failed, Some("closed dms".into()), now).await?;
        record(&db, &DedupKey::new(other.id, EntityType::Task, 3, "U8"), "test", LogStatus::Sent, None, now).await?;

        let scoped = stats(&db, &team_a, now - Duration::days(1), 5).await?;
        assert_eq!(scoped.sent, 1);
        assert_eq!(scoped.failed, 1);
        assert_eq!(scoped.recent_failures.len(), 1);
        assert_eq!(scoped.recent_failures[0].recipient_id, "U2");

        let everything = stats(&db, &RuleScope::Global, now - Duration::days(1), 5).await?;
        assert_eq!(everything.sent, 2);
        assert_eq!(everything.failed, 2);

        let empty_team = stats(&db, &RuleScope::Team("team-c".to_string()), now - Duration::days(1), 5).await?;
        assert_eq!(empty_team, LedgerStats::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_within_window() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();

        assert!(claim(&db, &key("U1"), "a", 23, now).await?);
        assert!(!claim(&db, &key("U1"), "b", 23, now + Duration::minutes(11)).await?);
        assert!(!claim(&db, &key("U1"), "a", 23, now + Duration::hours(23)).await?);
        // Other recipients are independent.
        assert!(claim(&db, &key("U2"), "b", 23, now).await?);

        // Past the window the key can be claimed again.
        assert!(claim(&db, &key("U1"), "b", 23, now + Duration::hours(24)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_released_claim_can_be_retaken() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();

        assert!(claim(&db, &key("U1"), "a", 23, now).await?);
        release_claim(&db, &key("U1"), "b", now).await?;
        assert!(!claim(&db, &key("U1"), "b", 23, now).await?);

        release_claim(&db, &key("U1"), "a", now).await?;
        assert!(claim(&db, &key("U1"), "b", 23, now + Duration::minutes(1)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_out_of_range_windows_are_errors() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        assert!(matches!(recently_fired(&db, &key("U1"), i64::MAX, now).await, Err(Error::Config { .. })));
        assert!(matches!(purge_older_than(&db, now, i64::MAX).await, Err(Error::Config { .. })));
        assert!(matches!(claim(&db, &key("U1"), "a", i64::MAX, now).await, Err(Error::Config { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_tuple_locks_serialize_same_key() {
        let locks = Arc::new(TupleLocks::new());
        let guards = locks.lock_all(&[key("U1"), key("U2")]).await;
        assert_eq!(locks.active(), 2);

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.lock_all(&[key("U2")]).await.len() })
        };
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // A disjoint key is not blocked.
        let other = locks.lock_all(&[key("U3")]).await;
        assert_eq!(other.len(), 1);

        drop(guards);
        assert_eq!(contender.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tuple_locks_release_entries() {
        let locks = TupleLocks::new();
        {
            let _guards = locks.lock_all(&[key("U1"), key("U1")]).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}
