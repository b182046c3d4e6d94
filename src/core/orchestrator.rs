//! Reminder orchestrator - One engine tick across every active rule.
//!
//! A tick loads active rules highest priority first and runs each through
//! scan, dedup check, render, dispatch, log and optional spawn. Failures are
//! contained at the smallest unit that produced them: a broken rule is logged
//! and skipped, a broken candidate does not affect its siblings, and a failed
//! recipient is recorded in the ledger as `failed`. Nothing propagates past
//! [`ReminderEngine::run_tick`]; the next tick is the retry.
//!
//! Ticks never overlap. Inside a process a mutex rejects a second concurrent
//! tick; across processes a leased row in `engine_locks` does the same. The
//! lease is renewed between rules and the tick stops once it is lost. Every
//! dispatch is also claimed in the ledger first, so a tick that outlives its
//! lease still cannot double-send.

use crate::config::engine::{AppConfig, EngineConfig};
use crate::core::dispatch::{NotificationDispatcher, NotificationTransport, TeamDirectory, resolve_recipients};
use crate::core::ledger::{self, DedupKey, TupleLocks};
use crate::core::lock;
use crate::core::rule::{RuleScope, list_active_rules};
use crate::core::scanner::{CandidateScanner, EntityStore, ReminderCandidate};
use crate::core::spawner::{TaskSpawner, WorkItemStore};
use crate::core::store::SeaOrmStore;
use crate::core::template;
use crate::entities::{LogStatus, ReminderRuleModel};
use crate::errors::Result;
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use sea_orm::DatabaseConnection;
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// External collaborators the engine talks to.
pub struct EngineDeps {
    /// Source of reminder candidates
    pub entity_store: Arc<dyn EntityStore>,
    /// Team membership lookups for team-scoped rules
    pub directory: Arc<dyn TeamDirectory>,
    /// Notification delivery
    pub transport: Arc<dyn NotificationTransport>,
    /// Follow-up task creation
    pub work_items: Arc<dyn WorkItemStore>,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Rules that completed scanning and processing
    pub rules_processed: usize,
    /// Rules whose scan or setup failed
    pub rules_failed: usize,
    /// Candidates returned by scanners
    pub candidates_scanned: usize,
    /// Candidates whose processing aborted with an error
    pub candidates_failed: usize,
    /// Successful deliveries
    pub notifications_sent: usize,
    /// Failed deliveries, each recorded in the ledger
    pub notifications_failed: usize,
    /// Recipients skipped by the anti-spam window
    pub notifications_suppressed: usize,
    /// Follow-up tasks created
    pub tasks_spawned: usize,
    /// Follow-up tasks that could not be created
    pub spawn_failures: usize,
    /// Ledger rows removed by the retention sweep
    pub logs_purged: u64,
    /// The tick did not run because another one held the lock
    pub skipped: bool,
    /// Shutdown was requested before every rule was processed
    pub cancelled: bool,
    /// Another instance took over the engine lease mid-tick
    pub lease_lost: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

impl AddAssign for TickReport {
    fn add_assign(&mut self, other: Self) {
        self.rules_processed += other.rules_processed;
        self.rules_failed += other.rules_failed;
        self.candidates_scanned += other.candidates_scanned;
        self.candidates_failed += other.candidates_failed;
        self.notifications_sent += other.notifications_sent;
        self.notifications_failed += other.notifications_failed;
        self.notifications_suppressed += other.notifications_suppressed;
        self.tasks_spawned += other.tasks_spawned;
        self.spawn_failures += other.spawn_failures;
        self.logs_purged += other.logs_purged;
        self.skipped |= other.skipped;
        self.cancelled |= other.cancelled;
        self.lease_lost |= other.lease_lost;
    }
}

/// The reminder engine: owns the pipeline and guards tick execution.
pub struct ReminderEngine {
    db: DatabaseConnection,
    config: EngineConfig,
    scanner: CandidateScanner,
    directory: Arc<dyn TeamDirectory>,
    dispatcher: NotificationDispatcher,
    spawner: TaskSpawner,
    tuple_locks: TupleLocks,
    tick_guard: Mutex<()>,
    holder_id: String,
}

impl ReminderEngine {
    /// Builds an engine over explicit collaborators.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: &AppConfig, deps: EngineDeps) -> Self {
        let holder_id = format!(
            "pid{}-{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        );
        Self {
            db,
            config: config.engine.clone(),
            scanner: CandidateScanner::new(
                deps.entity_store,
                config.profiles.clone(),
                config.engine.page_size,
            ),
            directory: deps.directory,
            dispatcher: NotificationDispatcher::new(deps.transport),
            spawner: TaskSpawner::new(deps.work_items),
            tuple_locks: TupleLocks::new(),
            tick_guard: Mutex::new(()),
            holder_id,
        }
    }

    /// Builds an engine whose entity store, team directory and work-item store
    /// are the application database itself.
    #[must_use]
    pub fn with_database_collaborators(
        db: DatabaseConnection,
        config: &AppConfig,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        let store = Arc::new(SeaOrmStore::new(db.clone()));
        let deps = EngineDeps {
            entity_store: Arc::clone(&store) as Arc<dyn EntityStore>,
            directory: Arc::clone(&store) as Arc<dyn TeamDirectory>,
            transport,
            work_items: store,
        };
        Self::new(db, config, deps)
    }

    /// Replaces the instance id used for the cross-instance lease.
    #[must_use]
    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    /// The database the engine reads rules from and writes the ledger to.
    #[must_use]
    pub const fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Active engine settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Channel name recorded in the ledger.
    #[must_use]
    pub fn channel(&self) -> &str {
        self.dispatcher.channel()
    }

    /// Runs one tick at the current time with no shutdown signal.
    pub async fn run_tick_now(&self) -> TickReport {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_tick(Utc::now(), &shutdown_rx).await
    }

    /// Runs one tick at `now`.
    ///
    /// Returns a skipped report when another tick holds the in-process guard
    /// or another instance holds the engine lease. `shutdown` is checked
    /// between rules.
    #[instrument(skip(self, shutdown), fields(holder = %self.holder_id))]
    pub async fn run_tick(&self, now: DateTime<Utc>, shutdown: &watch::Receiver<bool>) -> TickReport {
        let Ok(_running) = self.tick_guard.try_lock() else {
            info!("Previous tick still running, skipping");
            return TickReport::skipped();
        };

        let started = Instant::now();
        let lease = Duration::minutes(self.config.tick_lock_lease_minutes);
        match lock::try_acquire(&self.db, &self.config.lock_key, &self.holder_id, now, lease).await {
            Ok(true) => {}
            Ok(false) => {
                info!(key = %self.config.lock_key, "Engine lease held elsewhere, skipping tick");
                return TickReport::skipped();
            }
            Err(e) => {
                error!(error = %e, "Could not acquire engine lease, skipping tick");
                return TickReport::skipped();
            }
        }

        let mut report = self.process_rules(now, started, shutdown).await;

        match ledger::purge_older_than(&self.db, now, self.config.retention_days).await {
            Ok(purged) => report.logs_purged = purged,
            Err(e) => warn!(error = %e, "Notification log retention sweep failed"),
        }

        if let Err(e) = lock::release(&self.db, &self.config.lock_key, &self.holder_id).await {
            warn!(error = %e, "Failed to release engine lease; it will expire");
        }

        info!(
            rules = report.rules_processed,
            rules_failed = report.rules_failed,
            candidates = report.candidates_scanned,
            sent = report.notifications_sent,
            failed = report.notifications_failed,
            suppressed = report.notifications_suppressed,
            spawned = report.tasks_spawned,
            cancelled = report.cancelled,
            lease_lost = report.lease_lost,
            "Reminder tick complete"
        );
        report
    }

    /// Extends the engine lease to cover the time already spent in this tick.
    async fn renew_lease(&self, now: DateTime<Utc>, started: Instant) -> bool {
        let at = Duration::from_std(started.elapsed())
            .ok()
            .and_then(|spent| now.checked_add_signed(spent))
            .unwrap_or(now);
        let lease = Duration::minutes(self.config.tick_lock_lease_minutes);
        match lock::try_acquire(&self.db, &self.config.lock_key, &self.holder_id, at, lease).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(key = %self.config.lock_key, "Engine lease taken over by another instance, stopping tick");
                false
            }
            Err(e) => {
                warn!(error = %e, "Could not renew engine lease, stopping tick");
                false
            }
        }
    }

    async fn process_rules(
        &self,
        now: DateTime<Utc>,
        started: Instant,
        shutdown: &watch::Receiver<bool>,
    ) -> TickReport {
        let mut report = TickReport::default();

        let rules = match list_active_rules(&self.db, &RuleScope::Global).await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load active reminder rules");
                return report;
            }
        };

        for (index, rule) in rules.iter().enumerate() {
            if *shutdown.borrow() {
                info!(remaining = rules.len() - index, "Shutdown requested, abandoning tick");
                report.cancelled = true;
                break;
            }
            if index > 0 && !self.renew_lease(now, started).await {
                report.lease_lost = true;
                break;
            }

            match self.process_rule(rule, now).await {
                Ok(rule_report) => {
                    report += rule_report;
                    report.rules_processed += 1;
                }
                Err(e) => {
                    error!(rule_id = rule.id, rule = %rule.name, error = %e, "Reminder rule failed");
                    report.rules_failed += 1;
                }
            }
        }

        report
    }

    #[instrument(skip_all, fields(rule_id = rule.id, entity_type = %rule.entity_type))]
    async fn process_rule(&self, rule: &ReminderRuleModel, now: DateTime<Utc>) -> Result<TickReport> {
        let candidates = self.scanner.scan(rule, now).await?;
        debug!(candidates = candidates.len(), "Scanned candidates");

        let mut report = TickReport {
            candidates_scanned: candidates.len(),
            ..TickReport::default()
        };

        let outcomes: Vec<TickReport> = stream::iter(candidates)
            .map(|candidate| self.process_candidate(rule, candidate, now))
            .buffer_unordered(self.config.candidate_concurrency.max(1))
            .collect()
            .await;

        for candidate_report in outcomes {
            report += candidate_report;
        }

        Ok(report)
    }

    /// Runs one candidate through the pipeline. Counts gathered before a
    /// failure stay in the returned report.
    async fn process_candidate(
        &self,
        rule: &ReminderRuleModel,
        candidate: ReminderCandidate,
        now: DateTime<Utc>,
    ) -> TickReport {
        let mut report = TickReport::default();
        if let Err(e) = self.deliver(rule, &candidate, now, &mut report).await {
            warn!(entity_id = candidate.entity_id, error = %e, "Reminder candidate failed");
            report.candidates_failed += 1;
        }
        report
    }

    async fn deliver(
        &self,
        rule: &ReminderRuleModel,
        candidate: &ReminderCandidate,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<()> {
        let recipients = resolve_recipients(rule, candidate, self.directory.as_ref()).await?;
        if recipients.is_empty() {
            debug!(entity_id = candidate.entity_id, "Candidate has no recipients");
            return Ok(());
        }

        let keys: Vec<DedupKey> = recipients
            .into_iter()
            .map(|recipient| DedupKey::new(rule.id, candidate.entity_type, candidate.entity_id, recipient))
            .collect();

        // Held until every outcome is recorded.
        let _guards = self.tuple_locks.lock_all(&keys).await;

        let due = self.claim_due(&keys, now, report).await?;
        if due.is_empty() {
            return Ok(());
        }

        let recipients: Vec<String> = due.iter().map(|key| key.recipient_id.clone()).collect();
        let notification = template::render_notification(rule, candidate, now);
        let outcomes = self.dispatcher.dispatch(&recipients, &notification).await;

        for outcome in outcomes {
            let key = DedupKey::new(rule.id, candidate.entity_type, candidate.entity_id, outcome.recipient_id.as_str());
            let status = if outcome.is_sent() {
                report.notifications_sent += 1;
                LogStatus::Sent
            } else {
                report.notifications_failed += 1;
                if let Err(e) = ledger::release_claim(&self.db, &key, &self.holder_id, now).await {
                    warn!(
                        rule_id = rule.id,
                        entity_id = key.entity_id,
                        recipient = %key.recipient_id,
                        error = %e,
                        "Could not release dispatch claim; retry waits for the window"
                    );
                }
                LogStatus::Failed
            };
            if let Err(e) = ledger::record(&self.db, &key, self.dispatcher.channel(), status, outcome.error, now).await {
                error!(
                    rule_id = rule.id,
                    entity_id = key.entity_id,
                    recipient = %key.recipient_id,
                    status = ?status,
                    error = %e,
                    "Failed to record notification outcome"
                );
            }
        }

        if report.notifications_sent > 0 {
            match self.spawner.spawn(rule, candidate, now).await {
                Ok(Some(_)) => report.tasks_spawned += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(entity_id = candidate.entity_id, error = %e, "Follow-up task creation failed");
                    report.spawn_failures += 1;
                }
            }
        }

        Ok(())
    }

    /// Keys outside the anti-spam window that this engine managed to claim,
    /// in input order. On error, claims already taken are given back.
    async fn claim_due(
        &self,
        keys: &[DedupKey],
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<Vec<DedupKey>> {
        let mut due: Vec<DedupKey> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.try_claim(key, now).await {
                Ok(true) => due.push(key.clone()),
                Ok(false) => {
                    debug!(entity_id = key.entity_id, recipient = %key.recipient_id, "Suppressed by anti-spam window");
                    report.notifications_suppressed += 1;
                }
                Err(e) => {
                    for claimed in &due {
                        if let Err(release_err) = ledger::release_claim(&self.db, claimed, &self.holder_id, now).await {
                            warn!(recipient = %claimed.recipient_id, error = %release_err, "Could not release dispatch claim");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(due)
    }

    async fn try_claim(&self, key: &DedupKey, now: DateTime<Utc>) -> Result<bool> {
        let window = self.config.anti_spam_hours;
        if ledger::recently_fired(&self.db, key, window, now).await?.is_some() {
            return Ok(false);
        }
        ledger::claim(&self.db, key, &self.holder_id, window, now).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::ledger::history;
    use crate::core::rule::{RuleInput, create_rule, delete_rule};
    use crate::entities::{EntityType, Priority, Task, TriggerType};
    use crate::test_utils::*;
    use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
    use std::time::Duration as StdDuration;

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    async fn overdue_rule(db: &DatabaseConnection) -> Result<ReminderRuleModel> {
        create_rule(db, overdue_task_input("Task Overdue"), &RuleScope::Global, "admin").await
    }

    #[tokio::test]
    async fn test_overdue_task_fires_once_then_is_suppressed() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let rule = overdue_rule(&db).await?;
        let task = create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        let first = engine.run_tick(now, &rx).await;
        assert_eq!(first.candidates_scanned, 1);
        assert_eq!(first.notifications_sent, 1);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "U1");
        assert_eq!(sent[0].1.title, "Task Overdue");
        assert!(sent[0].1.message.contains("2 day(s) overdue"));

        let key = DedupKey::new(rule.id, EntityType::Task, task.id, "U1");
        let rows = history(&db, &key).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, LogStatus::Sent);
        assert_eq!(rows[0].notification_type, "test");

        let second = engine.run_tick(now + Duration::minutes(5), &rx).await;
        assert_eq!(second.candidates_scanned, 1);
        assert_eq!(second.notifications_sent, 0);
        assert_eq!(second.notifications_suppressed, 1);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(history(&db, &key).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_fires_again_after_window_elapses() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        overdue_rule(&db).await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        engine.run_tick(now, &rx).await;
        let later = engine.run_tick(now + Duration::hours(24), &rx).await;
        assert_eq!(later.notifications_sent, 1);
        assert_eq!(transport.sent_to(), vec!["U1", "U1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_failure_is_isolated_to_its_rule() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();

        overdue_rule(&db).await?;
        create_rule(
            &db,
            RuleInput::new("Quote Expired", EntityType::Quote, TriggerType::Expired, "Quote Expired", "Quote {title} expired"),
            &RuleScope::Global,
            "admin",
        )
        .await?;
        let mut unpaid = RuleInput::new(
            "Invoice Unpaid",
            EntityType::Invoice,
            TriggerType::Unpaid,
            "Invoice Unpaid",
            "Invoice {title} is {days} day(s) late",
        );
        unpaid.days_after = 7;
        create_rule(&db, unpaid, &RuleScope::Global, "admin").await?;

        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;
        create_test_quote(&db, "Q-1", Some(now - Duration::days(1)), "sent", Some("U3")).await?;
        create_test_invoice(&db, "INV-1", Some(now - Duration::days(10)), "sent", Some("U2"), None, 250.0).await?;

        let store = Arc::new(FailingEntityStore::wrapping(
            Arc::new(crate::core::store::SeaOrmStore::new(db.clone())),
            &[EntityType::Quote],
        ));
        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine_with_store(&db, Arc::clone(&transport), store);
        let (_tx, rx) = no_shutdown();

        let report = engine.run_tick(now, &rx).await;
        assert_eq!(report.rules_failed, 1);
        assert_eq!(report.rules_processed, 2);
        assert_eq!(report.notifications_sent, 2);

        let mut recipients = transport.sent_to();
        recipients.sort();
        assert_eq!(recipients, vec!["U1", "U2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_assignee_in_team_is_notified_once() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        add_team_member(&db, "team-a", "U1", true).await?;
        add_team_member(&db, "team-a", "U2", true).await?;
        create_rule(
            &db,
            overdue_task_input("Team Overdue"),
            &RuleScope::Team("team-a".to_string()),
            "lead",
        )
        .await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        let report = engine.run_tick(now, &rx).await;
        assert_eq!(report.notifications_sent, 2);

        let mut recipients = transport.sent_to();
        recipients.sort();
        assert_eq!(recipients, vec!["U1", "U2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_recipient_is_logged_and_retried() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let rule = overdue_rule(&db).await?;
        let task = create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::failing_for(&["U1"]));
        let engine = test_engine(&db, transport);
        let (_tx, rx) = no_shutdown();

        let first = engine.run_tick(now, &rx).await;
        assert_eq!(first.notifications_failed, 1);

        let key = DedupKey::new(rule.id, EntityType::Task, task.id, "U1");
        let rows = history(&db, &key).await?;
        assert_eq!(rows[0].status, LogStatus::Failed);
        assert!(rows[0].error_message.is_some());

        // Failures do not count towards the anti-spam window.
        let second = engine.run_tick(now + Duration::minutes(5), &rx).await;
        assert_eq!(second.notifications_failed, 1);
        assert_eq!(second.notifications_suppressed, 0);
        assert_eq!(history(&db, &key).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_up_task_spawned_once_per_window() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let mut input = overdue_task_input("Escalate");
        input.auto_create_task = true;
        input.task_title_template = Some("Follow up {title}".to_string());
        create_rule(&db, input, &RuleScope::Global, "admin").await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let engine = test_engine(&db, Arc::new(RecordingTransport::default()));
        let (_tx, rx) = no_shutdown();

        let first = engine.run_tick(now, &rx).await;
        let second = engine.run_tick(now + Duration::minutes(5), &rx).await;
        assert_eq!(first.tasks_spawned, 1);
        assert_eq!(second.tasks_spawned, 0);

        let tasks = Task::find().all(&db).await?;
        assert_eq!(tasks.len(), 2);
        let spawned = tasks.iter().find(|t| t.title == "Follow up Ship release").unwrap();
        assert_eq!(spawned.assignee_id.as_deref(), Some("U1"));
        assert_eq!(spawned.due_date, Some(now + Duration::days(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_recipients_means_no_send_and_no_spawn() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let mut input = overdue_task_input("Escalate");
        input.auto_create_task = true;
        input.task_title_template = Some("Follow up {title}".to_string());
        create_rule(&db, input, &RuleScope::Global, "admin").await?;
        create_test_task(&db, "Orphan", Some(now - Duration::days(2)), "todo", None).await?;

        let engine = test_engine(&db, Arc::new(RecordingTransport::default()));
        let (_tx, rx) = no_shutdown();

        let report = engine.run_tick(now, &rx).await;
        assert_eq!(report.candidates_scanned, 1);
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(report.tasks_spawned, 0);
        assert_eq!(Task::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_rules_are_skipped() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let mut input = overdue_task_input("Dormant");
        input.is_active = false;
        create_rule(&db, input, &RuleScope::Global, "admin").await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        let report = engine.run_tick(now, &rx).await;
        assert_eq!(report.rules_processed, 0);
        assert!(transport.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_cancels_between_rules() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        overdue_rule(&db).await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = watch::channel(true);

        let report = engine.run_tick(now, &rx).await;
        assert!(report.cancelled);
        assert_eq!(report.rules_processed, 0);
        assert!(transport.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_skipped_while_lease_held_elsewhere() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        overdue_rule(&db).await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;
        assert!(lock::try_acquire(&db, "reminder-engine", "other-instance", now, Duration::minutes(10)).await?);

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport)).with_holder_id("this-instance");
        let (_tx, rx) = no_shutdown();

        let blocked = engine.run_tick(now, &rx).await;
        assert!(blocked.skipped);
        assert!(transport.sent().is_empty());

        // Lease expired: this instance takes over.
        let resumed = engine.run_tick(now + Duration::minutes(11), &rx).await;
        assert!(!resumed.skipped);
        assert_eq!(resumed.notifications_sent, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_tick_in_process_is_skipped() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = test_engine(&db, Arc::new(RecordingTransport::default()));
        let (_tx, rx) = no_shutdown();

        let _running = engine.tick_guard.lock().await;
        let report = engine.run_tick(fixed_now(), &rx).await;
        assert!(report.skipped);
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_purges_expired_ledger_rows() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let key = DedupKey::new(99, EntityType::Task, 1, "U1");
        ledger::record(&db, &key, "test", LogStatus::Sent, None, now - Duration::days(91)).await?;

        let engine = test_engine(&db, Arc::new(RecordingTransport::default()));
        let (_tx, rx) = no_shutdown();

        let report = engine.run_tick(now, &rx).await;
        assert_eq!(report.logs_purged, 1);
        assert!(history(&db, &key).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_instance_cannot_resend_in_flight_notification() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        overdue_rule(&db).await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::with_delay(StdDuration::from_millis(300)));
        let first = test_engine(&db, Arc::clone(&transport)).with_holder_id("instance-a");
        let second = test_engine(&db, Arc::clone(&transport)).with_holder_id("instance-b");
        let (_tx, rx) = no_shutdown();

        // The second instance's clock is past the first one's lease.
        let (a, b) = tokio::join!(first.run_tick(now, &rx), async {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            second.run_tick(now + Duration::minutes(11), &rx).await
        });
        assert!(!b.skipped);
        assert_eq!(a.notifications_sent + b.notifications_sent, 1);
        assert_eq!(a.notifications_suppressed + b.notifications_suppressed, 1);
        assert_eq!(transport.sent_to(), vec!["U1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_tick_stops_when_lease_is_taken_over() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let mut urgent = overdue_task_input("Urgent Overdue");
        urgent.priority = Priority::Urgent;
        create_rule(&db, urgent, &RuleScope::Global, "admin").await?;
        overdue_rule(&db).await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let transport = Arc::new(RecordingTransport::with_delay(StdDuration::from_millis(300)));
        let engine = test_engine(&db, Arc::clone(&transport)).with_holder_id("instance-a");
        let (_tx, rx) = no_shutdown();

        let (report, taken) = tokio::join!(engine.run_tick(now, &rx), async {
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            lock::try_acquire(&db, "reminder-engine", "instance-b", now + Duration::minutes(11), Duration::minutes(10)).await
        });
        assert!(taken?);
        assert!(report.lease_lost);
        assert_eq!(report.rules_processed, 1);
        assert_eq!(transport.sent_to(), vec!["U1"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fired_rule_can_be_deleted_and_keeps_history() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        let rule = overdue_rule(&db).await?;
        let task = create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;

        let engine = test_engine(&db, Arc::new(RecordingTransport::default()));
        let (_tx, rx) = no_shutdown();
        assert_eq!(engine.run_tick(now, &rx).await.notifications_sent, 1);

        delete_rule(&db, rule.id, &RuleScope::Global).await?;
        let key = DedupKey::new(rule.id, EntityType::Task, task.id, "U1");
        assert_eq!(history(&db, &key).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_write_failure_keeps_other_outcomes() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        add_team_member(&db, "team-a", "U1", true).await?;
        add_team_member(&db, "team-a", "U2", true).await?;
        let mut input = overdue_task_input("Team Escalation");
        input.auto_create_task = true;
        input.task_title_template = Some("Follow up {title}".to_string());
        let rule = create_rule(&db, input, &RuleScope::Team("team-a".to_string()), "lead").await?;
        let task = create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;
        db.execute_unprepared(
            "CREATE TRIGGER reject_u1_log BEFORE INSERT ON notification_logs \
             WHEN NEW.recipient_id = 'U1' BEGIN SELECT RAISE(ABORT, 'ledger unavailable'); END",
        )
        .await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        let first = engine.run_tick(now, &rx).await;
        assert_eq!(first.notifications_sent, 2);
        assert_eq!(first.candidates_failed, 0);
        assert_eq!(first.tasks_spawned, 1);
        let u2 = DedupKey::new(rule.id, EntityType::Task, task.id, "U2");
        assert_eq!(history(&db, &u2).await?.len(), 1);

        // The dispatch claim still covers U1 although its log row is missing.
        let second = engine.run_tick(now + Duration::minutes(5), &rx).await;
        assert_eq!(second.notifications_sent, 0);
        assert_eq!(second.notifications_suppressed, 2);
        assert_eq!(transport.sent().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_failure_fails_candidate_and_gives_back_claims() -> Result<()> {
        let db = setup_test_db().await?;
        let now = fixed_now();
        add_team_member(&db, "team-a", "U1", true).await?;
        add_team_member(&db, "team-a", "U2", true).await?;
        create_rule(&db, overdue_task_input("Team Overdue"), &RuleScope::Team("team-a".to_string()), "lead").await?;
        create_test_task(&db, "Ship release", Some(now - Duration::days(2)), "todo", Some("U1")).await?;
        db.execute_unprepared(
            "CREATE TRIGGER reject_u2_claim BEFORE INSERT ON dispatch_claims \
             WHEN NEW.recipient_id = 'U2' BEGIN SELECT RAISE(ABORT, 'claims unavailable'); END",
        )
        .await?;

        let transport = Arc::new(RecordingTransport::default());
        let engine = test_engine(&db, Arc::clone(&transport));
        let (_tx, rx) = no_shutdown();

        let first = engine.run_tick(now, &rx).await;
        assert_eq!(first.rules_processed, 1);
        assert_eq!(first.candidates_failed, 1);
        assert!(transport.sent().is_empty());

        db.execute_unprepared("DROP TRIGGER reject_u2_claim").await?;
        let second = engine.run_tick(now + Duration::minutes(5), &rx).await;
        assert_eq!(second.notifications_sent, 2);
        Ok(())
    }

    #[test]
    fn test_report_accumulates() {
        let mut total = TickReport {
            notifications_sent: 1,
            ..TickReport::default()
        };
        total += TickReport {
            notifications_sent: 2,
            notifications_suppressed: 1,
            cancelled: true,
            lease_lost: true,
            ..TickReport::default()
        };
        assert_eq!(total.notifications_sent, 3);
        assert_eq!(total.notifications_suppressed, 1);
        assert!(total.cancelled);
        assert!(total.lease_lost);
    }
}
