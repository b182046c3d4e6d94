/// Built-in rules seeded on first start
pub mod defaults;

/// Recipient resolution and notification fan-out
pub mod dispatch;

/// Notification log used for deduplication and auditing
pub mod ledger;

/// Cross-instance tick lease
pub mod lock;

/// The tick pipeline tying every component together
pub mod orchestrator;

/// Rule persistence, scoping and validation
pub mod rule;

/// Trigger windows and candidate scanning
pub mod scanner;

/// Follow-up work item creation
pub mod spawner;

/// Database-backed entity store, team directory and work-item store
pub mod store;

/// Placeholder substitution for notification templates
pub mod template;
