//! Entity module - Contains all SeaORM entity definitions for the database.
//! The engine's own tables (rules, ledger, claims, locks) sit next to the entity store
//! tables the bundled collaborators read and write.

pub mod dispatch_claim;
pub mod engine_lock;
pub mod institution;
pub mod invoice;
pub mod notification_log;
pub mod quote;
pub mod reminder_rule;
pub mod task;
pub mod team_member;
pub mod user;

// Re-export specific types to avoid conflicts
pub use dispatch_claim::{Entity as DispatchClaim, Model as DispatchClaimModel};
pub use engine_lock::{Column as EngineLockColumn, Entity as EngineLock, Model as EngineLockModel};
pub use institution::{Entity as Institution, Model as InstitutionModel};
pub use invoice::{Column as InvoiceColumn, Entity as Invoice, Model as InvoiceModel};
pub use notification_log::{
    Column as NotificationLogColumn, Entity as NotificationLog, LogStatus,
    Model as NotificationLogModel,
};
pub use quote::{Column as QuoteColumn, Entity as Quote, Model as QuoteModel};
pub use reminder_rule::{
    Column as ReminderRuleColumn, Entity as ReminderRule, EntityType, Model as ReminderRuleModel,
    Priority, TriggerType,
};
pub use task::{Column as TaskColumn, Entity as Task, Model as TaskModel};
pub use team_member::{Entity as TeamMember, Model as TeamMemberModel};
pub use user::{Entity as User, Model as UserModel};
