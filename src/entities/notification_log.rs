//! Notification log entity - The durable record behind deduplication.
//!
//! One row per firing attempt, keyed by `(rule_id, entity_type, entity_id, recipient_id)`.
//! Rows are append-only; the retention sweep is the only thing that deletes them.

use super::reminder_rule::EntityType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of one delivery attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// Delivered; counts toward the anti-spam window
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Delivery failed; retried on the next tick
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Recorded before delivery completed
    #[sea_orm(string_value = "pending")]
    Pending,
}

/// Notification log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_logs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Rule that fired
    pub rule_id: i64,
    /// Entity family of the candidate
    pub entity_type: EntityType,
    /// Candidate id within its entity table
    pub entity_id: i64,
    /// Recipient user id
    pub recipient_id: String,
    /// Delivery channel used (e.g. `discord_dm`)
    pub notification_type: String,
    /// Delivery outcome
    pub status: LogStatus,
    /// Failure detail when `status` is `failed`
    pub error_message: Option<String>,
    /// When the attempt was recorded; the dedup clock
    pub sent_at: DateTimeUtc,
}

/// Log rows outlive the rules they reference, so `rule_id` carries no
/// foreign key
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
