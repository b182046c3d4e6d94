//! Dispatch claim entity - The latest delivery claim for each dedup key.
//!
//! `(rule_id, entity_type, entity_id, recipient_id)` is unique across the
//! table, so two engines racing for the same key cannot both insert a claim.

use super::reminder_rule::EntityType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Dispatch claim database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispatch_claims")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Rule being fired
    pub rule_id: i64,
    /// Entity family of the candidate
    pub entity_type: EntityType,
    /// Candidate id within its entity table
    pub entity_id: i64,
    /// Recipient user id
    pub recipient_id: String,
    /// Engine instance that made the claim
    pub holder: String,
    /// Tick time of the claim; a claim older than the anti-spam window is free
    pub claimed_at: DateTimeUtc,
}

/// `DispatchClaim` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
