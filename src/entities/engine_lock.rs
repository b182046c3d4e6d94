//! Engine lock entity - A leased key used to keep ticks from overlapping
//! across engine instances sharing one database.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Engine lock database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "engine_locks")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Lock name (e.g. `"reminder-engine"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Identifier of the instance holding the lease
    pub holder: String,
    /// When the lease was taken
    pub acquired_at: DateTimeUtc,
    /// When the lease lapses if not released
    pub expires_at: DateTimeUtc,
}

/// `EngineLock` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
