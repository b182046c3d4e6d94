//! Team member entity - Membership rows used for team-scoped fan-out.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Team membership database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "team_members")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Team the user belongs to
    pub team_id: String,
    /// Member user id
    pub user_id: String,
    /// Inactive memberships are skipped
    pub is_active: bool,
}

/// `TeamMember` has no relationships the engine follows
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
