//! User entity - Directory of people who can receive reminders.
//! The id is the Discord user id notifications are delivered to.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Discord user id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Name used for `{assigneeName}`
    pub display_name: String,
    /// Inactive users receive no team fan-out
    pub is_active: bool,
}

/// `User` has no relationships the engine follows
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
