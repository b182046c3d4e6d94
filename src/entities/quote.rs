//! Quote entity - Offers sent to institutions, valid until a given date.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Quote database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotes")]
pub struct Model {
    /// Unique identifier for the quote
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Business number (e.g. "Q-2026-014")
    pub quote_number: String,
    /// Optional title
    pub title: Option<String>,
    /// `draft`, `sent`, `accepted`, `rejected`
    pub status: String,
    /// Last day the offer is valid
    pub valid_until: Option<DateTimeUtc>,
    /// Account manager responsible for the quote
    pub assignee_id: Option<String>,
    /// Institution the quote is addressed to
    pub institution_id: Option<i64>,
    /// Owning team
    pub team_id: Option<String>,
    /// Total amount
    pub amount: f64,
}

/// Each quote may belong to one institution
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Addressed institution
    #[sea_orm(
        belongs_to = "super::institution::Entity",
        from = "Column::InstitutionId",
        to = "super::institution::Column::Id"
    )]
    Institution,
}

impl Related<super::institution::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Institution.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
