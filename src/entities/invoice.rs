//! Invoice entity - Bills issued to institutions with a payment due date.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Invoice database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier for the invoice
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Business number (e.g. "INV-2026-102")
    pub invoice_number: String,
    /// Optional title
    pub title: Option<String>,
    /// `draft`, `sent`, `overdue`, `paid`, `cancelled`
    pub status: String,
    /// Payment due date
    pub due_date: Option<DateTimeUtc>,
    /// User responsible for collection
    pub assignee_id: Option<String>,
    /// Billed institution
    pub institution_id: Option<i64>,
    /// Owning team
    pub team_id: Option<String>,
    /// Total amount
    pub amount: f64,
}

/// Each invoice may belong to one institution
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Billed institution
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
