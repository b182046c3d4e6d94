//! Database configuration module for the reminder engine.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust models.
//! The ledger additionally gets a composite index backing the dedup lookup,
//! and dispatch claims a unique index on the dedup key.

use crate::entities::{
    DispatchClaim, EngineLock, Institution, Invoice, NotificationLog, Quote, ReminderRule, Task,
    TeamMember, User, dispatch_claim, notification_log,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::path::Path;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/reminder_buddy.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let url = get_database_url();
    ensure_sqlite_parent_dir(&url)?;
    Database::connect(&url).await.map_err(Into::into)
}

/// Creates the directory holding a file-backed `SQLite` database.
///
/// `SQLite` creates the file itself (`mode=rwc`) but not missing directories.
fn ensure_sqlite_parent_dir(url: &str) -> Result<()> {
    let Some(path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

async fn create_table_for<E, C>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables and indexes if they do not exist yet.
///
/// Safe to call on every start-up.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table_for(db, &schema, ReminderRule).await?;
    create_table_for(db, &schema, NotificationLog).await?;
    create_table_for(db, &schema, DispatchClaim).await?;
    create_table_for(db, &schema, EngineLock).await?;
    create_table_for(db, &schema, Institution).await?;
    create_table_for(db, &schema, Task).await?;
    create_table_for(db, &schema, Quote).await?;
    create_table_for(db, &schema, Invoice).await?;
    create_table_for(db, &schema, User).await?;
    create_table_for(db, &schema, TeamMember).await?;

    let dedup_index = Index::create()
        .name("idx_notification_logs_dedup")
        .table(NotificationLog)
        .col(notification_log::Column::RuleId)
        .col(notification_log::Column::EntityType)
        .col(notification_log::Column::EntityId)
        .col(notification_log::Column::RecipientId)
        .col(notification_log::Column::SentAt)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&dedup_index)).await?;

    let claim_index = Index::create()
        .name("idx_dispatch_claims_key")
        .table(DispatchClaim)
        .col(dispatch_claim::Column::RuleId)
        .col(dispatch_claim::Column::EntityType)
        .col(dispatch_claim::Column::EntityId)
        .col(dispatch_claim::Column::RecipientId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&claim_index)).await?;

    Ok(())
}
