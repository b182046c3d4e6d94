//! Engine lease - Cross-instance mutual exclusion for reminder ticks.
//!
//! A lease is a row in `engine_locks` keyed by name. It can be taken when no
//! row exists, when the current lease has expired, or when the caller already
//! holds it. A crashed holder blocks others only until its lease runs out.

use crate::entities::{EngineLock, engine_lock};
use crate::errors::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Condition, Set, SqlErr, prelude::*, sea_query::Expr};

/// Attempts to take or renew the lease `key` for `holder`.
///
/// Returns `false` when another holder owns an unexpired lease.
pub async fn try_acquire(
    db: &DatabaseConnection,
    key: &str,
    holder: &str,
    now: DateTime<Utc>,
    lease: Duration,
) -> Result<bool> {
    let expires_at = now + lease;

    let renewed = EngineLock::update_many()
        .col_expr(engine_lock::Column::Holder, Expr::value(holder))
        .col_expr(engine_lock::Column::AcquiredAt, Expr::value(now))
        .col_expr(engine_lock::Column::ExpiresAt, Expr::value(expires_at))
        .filter(engine_lock::Column::Key.eq(key))
        .filter(
            Condition::any()
                .add(engine_lock::Column::ExpiresAt.lte(now))
                .add(engine_lock::Column::Holder.eq(holder)),
        )
        .exec(db)
        .await?;
    if renewed.rows_affected > 0 {
        return Ok(true);
    }

    let lease_row = engine_lock::ActiveModel {
        key: Set(key.to_string()),
        holder: Set(holder.to_string()),
        acquired_at: Set(now),
        expires_at: Set(expires_at),
        ..Default::default()
    };
    match lease_row.insert(db).await {
        Ok(_) => Ok(true),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            tracing::debug!(key, holder, "Engine lease held by another instance");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Releases the lease if `holder` still owns it.
pub async fn release(db: &DatabaseConnection, key: &str, holder: &str) -> Result<()> {
    EngineLock::delete_many()
        .filter(engine_lock::Column::Key.eq(key))
        .filter(engine_lock::Column::Holder.eq(holder))
        .exec(db)
        .await?;
    Ok(())
}
