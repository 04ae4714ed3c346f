//! Retention sweeper

use chrono::{NaiveDateTime, TimeDelta};
use tracing::info;

use crate::{database::Database, errors::FlightLoggerError, models::now_utc};

/// Delete snapshots older than `retention_days`; 0 keeps everything.
///
/// Returns the number of deleted rows. The database is vacuumed after a
/// non-empty deletion.
pub async fn sweep(database: &Database, retention_days: u32) -> Result<u64, FlightLoggerError> {
    sweep_at(database, retention_days, now_utc()).await
}

/// [`sweep`] relative to a given current time
pub async fn sweep_at(
    database: &Database,
    retention_days: u32,
    now: NaiveDateTime,
) -> Result<u64, FlightLoggerError> {
    if retention_days == 0 {
        return Ok(0);
    }

    let cutoff = now - TimeDelta::days(i64::from(retention_days));
    let deleted = database.delete_older_than(cutoff).await?;

    if deleted > 0 {
        info!(
            "Cleaned up {} old records (older than {} days)",
            deleted, retention_days
        );
        database.vacuum().await?;
    }

    Ok(deleted)
}
