//! Position store.
//!
//! A single `positions` table of immutable snapshots in SQLite. Every
//! operation checks a connection out of the pool for its own duration;
//! writes go through a transaction so readers never observe a partial batch.

pub mod export;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{info, warn};

use crate::{
    errors::FlightLoggerError,
    models::{
        to_mb, FlightSummary, Icao, PositionSnapshot, RecentAircraft, StoreStats, TimeRange,
        TracePoint,
    },
};

/// Default number of flight groups returned
pub const DEFAULT_FLIGHT_LIMIT: u32 = 100;

/// Maximum number of aircraft returned by [`Database::recent`]
pub const RECENT_LIMIT: i64 = 50;

const SNAPSHOT_COLUMNS: &str = "timestamp, icao, callsign, lat, lon, altitude, speed, track, \
     vert_rate, squawk, category, aircraft_type, rssi";

/// Filters of [`Database::list_flights`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightFilter {
    /// Case-insensitive substring of the ICAO address
    pub icao: Option<String>,
    /// Case-insensitive substring of the callsign
    pub callsign: Option<String>,
    pub range: TimeRange,
    /// Maximum number of groups, `None` returns all of them
    pub limit: Option<u32>,
}

impl Default for FlightFilter {
    fn default() -> Self {
        Self {
            icao: None,
            callsign: None,
            range: TimeRange::default(),
            limit: Some(DEFAULT_FLIGHT_LIMIT),
        }
    }
}

/// SQLite backed position store
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open or create the database and bring the schema up to date
    pub async fn open(path: &Path) -> Result<Self, FlightLoggerError> {
        info!("Opening database at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database initialized");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a batch of snapshots in one transaction.
    ///
    /// Snapshots without both latitude and longitude are skipped. Returns the
    /// number of rows written.
    pub async fn record(&self, snapshots: &[PositionSnapshot]) -> Result<u64, FlightLoggerError> {
        let mut tx = self.pool.begin().await?;
        let mut count = 0;

        for snapshot in snapshots.iter().filter(|s| s.has_position()) {
            sqlx::query(
                "INSERT INTO positions (
                    timestamp, icao, callsign, lat, lon, altitude, speed, track,
                    vert_rate, squawk, category, aircraft_type, rssi
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(snapshot.timestamp)
            .bind(snapshot.icao.as_str())
            .bind(snapshot.callsign.as_deref())
            .bind(snapshot.lat)
            .bind(snapshot.lon)
            .bind(snapshot.altitude)
            .bind(snapshot.speed)
            .bind(snapshot.track)
            .bind(snapshot.vertical_rate)
            .bind(snapshot.squawk.as_deref())
            .bind(snapshot.category.as_deref())
            .bind(snapshot.aircraft_type.as_deref())
            .bind(snapshot.rssi)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        tx.commit().await?;
        Ok(count)
    }

    /// Row counts, time span and storage usage
    pub async fn stats(&self) -> Result<StoreStats, FlightLoggerError> {
        let (total_positions, unique_aircraft, unique_flights, oldest_record, newest_record): (
            i64,
            i64,
            i64,
            Option<NaiveDateTime>,
            Option<NaiveDateTime>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT icao), COUNT(DISTINCT callsign),
                    MIN(timestamp), MAX(timestamp)
             FROM positions",
        )
        .fetch_one(&self.pool)
        .await?;

        let storage_bytes = self.storage_bytes().await;
        let (disk_free_bytes, disk_total_bytes) = self.disk_space();

        Ok(StoreStats {
            total_positions,
            unique_aircraft,
            unique_flights,
            oldest_record,
            newest_record,
            storage_bytes,
            storage_mb: to_mb(storage_bytes),
            disk_free_bytes,
            disk_free_mb: to_mb(disk_free_bytes),
            disk_total_bytes,
            disk_total_mb: to_mb(disk_total_bytes),
        })
    }

    /// Size of the database file and its write-ahead log
    async fn storage_bytes(&self) -> u64 {
        let mut wal = self.path.as_os_str().to_owned();
        wal.push("-wal");

        let mut total = 0;
        for file in [self.path.clone(), PathBuf::from(wal)] {
            if let Ok(metadata) = tokio::fs::metadata(&file).await {
                total += metadata.len();
            }
        }
        total
    }

    /// Free and total bytes of the volume holding the database
    fn disk_space(&self) -> (u64, u64) {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        match (fs2::available_space(dir), fs2::total_space(dir)) {
            (Ok(free), Ok(total)) => (free, total),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not read disk space of {}: {}", dir.display(), e);
                (0, 0)
            }
        }
    }

    /// Snapshots grouped by aircraft and callsign, most recently seen first
    pub async fn list_flights(
        &self,
        filter: &FlightFilter,
    ) -> Result<Vec<FlightSummary>, FlightLoggerError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT icao, callsign, MIN(timestamp) AS first_seen, MAX(timestamp) AS last_seen,
                    COUNT(*) AS positions
             FROM positions WHERE 1 = 1",
        );

        if let Some(icao) = &filter.icao {
            query
                .push(" AND icao LIKE ")
                .push_bind(like_pattern(icao))
                .push(" ESCAPE '\\'");
        }
        if let Some(callsign) = &filter.callsign {
            query
                .push(" AND callsign LIKE ")
                .push_bind(like_pattern(callsign))
                .push(" ESCAPE '\\'");
        }
        push_time_range(&mut query, &filter.range);

        query.push(" GROUP BY icao, callsign ORDER BY last_seen DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        Ok(query
            .build_query_as::<FlightSummary>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Every position of one aircraft in chronological order
    pub async fn trace(
        &self,
        icao: &Icao,
        range: &TimeRange,
    ) -> Result<Vec<TracePoint>, FlightLoggerError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT timestamp, lat, lon, altitude, speed, track FROM positions WHERE icao = ",
        );
        query.push_bind(icao.as_str());
        push_time_range(&mut query, range);
        query.push(" ORDER BY timestamp, id");

        Ok(query
            .build_query_as::<TracePoint>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Latest known state of each aircraft seen at or after `since`
    pub async fn recent(
        &self,
        since: NaiveDateTime,
    ) -> Result<Vec<RecentAircraft>, FlightLoggerError> {
        Ok(sqlx::query_as::<_, RecentAircraft>(
            "SELECT p.icao, p.callsign, p.lat, p.lon, p.altitude,
                    p.timestamp AS last_seen, g.positions
             FROM positions p
             JOIN (
                 SELECT MAX(id) AS last_id, COUNT(*) AS positions
                 FROM positions
                 WHERE timestamp >= ?
                 GROUP BY icao
             ) g ON p.id = g.last_id
             ORDER BY last_seen DESC, p.id DESC
             LIMIT ?",
        )
        .bind(since)
        .bind(RECENT_LIMIT)
        .fetch_all(&self.pool)
        .await?)
    }

    /// All snapshots within `range` in chronological order
    pub async fn export(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<PositionSnapshot>, FlightLoggerError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM positions WHERE 1 = 1",
            SNAPSHOT_COLUMNS
        ));
        push_time_range(&mut query, range);
        query.push(" ORDER BY timestamp, id");

        Ok(query
            .build_query_as::<PositionSnapshot>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Delete snapshots strictly older than `cutoff`
    pub async fn delete_older_than(&self, cutoff: NaiveDateTime) -> Result<u64, FlightLoggerError> {
        let result = sqlx::query("DELETE FROM positions WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every snapshot and reclaim the space
    pub async fn clear(&self) -> Result<u64, FlightLoggerError> {
        let result = sqlx::query("DELETE FROM positions")
            .execute(&self.pool)
            .await?;
        self.vacuum().await?;
        Ok(result.rows_affected())
    }

    /// Rebuild the database file to return freed pages to the filesystem
    pub async fn vacuum(&self) -> Result<(), FlightLoggerError> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

fn push_time_range(query: &mut QueryBuilder<'_, Sqlite>, range: &TimeRange) {
    if let Some(start) = range.start {
        query.push(" AND timestamp >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        query.push(" AND timestamp <= ").push_bind(end);
    }
}

/// `%needle%`, uppercased, with LIKE wildcards in `needle` escaped
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.trim().to_uppercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
