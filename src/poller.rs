//! Feed poller
//!
//! One background task that fetches the aircraft list every poll interval
//! and stores the positions. A failed fetch counts as a poll with no
//! aircraft; the next tick is the retry. The retention sweeper runs when the
//! task starts and then every [`SWEEP_EVERY_TICKS`] polls.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    database::Database, feed::FeedSource, models::now_utc, retention, state::RuntimeState,
};

/// Number of polls between retention sweeps
pub const SWEEP_EVERY_TICKS: u32 = 360;

pub struct Poller<F> {
    feed: F,
    database: Database,
    state: Arc<RuntimeState>,
    /// Polls since the last sweep; paused ticks are not counted
    ticks: u32,
}

impl<F> Poller<F>
where
    F: FeedSource + 'static,
{
    pub fn new(feed: F, database: Database, state: Arc<RuntimeState>) -> Self {
        Self {
            feed,
            database,
            state,
            ticks: 0,
        }
    }

    /// Run the poll loop on its own task until `shutdown` changes or its
    /// sender is dropped
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Logger started - polling every {} seconds",
            self.state.interval().as_secs()
        );

        // Startup sweep runs even when paused
        self.sweep_retention().await;

        loop {
            self.tick().await;

            // Interval is re-read each tick so settings changes apply to the next sleep
            tokio::select! {
                _ = tokio::time::sleep(self.state.interval()) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Logger stopped");
    }

    /// One iteration of the loop without the sleep: poll unless paused, and
    /// sweep on every [`SWEEP_EVERY_TICKS`]th poll
    pub async fn tick(&mut self) {
        if self.state.is_paused() {
            return;
        }

        self.poll_once().await;

        self.ticks += 1;
        if self.ticks >= SWEEP_EVERY_TICKS {
            self.ticks = 0;
            self.sweep_retention().await;
        }
    }

    async fn sweep_retention(&self) {
        let days = self.state.retention_days();
        if let Err(e) = retention::sweep(&self.database, days).await {
            error!("Retention sweep failed: {}", e);
        }
    }

    /// Fetch and store one batch, returning the number of stored positions
    pub async fn poll_once(&self) -> u64 {
        let aircraft = match self.feed.fetch_aircraft().await {
            Ok(aircraft) => aircraft,
            Err(e) => {
                warn!("Failed to poll feed: {}", e);
                Vec::new()
            }
        };

        let now = now_utc();
        let snapshots: Vec<_> = aircraft
            .into_iter()
            .filter_map(|record| match record.into_snapshot(now) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!("Skipping aircraft: {}", e);
                    None
                }
            })
            .collect();

        let count = match self.database.record(&snapshots).await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to store positions: {}", e);
                0
            }
        };

        self.state.record_poll(now, count);
        if count > 0 {
            debug!("Logged {} aircraft positions", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use chrono::TimeDelta;

    use crate::errors::FlightLoggerError;
    use crate::models::{AircraftRecord, Icao, PositionSnapshot};
    use crate::settings::RuntimeSettings;
    use tempfile::tempdir;

    struct StaticFeed(Vec<AircraftRecord>);

    impl FeedSource for StaticFeed {
        async fn fetch_aircraft(&self) -> Result<Vec<AircraftRecord>, FlightLoggerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFeed;

    impl FeedSource for FailingFeed {
        async fn fetch_aircraft(&self) -> Result<Vec<AircraftRecord>, FlightLoggerError> {
            Err(FlightLoggerError::ConfigurationError {
                message: "feed unreachable".to_string(),
            })
        }
    }

    fn aircraft(hex: &str, position: Option<(f64, f64)>) -> AircraftRecord {
        AircraftRecord {
            hex: Some(hex.to_string()),
            flight: Some("TEST1".to_string()),
            lat: position.map(|p| p.0),
            lon: position.map(|p| p.1),
            ..Default::default()
        }
    }

    fn state(paused: bool) -> Arc<RuntimeState> {
        Arc::new(RuntimeState::new(RuntimeSettings {
            interval: 5,
            retention_days: 14,
            paused,
        }))
    }

    /// Stored position observed `days` ago
    fn aged_snapshot(days: i64) -> PositionSnapshot {
        AircraftRecord {
            hex: Some("0ld000".to_string()),
            lat: Some(60.3),
            lon: Some(24.96),
            ..Default::default()
        }
        .into_snapshot(now_utc() - TimeDelta::days(days))
        .unwrap()
    }

    async fn total_positions(database: &Database) -> i64 {
        database.stats().await.unwrap().total_positions
    }

    #[tokio::test]
    async fn test_poll_once_stores_positions() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        let state = state(false);
        let feed = StaticFeed(vec![
            aircraft("abc123", Some((51.5, -0.12))),
            aircraft("def456", None),
            aircraft("", Some((48.8, 2.35))),
            aircraft("0a1b2c", Some((52.3, 4.76))),
        ]);

        let poller = Poller::new(feed, database.clone(), state.clone());
        assert_eq!(poller.poll_once().await, 2);
        assert_eq!(poller.poll_once().await, 2);

        assert_eq!(database.stats().await.unwrap().total_positions, 4);
        assert_eq!(state.last_count(), 2);
        assert_eq!(state.total_logged(), 4);
        assert!(state.last_poll().is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_counts_as_empty_poll() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        let state = state(false);

        let poller = Poller::new(FailingFeed, database, state.clone());
        assert_eq!(poller.poll_once().await, 0);
        assert_eq!(state.last_count(), 0);
        assert!(state.last_poll().is_some());
    }

    #[tokio::test]
    async fn test_spawned_poller_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        let state = state(false);
        let feed = StaticFeed(vec![aircraft("abc123", Some((51.5, -0.12)))]);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Poller::new(feed, database, state.clone()).spawn(shutdown_rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while state.last_poll().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("poller did not poll");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
        assert_eq!(state.total_logged(), 1);
    }

    #[tokio::test]
    async fn test_paused_poller_does_not_poll() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        let state = state(true);
        let feed = StaticFeed(vec![aircraft("abc123", Some((51.5, -0.12)))]);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Poller::new(feed, database.clone(), state.clone()).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(state.last_poll().is_none());
        assert_eq!(database.stats().await.unwrap().total_positions, 0);
    }

    #[tokio::test]
    async fn test_sweep_runs_every_360_polls() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        database.record(&[aged_snapshot(20)]).await.unwrap();
        let state = state(false);

        let mut poller = Poller::new(StaticFeed(Vec::new()), database.clone(), state.clone());
        for _ in 0..SWEEP_EVERY_TICKS - 1 {
            poller.tick().await;
        }
        assert_eq!(total_positions(&database).await, 1);

        poller.tick().await;
        assert_eq!(total_positions(&database).await, 0);

        // Counter starts over after a sweep
        database.record(&[aged_snapshot(20)]).await.unwrap();
        poller.tick().await;
        assert_eq!(total_positions(&database).await, 1);
    }

    #[tokio::test]
    async fn test_paused_ticks_do_not_count_towards_sweep() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        database.record(&[aged_snapshot(20)]).await.unwrap();
        let state = state(true);

        let mut poller = Poller::new(StaticFeed(Vec::new()), database.clone(), state.clone());
        for _ in 0..10 {
            poller.tick().await;
        }
        assert!(state.last_poll().is_none());

        state.set_paused(false);
        for _ in 0..SWEEP_EVERY_TICKS - 1 {
            poller.tick().await;
        }
        assert_eq!(total_positions(&database).await, 1);

        poller.tick().await;
        assert_eq!(total_positions(&database).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_on_start_while_paused() {
        let dir = tempdir().unwrap();
        let database = Database::open(&dir.path().join("flights.db")).await.unwrap();
        database
            .record(&[aged_snapshot(20), aged_snapshot(1)])
            .await
            .unwrap();
        let state = state(true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Poller::new(StaticFeed(Vec::new()), database.clone(), state.clone())
            .spawn(shutdown_rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while total_positions(&database).await != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("startup sweep did not run");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let remaining = database.export(&Default::default()).await.unwrap();
        assert_eq!(remaining[0].icao, Icao::try_from("0LD000").unwrap());
        assert!(state.last_poll().is_none());
    }
}
