//! Aircraft feed client
//!
//! The [`FeedSource`] trait abstracts over where the current aircraft list
//! comes from. [`HttpFeed`] fetches the `aircraft.json` document served by
//! readsb/ultrafeeder.

use std::future::Future;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{config::FeedConfig, errors::FlightLoggerError, models::AircraftRecord};

/// Source of the currently observed aircraft
pub trait FeedSource: Send + Sync {
    fn fetch_aircraft(
        &self,
    ) -> impl Future<Output = Result<Vec<AircraftRecord>, FlightLoggerError>> + Send;
}

/// Top-level `aircraft.json` document. Entries are decoded one by one so a
/// single odd entry does not discard the whole list.
#[derive(Deserialize)]
struct AircraftList {
    #[serde(default)]
    aircraft: Vec<Value>,
}

/// Decode an `aircraft.json` document
pub fn parse_aircraft_list(bytes: &[u8]) -> Result<Vec<AircraftRecord>, FlightLoggerError> {
    let list: AircraftList = serde_json::from_slice(bytes)?;

    Ok(list
        .aircraft
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping malformed aircraft entry: {}", e);
                None
            }
        })
        .collect())
}

/// HTTP client for the feed's aircraft list
pub struct HttpFeed {
    http: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(config: &FeedConfig) -> Result<Self, FlightLoggerError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedSource for HttpFeed {
    async fn fetch_aircraft(&self) -> Result<Vec<AircraftRecord>, FlightLoggerError> {
        let bytes = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        parse_aircraft_list(&bytes)
    }
}
