//! Data models.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FlightLoggerError;
use serde_helpers::*;

/// ICAO 24-bit aircraft address
///
/// Kept in its uppercased hexadecimal text form, e.g. `4CA7B1`. Non-ICAO
/// addresses reported by the feed (TIS-B, prefixed with `~`) are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Icao(String);

impl TryFrom<&str> for Icao {
    type Error = FlightLoggerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FlightLoggerError::InvalidIcao(value.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }
}

impl Icao {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Icao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current time in UTC, truncated to whole seconds
pub fn now_utc() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

/// Aircraft entry of the feed's `aircraft.json`
///
/// Field names follow the readsb/ultrafeeder JSON output. Only the fields
/// that end up in a [`PositionSnapshot`] are deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct AircraftRecord {
    /// 24-bit address, hex
    #[serde(default)]
    pub hex: Option<String>,
    /// Callsign, space padded
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub flight: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Barometric altitude in feet, `"ground"` when on the ground
    #[serde(default, deserialize_with = "deserialize_altitude")]
    pub alt_baro: Option<i32>,
    /// Geometric (GNSS) altitude in feet
    #[serde(default, deserialize_with = "deserialize_rounded")]
    pub alt_geom: Option<i32>,
    /// Ground speed in knots
    #[serde(default, deserialize_with = "deserialize_rounded")]
    pub gs: Option<i32>,
    /// True track over ground in degrees
    #[serde(default, deserialize_with = "deserialize_rounded")]
    pub track: Option<i32>,
    /// Rate of change of barometric altitude, feet/minute
    #[serde(default, deserialize_with = "deserialize_rounded")]
    pub baro_rate: Option<i32>,
    /// Rate of change of geometric altitude, feet/minute
    #[serde(default, deserialize_with = "deserialize_rounded")]
    pub geom_rate: Option<i32>,
    #[serde(default)]
    pub squawk: Option<String>,
    /// Emitter category, e.g. `A3`
    #[serde(default)]
    pub category: Option<String>,
    /// Aircraft type designator from the feed's database
    #[serde(default)]
    pub t: Option<String>,
    /// Recent average signal power in dBFS
    #[serde(default)]
    pub rssi: Option<f64>,
}

impl AircraftRecord {
    /// Map the feed record to a snapshot observed at `timestamp`.
    ///
    /// Barometric altitude and rate are preferred over the geometric ones.
    pub fn into_snapshot(
        self,
        timestamp: NaiveDateTime,
    ) -> Result<PositionSnapshot, FlightLoggerError> {
        let icao = Icao::try_from(self.hex.as_deref().unwrap_or_default())?;
        Ok(PositionSnapshot {
            timestamp,
            icao,
            callsign: self.flight,
            lat: self.lat,
            lon: self.lon,
            altitude: self.alt_baro.or(self.alt_geom),
            speed: self.gs,
            track: self.track,
            vertical_rate: self.baro_rate.or(self.geom_rate),
            squawk: self.squawk,
            category: self.category,
            aircraft_type: self.t,
            rssi: self.rssi,
        })
    }
}

/// One observed state of one aircraft at one instant
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PositionSnapshot {
    pub timestamp: NaiveDateTime,
    pub icao: Icao,
    pub callsign: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Feet
    pub altitude: Option<i32>,
    /// Knots
    pub speed: Option<i32>,
    /// Degrees
    pub track: Option<i32>,
    /// Feet per minute
    #[serde(rename = "vert_rate")]
    #[sqlx(rename = "vert_rate")]
    pub vertical_rate: Option<i32>,
    pub squawk: Option<String>,
    pub category: Option<String>,
    pub aircraft_type: Option<String>,
    pub rssi: Option<f64>,
}

impl PositionSnapshot {
    /// Only snapshots with a full position are stored
    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Inclusive timestamp bounds of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    /// Parse optional `start`/`end` query values
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, FlightLoggerError> {
        Ok(Self {
            start: start.map(parse_timestamp).transpose()?,
            end: end.map(parse_timestamp).transpose()?,
        })
    }
}

/// Parse a user supplied timestamp.
///
/// Accepts `T` or space separated date and time with optional seconds and
/// fraction, RFC 3339 with an offset (converted to UTC), or a bare date
/// meaning midnight.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, FlightLoggerError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    let value = value.trim();
    if let Some(parsed) = FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Ok(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .map_err(|_| FlightLoggerError::InvalidTimestamp(value.to_string()))
}

/// Positions grouped by aircraft and callsign
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FlightSummary {
    pub icao: Icao,
    pub callsign: Option<String>,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub positions: i64,
}

/// One point of an aircraft's track
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TracePoint {
    pub timestamp: NaiveDateTime,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<i32>,
    pub speed: Option<i32>,
    pub track: Option<i32>,
}

/// Latest state of an aircraft seen recently
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RecentAircraft {
    pub icao: Icao,
    pub callsign: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<i32>,
    pub last_seen: NaiveDateTime,
    pub positions: i64,
}

/// Aggregate statistics of the position store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_positions: i64,
    pub unique_aircraft: i64,
    pub unique_flights: i64,
    pub oldest_record: Option<NaiveDateTime>,
    pub newest_record: Option<NaiveDateTime>,
    pub storage_bytes: u64,
    pub storage_mb: f64,
    pub disk_free_bytes: u64,
    pub disk_free_mb: f64,
    pub disk_total_bytes: u64,
    pub disk_total_mb: f64,
}

/// Bytes to megabytes, rounded to two decimals
pub fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Altitude {
        Feet(f64),
        Label(String),
    }

    pub fn deserialize_altitude<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Altitude>::deserialize(deserializer)? {
            Some(Altitude::Feet(feet)) => Some(feet.round() as i32),
            Some(Altitude::Label(label)) if label.eq_ignore_ascii_case("ground") => Some(0),
            _ => None,
        })
    }

    pub fn deserialize_rounded<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.map(|v| v.round() as i32))
    }

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parse_aircraft() {
        let s = r#"{
            "hex": "4ca7b1",
            "type": "adsb_icao",
            "flight": "RYR4TX  ",
            "alt_baro": 36000,
            "alt_geom": 36725,
            "gs": 447.3,
            "track": 102.82,
            "baro_rate": -64,
            "geom_rate": 0,
            "squawk": "2311",
            "category": "A3",
            "t": "B38M",
            "lat": 53.403671,
            "lon": -6.243805,
            "rssi": -21.4
        }"#;
        let record: AircraftRecord = serde_json::from_str(s).unwrap();
        let expected = AircraftRecord {
            hex: Some("4ca7b1".to_string()),
            flight: Some("RYR4TX".to_string()),
            lat: Some(53.403671),
            lon: Some(-6.243805),
            alt_baro: Some(36000),
            alt_geom: Some(36725),
            gs: Some(447),
            track: Some(103),
            baro_rate: Some(-64),
            geom_rate: Some(0),
            squawk: Some("2311".to_string()),
            category: Some("A3".to_string()),
            t: Some("B38M".to_string()),
            rssi: Some(-21.4),
        };

        assert_eq!(record, expected);
    }

    #[test]
    fn parse_aircraft_sparse() {
        let s = r#"{"hex": "~2a0f1c", "alt_baro": "ground", "flight": "   ", "rssi": -30.1}"#;
        let record: AircraftRecord = serde_json::from_str(s).unwrap();

        assert_eq!(record.alt_baro, Some(0));
        assert_eq!(record.flight, None);
        assert_eq!(record.lat, None);
        assert_eq!(record.gs, None);
    }

    #[test]
    fn snapshot_prefers_barometric_values() {
        let record = AircraftRecord {
            hex: Some("abc123".to_string()),
            alt_baro: Some(12000),
            alt_geom: Some(12400),
            baro_rate: Some(-512),
            geom_rate: Some(-448),
            ..Default::default()
        };
        let snapshot = record.into_snapshot(at(12, 0, 0)).unwrap();

        assert_eq!(snapshot.icao.as_str(), "ABC123");
        assert_eq!(snapshot.altitude, Some(12000));
        assert_eq!(snapshot.vertical_rate, Some(-512));
    }

    #[test]
    fn snapshot_falls_back_to_geometric_values() {
        let record = AircraftRecord {
            hex: Some("abc123".to_string()),
            alt_geom: Some(12400),
            geom_rate: Some(-448),
            ..Default::default()
        };
        let snapshot = record.into_snapshot(at(12, 0, 0)).unwrap();

        assert_eq!(snapshot.altitude, Some(12400));
        assert_eq!(snapshot.vertical_rate, Some(-448));
    }

    #[test]
    fn snapshot_requires_hex() {
        let record = AircraftRecord {
            lat: Some(1.0),
            lon: Some(2.0),
            ..Default::default()
        };
        assert!(matches!(
            record.into_snapshot(at(12, 0, 0)),
            Err(FlightLoggerError::InvalidIcao(_))
        ));
    }

    #[test]
    fn icao_is_uppercased() {
        assert_eq!(Icao::try_from("a1b2c3").unwrap().as_str(), "A1B2C3");
        assert_eq!(Icao::try_from(" A1B2C3 ").unwrap().to_string(), "A1B2C3");
        assert!(Icao::try_from("").is_err());
    }

    #[test]
    fn parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-01T12:00:00").unwrap(), at(12, 0, 0));
        assert_eq!(parse_timestamp("2024-01-01 12:00:00").unwrap(), at(12, 0, 0));
        assert_eq!(parse_timestamp("2024-01-01T12:30").unwrap(), at(12, 30, 0));
        assert_eq!(
            parse_timestamp("2024-01-01T14:00:00+02:00").unwrap(),
            at(12, 0, 0)
        );
        assert_eq!(parse_timestamp("2024-01-01").unwrap(), at(0, 0, 0));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn time_range_parse() {
        let range = TimeRange::parse(Some("2024-01-01"), None).unwrap();
        assert_eq!(range.start, Some(at(0, 0, 0)));
        assert_eq!(range.end, None);
        assert!(TimeRange::parse(None, Some("soon")).is_err());
    }

    #[test]
    fn megabytes_are_rounded() {
        assert_eq!(to_mb(0), 0.0);
        assert_eq!(to_mb(1024 * 1024), 1.0);
        assert_eq!(to_mb(1_572_864), 1.5);
        assert_eq!(to_mb(1_000_000), 0.95);
    }
}
