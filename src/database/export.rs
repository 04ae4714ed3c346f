//! CSV and JSON rendering of exported snapshots

use csv::{QuoteStyle, WriterBuilder};

use crate::{errors::FlightLoggerError, models::PositionSnapshot};

pub const CSV_HEADER: [&str; 13] = [
    "timestamp",
    "icao",
    "callsign",
    "lat",
    "lon",
    "altitude",
    "speed",
    "track",
    "vert_rate",
    "squawk",
    "category",
    "aircraft_type",
    "rssi",
];

const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Fully quoted CSV with a header row; missing values are empty fields
pub fn to_csv(snapshots: &[PositionSnapshot]) -> Result<Vec<u8>, FlightLoggerError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for s in snapshots {
        writer.write_record([
            s.timestamp.format(CSV_TIMESTAMP_FORMAT).to_string(),
            s.icao.to_string(),
            field(&s.callsign),
            field(&s.lat),
            field(&s.lon),
            field(&s.altitude),
            field(&s.speed),
            field(&s.track),
            field(&s.vertical_rate),
            field(&s.squawk),
            field(&s.category),
            field(&s.aircraft_type),
            field(&s.rssi),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| FlightLoggerError::IoError(e.into_error()))
}

/// Pretty printed JSON array
pub fn to_json(snapshots: &[PositionSnapshot]) -> Result<Vec<u8>, FlightLoggerError> {
    Ok(serde_json::to_vec_pretty(snapshots)?)
}

fn field<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Icao;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn snapshot() -> PositionSnapshot {
        PositionSnapshot {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            icao: Icao::try_from("abc123").unwrap(),
            callsign: Some("UAL1".to_string()),
            lat: Some(40.5),
            lon: Some(-73.25),
            altitude: Some(3500),
            speed: Some(210),
            track: Some(45),
            vertical_rate: None,
            squawk: Some("1200".to_string()),
            category: None,
            aircraft_type: Some("B738".to_string()),
            rssi: Some(-12.5),
        }
    }

    #[test]
    fn test_csv_export() {
        let csv = String::from_utf8(to_csv(&[snapshot()]).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#""timestamp","icao","callsign","lat","lon","altitude","speed","track","vert_rate","squawk","category","aircraft_type","rssi""#
        );
        assert_eq!(
            lines[1],
            r#""2024-01-01T12:00:00","ABC123","UAL1","40.5","-73.25","3500","210","45","","1200","","B738","-12.5""#
        );
    }

    #[test]
    fn test_csv_export_empty() {
        let csv = String::from_utf8(to_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_json_export() {
        let exported: Value = serde_json::from_slice(&to_json(&[snapshot()]).unwrap()).unwrap();
        assert_eq!(
            exported,
            json!([{
                "timestamp": "2024-01-01T12:00:00",
                "icao": "ABC123",
                "callsign": "UAL1",
                "lat": 40.5,
                "lon": -73.25,
                "altitude": 3500,
                "speed": 210,
                "track": 45,
                "vert_rate": null,
                "squawk": "1200",
                "category": null,
                "aircraft_type": "B738",
                "rssi": -12.5
            }])
        );
    }
}
