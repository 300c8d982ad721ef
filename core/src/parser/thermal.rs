//! Thermal payload parsing.

use crate::error::CollectorError;
use crate::event::{MessageKind, NormalizedEvent, PhysicalContext, SensorPayload};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Number;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawThermal {
    #[serde(default)]
    temperatures: Vec<RawTemperature>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTemperature {
    name: Option<String>,
    reading_celsius: Option<Number>,
}

/// Parse a Redfish `Thermal` document into one `temperature` event.
pub(super) fn parse(
    payload: &[u8],
    location: &str,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedEvent>, CollectorError> {
    let raw: RawThermal =
        serde_json::from_slice(payload).map_err(|e| CollectorError::Parse(e.to_string()))?;

    let mut event = NormalizedEvent::new(MessageKind::Temperature, now);
    for reading in &raw.temperatures {
        let Some(celsius) = &reading.reading_celsius else {
            continue;
        };
        let mut sensor = SensorPayload::new(
            now,
            location.to_string(),
            PhysicalContext::Baseboard,
            celsius.to_string(),
        );
        sensor.device_specific_context = reading.name.clone();
        event.sensors.push(sensor);
    }

    if event.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![event])
    }
}
