//! Power payload parsing.
//!
//! One Redfish `Power` document yields up to two events: a `power` event from
//! the chassis power-control entries and a `voltage` event from the power
//! supplies and voltage rails.

use crate::error::CollectorError;
use crate::event::{MessageKind, NormalizedEvent, PhysicalContext, SensorPayload};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Number;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPower {
    #[serde(default)]
    power_control: Vec<RawPowerControl>,
    #[serde(default)]
    power_supplies: Vec<RawPowerSupply>,
    #[serde(default)]
    voltages: Vec<RawVoltage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPowerControl {
    name: Option<String>,
    member_id: Option<String>,
    power_consumed_watts: Option<Number>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPowerSupply {
    member_id: Option<String>,
    line_input_voltage: Option<Number>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVoltage {
    name: Option<String>,
    reading_volts: Option<Number>,
}

/// How a member identifier classified against the `u8` index range.
enum MemberIndex {
    Absent,
    Valid(u8),
    Invalid,
}

fn classify_member_id(member_id: Option<&str>, location: &str) -> MemberIndex {
    match member_id {
        None => MemberIndex::Absent,
        Some(raw) => match raw.parse::<u8>() {
            Ok(index) => MemberIndex::Valid(index),
            Err(_) => {
                tracing::warn!(
                    location,
                    member_id = raw,
                    "member identifier outside index range, skipping payload"
                );
                MemberIndex::Invalid
            }
        },
    }
}

/// Derive the device-specific context for a voltage rail reading.
///
/// Rail names fuse a designator prefix onto the rail label (`P12 VDD` carries
/// the label `2 VDD`); names shorter than four characters have no label and
/// yield no context.
fn rail_device_context(name: &str) -> Option<String> {
    if name.chars().count() < 4 {
        return None;
    }
    name.char_indices()
        .nth(2)
        .map(|(offset, _)| name[offset..].to_string())
}

/// Parse a Redfish `Power` document into `power` and `voltage` events.
pub(super) fn parse(
    payload: &[u8],
    location: &str,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedEvent>, CollectorError> {
    let raw: RawPower =
        serde_json::from_slice(payload).map_err(|e| CollectorError::Parse(e.to_string()))?;

    let mut events = Vec::with_capacity(2);

    let mut power = NormalizedEvent::new(MessageKind::Power, now);
    for control in &raw.power_control {
        if control.name.as_deref() != Some("Server Power Control") {
            continue;
        }
        let Some(watts) = &control.power_consumed_watts else {
            continue;
        };
        let mut sensor = SensorPayload::new(
            now,
            location.to_string(),
            PhysicalContext::Chassis,
            watts.to_string(),
        );
        match classify_member_id(control.member_id.as_deref(), location) {
            MemberIndex::Absent => {}
            MemberIndex::Valid(index) => sensor.index = Some(index),
            MemberIndex::Invalid => continue,
        }
        power.sensors.push(sensor);
    }
    if !power.is_empty() {
        events.push(power);
    }

    let mut voltage = NormalizedEvent::new(MessageKind::Voltage, now);
    for supply in &raw.power_supplies {
        let Some(volts) = &supply.line_input_voltage else {
            continue;
        };
        let mut sensor = SensorPayload::new(
            now,
            location.to_string(),
            PhysicalContext::PowerSupplyBay,
            volts.to_string(),
        );
        match classify_member_id(supply.member_id.as_deref(), location) {
            MemberIndex::Absent => {}
            MemberIndex::Valid(index) => sensor.index = Some(index),
            MemberIndex::Invalid => continue,
        }
        voltage.sensors.push(sensor);
    }
    for rail in &raw.voltages {
        let Some(volts) = &rail.reading_volts else {
            continue;
        };
        let mut sensor = SensorPayload::new(
            now,
            location.to_string(),
            PhysicalContext::SystemBoard,
            volts.to_string(),
        );
        sensor.device_specific_context = rail.name.as_deref().and_then(rail_device_context);
        voltage.sensors.push(sensor);
    }
    if !voltage.is_empty() {
        events.push(voltage);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .unwrap_or_default()
    }

    const LOCATION: &str = "x3000c0s1b0";

    #[test]
    fn full_power_document_yields_power_and_voltage_events() {
        let body = br#"{
            "PowerControl":[{"Name":"Server Power Control","MemberId":"0","PowerConsumedWatts":312.5}],
            "PowerSupplies":[{"MemberId":"1","LineInputVoltage":208}],
            "Voltages":[{"Name":"P12 VDD","ReadingVolts":12.01}]
        }"#;

        let events = parse(body, LOCATION, ts()).unwrap();
        assert_eq!(events.len(), 2);

        let power = &events[0];
        assert_eq!(power.message_kind, MessageKind::Power);
        assert_eq!(power.sensors.len(), 1);
        assert_eq!(power.sensors[0].physical_context, PhysicalContext::Chassis);
        assert_eq!(power.sensors[0].index, Some(0));
        assert_eq!(power.sensors[0].value, "312.5");
        assert_eq!(power.sensors[0].location, LOCATION);

        let voltage = &events[1];
        assert_eq!(voltage.message_kind, MessageKind::Voltage);
        assert_eq!(voltage.sensors.len(), 2);

        let supply = &voltage.sensors[0];
        assert_eq!(supply.physical_context, PhysicalContext::PowerSupplyBay);
        assert_eq!(supply.index, Some(1));
        assert_eq!(supply.value, "208");

        let rail = &voltage.sensors[1];
        assert_eq!(rail.physical_context, PhysicalContext::SystemBoard);
        assert_eq!(rail.device_specific_context.as_deref(), Some("2 VDD"));
        assert_eq!(rail.value, "12.01");
    }

    #[test]
    fn empty_document_yields_no_events() {
        let body = br#"{"PowerControl":[],"PowerSupplies":[],"Voltages":[]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn unnamed_power_control_entries_are_ignored() {
        let body = br#"{"PowerControl":[
            {"Name":"Other Control","MemberId":"0","PowerConsumedWatts":100},
            {"MemberId":"1","PowerConsumedWatts":200}
        ]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn out_of_range_member_id_skips_the_payload() {
        let body = br#"{"PowerControl":[
            {"Name":"Server Power Control","MemberId":"300","PowerConsumedWatts":100},
            {"Name":"Server Power Control","MemberId":"2","PowerConsumedWatts":250}
        ]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sensors.len(), 1);
        assert_eq!(events[0].sensors[0].index, Some(2));
    }

    #[test]
    fn missing_member_id_emits_payload_without_index() {
        let body =
            br#"{"PowerControl":[{"Name":"Server Power Control","PowerConsumedWatts":100}]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert_eq!(events[0].sensors[0].index, None);
    }

    #[test]
    fn short_rail_name_yields_empty_device_context() {
        let body = br#"{"Voltages":[{"Name":"P12","ReadingVolts":11.98}]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sensors.len(), 1);
        assert_eq!(events[0].sensors[0].device_specific_context, None);
        assert_eq!(events[0].sensors[0].value, "11.98");
    }

    #[test]
    fn missing_reading_skips_only_that_payload() {
        let body = br#"{
            "PowerSupplies":[{"MemberId":"0"},{"MemberId":"1","LineInputVoltage":207.5}]
        }"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        assert_eq!(events[0].sensors.len(), 1);
        assert_eq!(events[0].sensors[0].index, Some(1));
    }

    #[test]
    fn value_preserves_decimal_precision() {
        let body = br#"{"Voltages":[{"Name":"P0 VCORE","ReadingVolts":0.8250}]}"#;
        let events = parse(body, LOCATION, ts()).unwrap();
        let parsed: f64 = events[0].sensors[0].value.parse().unwrap();
        assert!((parsed - 0.825).abs() < f64::EPSILON);
    }

    proptest! {
        // Any finite reading must survive as a value string that parses back
        // to a finite number.
        #[test]
        fn values_always_parse_finite(watts in -1.0e12f64..1.0e12f64) {
            let body = format!(
                r#"{{"PowerControl":[{{"Name":"Server Power Control","MemberId":"0","PowerConsumedWatts":{watts}}}]}}"#
            );
            let events = parse(body.as_bytes(), LOCATION, ts()).unwrap();
            if let Some(event) = events.first() {
                let value: f64 = event.sensors[0].value.parse().unwrap();
                prop_assert!(value.is_finite());
            }
        }

        // Member ids inside the u8 range always surface as indexes; the
        // payload is never silently dropped.
        #[test]
        fn in_range_member_ids_become_indexes(id in 0u8..=255u8) {
            let body = format!(
                r#"{{"PowerControl":[{{"Name":"Server Power Control","MemberId":"{id}","PowerConsumedWatts":10}}]}}"#
            );
            let events = parse(body.as_bytes(), LOCATION, ts()).unwrap();
            prop_assert_eq!(events[0].sensors[0].index, Some(id));
        }
    }
}
