//! Decoding of the bridge `/list` payload.
//!
//! The bridge answers with a JSON array, one object per paired device.
//! Decoding is all-or-nothing: a single malformed device fails the whole
//! payload, so a cycle never publishes a partial fleet.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors that can occur while decoding a bridge payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed bridge payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// One device as reported by the bridge, normalized for export.
///
/// Boolean battery flags are already coerced to `0`/`1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Bridge device type code.
    pub device_type: i64,
    /// Bridge-assigned device identifier.
    pub nuki_id: i64,
    /// User-assigned display name.
    pub name: String,
    /// Firmware version string.
    pub firmware_version: String,
    /// Operating mode code.
    pub mode: i64,
    /// Lock state code.
    pub state: i64,
    /// Door sensor state code.
    pub doorsensor_state: i64,
    /// Battery charge in percent.
    pub battery_charge_state: i64,
    /// 1 while the battery is charging.
    pub battery_charging: i64,
    /// 1 while the battery is critical, or when the bridge does not say.
    pub battery_critical: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeDevice {
    device_type: i64,
    nuki_id: i64,
    name: String,
    firmware_version: String,
    last_known_state: LastKnownState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastKnownState {
    mode: i64,
    state: i64,
    doorsensor_state: i64,
    battery_charge_state: i64,
    #[serde(default, deserialize_with = "lenient_bool")]
    battery_critical: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    battery_charging: Option<bool>,
}

/// Accepts any JSON value; only real booleans are kept.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()))
}

impl From<BridgeDevice> for DeviceRecord {
    fn from(device: BridgeDevice) -> Self {
        let state = device.last_known_state;
        Self {
            device_type: device.device_type,
            nuki_id: device.nuki_id,
            name: device.name,
            firmware_version: device.firmware_version,
            mode: state.mode,
            state: state.state,
            doorsensor_state: state.doorsensor_state,
            battery_charge_state: state.battery_charge_state,
            // Unknown charging reads as not charging.
            battery_charging: i64::from(state.battery_charging.unwrap_or(false)),
            // Unknown criticality reads as critical.
            battery_critical: i64::from(state.battery_critical.unwrap_or(true)),
        }
    }
}

/// Decodes a raw `/list` response body into device records.
pub fn decode(payload: &[u8]) -> Result<Vec<DeviceRecord>, DecodeError> {
    let devices: Vec<BridgeDevice> = serde_json::from_slice(payload)?;

    tracing::debug!(devices = devices.len(), "Decoded bridge payload");

    Ok(devices.into_iter().map(DeviceRecord::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONTDOOR: &str = r#"[{"deviceType":0,"nukiId":1,"name":"Frontdoor","firmwareVersion":"1.0","lastKnownState":{"mode":2,"state":3,"doorsensorState":1,"batteryChargeState":80,"batteryCritical":false,"batteryCharging":true}}]"#;

    fn with_state(state: &str) -> String {
        format!(
            r#"[{{"deviceType":4,"nukiId":42,"name":"Back","firmwareVersion":"3.2.1","lastKnownState":{}}}]"#,
            state
        )
    }

    #[test]
    fn test_decode_single_device() {
        let records = decode(FRONTDOOR.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![DeviceRecord {
                device_type: 0,
                nuki_id: 1,
                name: "Frontdoor".to_string(),
                firmware_version: "1.0".to_string(),
                mode: 2,
                state: 3,
                doorsensor_state: 1,
                battery_charge_state: 80,
                battery_charging: 1,
                battery_critical: 0,
            }]
        );
    }

    #[test]
    fn test_decode_empty_list() {
        assert!(decode(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_missing_last_known_state_is_malformed() {
        let payload = r#"[{"deviceType":0,"nukiId":1,"name":"Frontdoor","firmwareVersion":"1.0"}]"#;
        assert!(matches!(
            decode(payload.as_bytes()),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_one_bad_device_fails_whole_payload() {
        let good = &FRONTDOOR[1..FRONTDOOR.len() - 1];
        let payload = format!(r#"[{},{{"deviceType":"x","nukiId":2}}]"#, good);
        assert!(decode(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_non_array_is_malformed() {
        assert!(decode(br#"{"error":"unauthorized"}"#).is_err());
        assert!(decode(b"not json").is_err());
    }

    #[test]
    fn test_absent_booleans_use_fail_safe_defaults() {
        let payload =
            with_state(r#"{"mode":2,"state":1,"doorsensorState":2,"batteryChargeState":55}"#);
        let records = decode(payload.as_bytes()).unwrap();
        assert_eq!(records[0].battery_charging, 0);
        assert_eq!(records[0].battery_critical, 1);
    }

    #[test]
    fn test_unrecognized_booleans_use_fail_safe_defaults() {
        let payload = with_state(
            r#"{"mode":2,"state":1,"doorsensorState":2,"batteryChargeState":55,"batteryCritical":"no","batteryCharging":null}"#,
        );
        let records = decode(payload.as_bytes()).unwrap();
        assert_eq!(records[0].battery_charging, 0);
        assert_eq!(records[0].battery_critical, 1);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let payload = with_state(
            r#"{"mode":2,"state":1,"stateName":"locked","doorsensorState":2,"batteryChargeState":55,"batteryCritical":true,"batteryCharging":false,"timestamp":"2024-01-01T00:00:00+00:00"}"#,
        );
        let records = decode(payload.as_bytes()).unwrap();
        assert_eq!(records[0].state, 1);
        assert_eq!(records[0].battery_critical, 1);
        assert_eq!(records[0].battery_charging, 0);
    }
}
