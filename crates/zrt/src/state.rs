//! Typed views of the per-platform state payloads.
//!
//! Every field is optional: the runtime is free to omit fields it has
//! no fresh value for, and a missing field means "leave the previous
//! value unchanged" on the consumer side. [`decode`] therefore never
//! fails; a payload that does not fit the expected shape decodes to the
//! all-`None` default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decode a platform state payload, falling back to the empty default.
#[must_use]
pub fn decode<T: DeserializeOwned + Default>(value: &Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

/// Switches, sirens and binary sensors: a single boolean.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OnOffState {
    #[serde(default)]
    pub state: Option<bool>,
}

/// Covers, in the runtime's orientation: 0 = fully open, 100 = fully
/// closed. The lift percentage is inverted at the adapter boundary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoverState {
    #[serde(default)]
    pub current_position: Option<u8>,
    #[serde(default)]
    pub is_closed: Option<bool>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LockState {
    #[serde(default)]
    pub is_locked: Option<bool>,
    /// Raw lock value: 0 = not fully locked, 1 = locked, 2 = unlocked.
    #[serde(default)]
    pub state: Option<u8>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LightState {
    #[serde(default)]
    pub on: Option<bool>,
    #[serde(default)]
    pub brightness: Option<u8>,
}

/// Numeric and text sensors carry their value untyped; units and
/// device class come from the descriptor, not the state payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SensorState {
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackerState {
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub battery_level: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SelectState {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlarmState {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateState {
    #[serde(default)]
    pub installed_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub in_progress: Option<bool>,
    #[serde(default)]
    pub progress: Option<u8>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CoverState, OnOffState, decode};

    #[test]
    fn decode_partial_payload() {
        let state: CoverState = decode(&json!({"current_position": 25}));
        assert_eq!(state.current_position, Some(25));
        assert_eq!(state.is_closed, None);
    }

    #[test]
    fn decode_malformed_payload_is_empty() {
        let state: OnOffState = decode(&json!({"state": "not-a-bool"}));
        assert_eq!(state.state, None);

        let state: OnOffState = decode(&json!(42));
        assert_eq!(state.state, None);
    }
}
