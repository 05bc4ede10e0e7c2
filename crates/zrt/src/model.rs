use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::platform::Platform;

#[derive(Error, Debug)]
pub enum ParseEuiError {
    #[error("Expected 8 colon-separated octets, got {0}")]
    Length(usize),
    #[error("Invalid octet {0:?}")]
    Octet(String),
}

/// IEEE address of a Zigbee node (EUI-64), e.g. `00:0d:6f:00:0a:bc:de:f0`.
///
/// This is the stable identity of a device across joins and rejoins.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Eui64(pub [u8; 8]);

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self([a, b, c, d, e, g, h, i]) = self;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}:{h:02x}:{i:02x}")
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({self})")
    }
}

impl FromStr for Eui64 {
    type Err = ParseEuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0; 8];
        let mut count = 0;
        for part in s.split(':') {
            if count == 8 {
                return Err(ParseEuiError::Length(count + 1));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseEuiError::Octet(part.to_string()))?;
            count += 1;
        }
        if count != 8 {
            return Err(ParseEuiError::Length(count));
        }
        Ok(Self(octets))
    }
}

impl Serialize for Eui64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Eui64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Snapshot of one platform entity as declared by the runtime.
///
/// The `state` payload is platform-specific and may be absent when the
/// runtime has not yet read the device; consumers must treat a missing
/// snapshot as "unknown", never as a default value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub platform: Platform,
    pub class_name: String,
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub device_class: Option<String>,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
    #[serde(default)]
    pub translation_key: Option<String>,
    #[serde(default)]
    pub supported_features: Option<u32>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// One physical Zigbee node as reported by the runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceModel {
    pub ieee: Eui64,
    /// Short network address. The coordinator always holds `0x0000`.
    pub nwk: u16,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDescriptor>,
}

const fn default_available() -> bool {
    true
}

impl DeviceModel {
    #[must_use]
    pub const fn is_coordinator(&self) -> bool {
        self.nwk == 0x0000
    }
}

/// A Zigbee group (a set of devices addressed collectively).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupModel {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDescriptor>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DeviceModel, Eui64};

    #[test]
    fn eui64_roundtrip() {
        let text = "00:0d:6f:00:0a:bc:de:f0";
        let eui: Eui64 = text.parse().unwrap();
        assert_eq!(eui.to_string(), text);
    }

    #[test]
    fn eui64_rejects_short_input() {
        assert!("00:0d:6f".parse::<Eui64>().is_err());
        assert!("00:0d:6f:00:0a:bc:de:zz".parse::<Eui64>().is_err());
    }

    #[test]
    fn device_model_defaults() {
        let device: DeviceModel = serde_json::from_value(json!({
            "ieee": "00:0d:6f:00:0a:bc:de:f0",
            "nwk": 0,
        }))
        .unwrap();

        assert!(device.is_coordinator());
        assert!(device.available);
        assert!(device.entities.is_empty());
    }
}
