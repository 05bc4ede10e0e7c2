use serde::{Deserialize, Serialize};

/// Host-side entity platform a runtime entity belongs to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    AlarmControlPanel,
    BinarySensor,
    Button,
    Cover,
    DeviceTracker,
    Light,
    Lock,
    Select,
    Sensor,
    Siren,
    Switch,
    Update,
    /// Platform tags this build does not know yet.
    #[serde(other)]
    Unknown,
}

impl Platform {
    pub const ALL: [Self; 12] = [
        Self::AlarmControlPanel,
        Self::BinarySensor,
        Self::Button,
        Self::Cover,
        Self::DeviceTracker,
        Self::Light,
        Self::Lock,
        Self::Select,
        Self::Sensor,
        Self::Siren,
        Self::Switch,
        Self::Update,
    ];
}
