//! Class-name resolution for platform entities.
//!
//! The runtime names each entity with a platform and a class name
//! string. This module maps that pair onto the closed set of adapter
//! kinds this bridge implements. Resolution is total: a pair nobody
//! registered resolves to [`EntityKind::Unknown`], and the caller
//! decides whether to skip or log.

use std::collections::HashMap;
use std::sync::LazyLock;

use zrt::platform::Platform;

/// Adapter kinds this bridge knows how to build.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntityKind {
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
    /// Class names no adapter is registered for.
    Unknown,
}

struct Registration {
    platform: Platform,
    kind: EntityKind,
    /// Canonical name first, alternates after.
    class_names: &'static [&'static str],
}

/// The full registration table. Alternate names cover runtime builds
/// that specialize a class without changing its wire behavior.
const REGISTRATIONS: &[Registration] = &[
    Registration {
        platform: Platform::AlarmControlPanel,
        kind: EntityKind::AlarmControlPanel,
        class_names: &["AlarmControlPanel", "ZHAAlarmControlPanel"],
    },
    Registration {
        platform: Platform::BinarySensor,
        kind: EntityKind::BinarySensor,
        class_names: &[
            "BinarySensor",
            "Accelerometer",
            "BinaryInput",
            "IASZone",
            "Motion",
            "Occupancy",
            "Opening",
        ],
    },
    Registration {
        platform: Platform::Button,
        kind: EntityKind::Button,
        class_names: &["Button", "IdentifyButton"],
    },
    Registration {
        platform: Platform::Cover,
        kind: EntityKind::Cover,
        class_names: &["Cover", "ZhaCover", "Shade", "KeenVent"],
    },
    Registration {
        platform: Platform::DeviceTracker,
        kind: EntityKind::DeviceTracker,
        class_names: &["DeviceTracker"],
    },
    Registration {
        platform: Platform::Light,
        kind: EntityKind::Light,
        class_names: &["Light", "HueLight", "ForceOnLight", "LightGroup"],
    },
    Registration {
        platform: Platform::Lock,
        kind: EntityKind::Lock,
        class_names: &["Lock", "DoorLock"],
    },
    Registration {
        platform: Platform::Select,
        kind: EntityKind::Select,
        class_names: &[
            "EnumSelectEntity",
            "DefaultToneSelectEntity",
            "DefaultSirenLevelSelectEntity",
            "DefaultStrobeLevelSelectEntity",
            "DefaultStrobeSelectEntity",
        ],
    },
    Registration {
        platform: Platform::Sensor,
        kind: EntityKind::Sensor,
        class_names: &[
            "Sensor",
            "AnalogInput",
            "Battery",
            "CarbonDioxideConcentration",
            "CarbonMonoxideConcentration",
            "ElectricalMeasurement",
            "ElectricalMeasurementApparentPower",
            "ElectricalMeasurementRMSCurrent",
            "ElectricalMeasurementRMSVoltage",
            "FormaldehydeConcentration",
            "Humidity",
            "Illuminance",
            "LQISensor",
            "LastSeenSensor",
            "LeafWetness",
            "PPBVOCLevel",
            "Pressure",
            "RSSISensor",
            "SinopeHVACAction",
            "SmartEnergyMetering",
            "SmartEnergySummation",
            "SoilMoisture",
            "Temperature",
            "ThermostatHVACAction",
            "VOCLevel",
        ],
    },
    Registration {
        platform: Platform::Siren,
        kind: EntityKind::Siren,
        class_names: &["Siren"],
    },
    Registration {
        platform: Platform::Switch,
        kind: EntityKind::Switch,
        class_names: &["Switch"],
    },
    Registration {
        platform: Platform::Update,
        kind: EntityKind::Update,
        class_names: &["Update", "FirmwareUpdateEntity"],
    },
];

/// Lookup table built once from [`REGISTRATIONS`].
pub struct EntityClassRegistry {
    table: HashMap<Platform, HashMap<&'static str, EntityKind>>,
}

impl EntityClassRegistry {
    fn build() -> Self {
        let mut table: HashMap<Platform, HashMap<&'static str, EntityKind>> = HashMap::new();
        for reg in REGISTRATIONS {
            let classes = table.entry(reg.platform).or_default();
            for name in reg.class_names {
                let previous = classes.insert(name, reg.kind);
                debug_assert!(
                    previous.is_none(),
                    "duplicate registration for {:?}/{name}",
                    reg.platform
                );
            }
        }
        Self { table }
    }

    /// Resolve a platform/class-name pair. Never fails.
    #[must_use]
    pub fn lookup(&self, platform: Platform, class_name: &str) -> EntityKind {
        self.table
            .get(&platform)
            .and_then(|classes| classes.get(class_name))
            .copied()
            .unwrap_or(EntityKind::Unknown)
    }
}

/// The process-wide registry.
#[must_use]
pub fn registry() -> &'static EntityClassRegistry {
    static REGISTRY: LazyLock<EntityClassRegistry> = LazyLock::new(EntityClassRegistry::build);
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use zrt::platform::Platform;

    use super::{EntityKind, registry};

    #[test]
    fn canonical_names_resolve() {
        assert_eq!(
            registry().lookup(Platform::Switch, "Switch"),
            EntityKind::Switch
        );
        assert_eq!(
            registry().lookup(Platform::Select, "EnumSelectEntity"),
            EntityKind::Select
        );
    }

    #[test]
    fn alternate_names_resolve_to_the_same_kind() {
        for name in ["Light", "HueLight", "ForceOnLight", "LightGroup"] {
            assert_eq!(
                registry().lookup(Platform::Light, name),
                EntityKind::Light,
                "{name}"
            );
        }
        for name in ["Sensor", "Battery", "Temperature", "SmartEnergyMetering"] {
            assert_eq!(
                registry().lookup(Platform::Sensor, name),
                EntityKind::Sensor,
                "{name}"
            );
        }
    }

    #[test]
    fn unknown_class_falls_back() {
        assert_eq!(
            registry().lookup(Platform::Switch, "QuantumToggle"),
            EntityKind::Unknown
        );
    }

    #[test]
    fn class_names_do_not_leak_across_platforms() {
        assert_eq!(
            registry().lookup(Platform::Sensor, "Switch"),
            EntityKind::Unknown
        );
    }
}
