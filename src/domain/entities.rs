use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::connection::{
    BinaryKey, SensorKey, all_elektra, binary_value, is_active_status, sensor_value,
};

pub const DOMAIN: &str = "mijn_liander";
pub const COMPONENT_TITLE: &str = "Mijn Liander";
pub const MANUFACTURER: &str = "Liander";
pub const ATTRIBUTION: &str = "Data provided by Liander";
pub const CONFIG_URL: &str = "https://mijn-liander.web.liander.nl/";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SERVICE_ELEKTRA: &str = "Elektra";
pub const SERVICE_USER: &str = "Gebruiker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Monetary,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

#[derive(Debug, Clone, Copy)]
pub struct SensorDescription {
    pub key: SensorKey,
    pub name: &'static str,
    pub icon: &'static str,
    pub icon_inactive: Option<&'static str>,
    pub service_name: &'static str,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub unit_of_measurement: Option<&'static str>,
}

impl SensorDescription {
    const fn elektra(key: SensorKey, name: &'static str, icon: &'static str) -> Self {
        Self {
            key,
            name,
            icon,
            icon_inactive: None,
            service_name: SERVICE_ELEKTRA,
            device_class: None,
            state_class: None,
            unit_of_measurement: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BinarySensorDescription {
    pub key: BinaryKey,
    pub name: &'static str,
    pub icon: &'static str,
    pub service_name: &'static str,
}

pub const SENSOR_DESCRIPTIONS: &[SensorDescription] = &[
    SensorDescription {
        service_name: SERVICE_USER,
        ..SensorDescription::elektra(SensorKey::Address, "Address", "mdi:home")
    },
    SensorDescription::elektra(
        SensorKey::ElectricityEan,
        "Electricity EAN",
        "mdi:flash-outline",
    ),
    SensorDescription::elektra(
        SensorKey::ConnectionCapacity,
        "Connection Capacity",
        "mdi:power-socket",
    ),
    SensorDescription {
        icon_inactive: Some("mdi:cancel"),
        ..SensorDescription::elektra(SensorKey::Status, "Status", "mdi:check-circle")
    },
    SensorDescription {
        device_class: Some(DeviceClass::Monetary),
        unit_of_measurement: Some("EUR"),
        ..SensorDescription::elektra(
            SensorKey::NetworkCosts,
            "Network Costs",
            "mdi:currency-eur",
        )
    },
    SensorDescription {
        device_class: Some(DeviceClass::Power),
        state_class: Some(StateClass::Measurement),
        unit_of_measurement: Some("kW"),
        ..SensorDescription::elektra(
            SensorKey::MaximumPower,
            "Maximum Power",
            "mdi:flash-triangle-outline",
        )
    },
    SensorDescription::elektra(SensorKey::NumberOfMeters, "Number of Meters", "mdi:counter"),
    SensorDescription::elektra(SensorKey::MeterNumber, "Meter Number", "mdi:numeric"),
    SensorDescription::elektra(
        SensorKey::NumberOfRegisters,
        "Number of Registers",
        "mdi:counter",
    ),
    SensorDescription::elektra(
        SensorKey::NumberOfPhases,
        "Number of Phases",
        "mdi:trending-up",
    ),
];

pub const BINARY_SENSOR_DESCRIPTIONS: &[BinarySensorDescription] = &[
    BinarySensorDescription {
        key: BinaryKey::Contract,
        name: "Contract Active",
        icon: "mdi:check",
        service_name: SERVICE_ELEKTRA,
    },
    BinarySensorDescription {
        key: BinaryKey::ReadPermission,
        name: "Permission to Read Data",
        icon: "mdi:eye-check-outline",
        service_name: SERVICE_ELEKTRA,
    },
    BinarySensorDescription {
        key: BinaryKey::SmartMeter,
        name: "Smart Meter",
        icon: "mdi:meter-electric",
        service_name: SERVICE_ELEKTRA,
    },
    BinarySensorDescription {
        key: BinaryKey::FeedInCapable,
        name: "Suitable for Backfeed",
        icon: "mdi:transmission-tower",
        service_name: SERVICE_ELEKTRA,
    },
    BinarySensorDescription {
        key: BinaryKey::DualTariffCapable,
        name: "Suitable for Dual Tariff",
        icon: "mdi:cash-multiple",
        service_name: SERVICE_ELEKTRA,
    },
    BinarySensorDescription {
        key: BinaryKey::FeedingIn,
        name: "Backfeeding Energy",
        icon: "mdi:transmission-tower-import",
        service_name: SERVICE_ELEKTRA,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub entry_type: &'static str,
    pub configuration_url: &'static str,
    pub sw_version: &'static str,
}

impl DeviceInfo {
    pub fn for_service(entry_id: &str, service_name: &'static str) -> Self {
        let mut identifiers = vec![DOMAIN.to_string(), entry_id.to_string()];
        if service_name != SERVICE_ELEKTRA {
            identifiers.push(service_name.to_string());
        }

        Self {
            identifiers,
            name: format!("{COMPONENT_TITLE} - {service_name}"),
            manufacturer: MANUFACTURER,
            model: service_name,
            entry_type: "service",
            configuration_url: CONFIG_URL,
            sw_version: VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub unique_id: String,
    pub key: &'static str,
    pub name: &'static str,
    pub translation_key: &'static str,
    pub state: Option<Value>,
    pub available: bool,
    pub icon: &'static str,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub unit_of_measurement: Option<&'static str>,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinarySensorState {
    pub unique_id: String,
    pub key: &'static str,
    pub name: &'static str,
    pub translation_key: &'static str,
    pub is_on: bool,
    pub available: bool,
    pub icon: &'static str,
    pub attributes: Map<String, Value>,
    pub device: DeviceInfo,
}

/// Identity of the config entry that owns the entities.
#[derive(Debug, Clone, Copy)]
pub struct EntityOwner<'a> {
    pub entry_id: &'a str,
    pub unique_id: &'a str,
}

pub fn sensor_state(
    owner: EntityOwner<'_>,
    description: &SensorDescription,
    data: Option<&Value>,
    available: bool,
) -> SensorState {
    let key = description.key.as_str();
    let state = data.and_then(|data| sensor_value(data, description.key));

    let icon = match description.icon_inactive {
        Some(inactive) if !is_active_status(state.as_ref()) => inactive,
        _ => description.icon,
    };

    SensorState {
        unique_id: format!("{}.{key}", owner.unique_id),
        key,
        name: description.name,
        translation_key: key,
        state,
        available,
        icon,
        device_class: description.device_class,
        state_class: description.state_class,
        unit_of_measurement: description.unit_of_measurement,
        device: DeviceInfo::for_service(owner.entry_id, description.service_name),
    }
}

pub fn binary_sensor_state(
    owner: EntityOwner<'_>,
    description: &BinarySensorDescription,
    data: Option<&Value>,
    available: bool,
) -> BinarySensorState {
    let key = description.key.as_str();
    let is_on = data.is_some_and(|data| binary_value(data, description.key));

    let mut attributes = Map::new();
    attributes.insert("attribution".to_string(), Value::from(ATTRIBUTION));
    attributes.insert(
        SERVICE_ELEKTRA.to_string(),
        Value::Array(data.map(all_elektra).unwrap_or_default()),
    );

    BinarySensorState {
        unique_id: format!("{}_{key}", owner.unique_id),
        key,
        name: description.name,
        translation_key: key,
        is_on,
        available,
        icon: description.icon,
        attributes,
        device: DeviceInfo::for_service(owner.entry_id, description.service_name),
    }
}

pub fn sensor_states(
    owner: EntityOwner<'_>,
    data: Option<&Value>,
    available: bool,
) -> Vec<SensorState> {
    SENSOR_DESCRIPTIONS
        .iter()
        .map(|description| sensor_state(owner, description, data, available))
        .collect()
}

pub fn binary_sensor_states(
    owner: EntityOwner<'_>,
    data: Option<&Value>,
    available: bool,
) -> Vec<BinarySensorState> {
    BINARY_SENSOR_DESCRIPTIONS
        .iter()
        .map(|description| binary_sensor_state(owner, description, data, available))
        .collect()
}
