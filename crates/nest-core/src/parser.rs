// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of nest-exporter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Trait parser: raw SDM device resources into [`DeviceSnapshot`]s
//!
//! Every trait lookup happens here, once per fetch. Required traits are
//! `Connectivity`, `Temperature`, `ThermostatMode`, `ThermostatEco` and
//! `ThermostatHvac`; everything else is optional and simply leaves fields empty.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::{NestError, NestResult};
use crate::thermostat::{
    ConnectivityStatus, DeviceSnapshot, EcoMode, FanTimerMode, HvacMode, TemperatureScale,
};

pub const DEVICE_TRAITS_PREFIX: &str = "sdm.devices.traits";
pub const STRUCTURE_INFO_TRAIT: &str = "sdm.structures.traits.Info";
pub const THERMOSTAT_TYPE: &str = "sdm.devices.types.THERMOSTAT";

/// Device resource as returned by the SDM API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub traits: Map<String, Value>,
    #[serde(default)]
    pub parent_relations: Vec<ParentRelation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRelation {
    pub parent: String,
    #[serde(default)]
    pub display_name: String,
}

/// Structure resource as returned by the SDM API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStructure {
    pub name: String,
    #[serde(default)]
    pub traits: Map<String, Value>,
}

impl RawStructure {
    pub fn custom_name(&self) -> Option<&str> {
        self.traits
            .get(STRUCTURE_INFO_TRAIT)?
            .get("customName")?
            .as_str()
    }
}

/// Structure resource name to human name, resolved once at startup
#[derive(Debug, Clone, Default)]
pub struct StructureDirectory {
    names: HashMap<String, String>,
}

impl StructureDirectory {
    pub fn from_structures(structures: &[RawStructure]) -> Self {
        let names = structures
            .iter()
            .filter_map(|s| {
                s.custom_name()
                    .map(|custom| (s.name.clone(), custom.to_owned()))
            })
            .collect();
        Self { names }
    }

    pub fn insert(&mut self, structure: impl Into<String>, display_name: impl Into<String>) {
        self.names.insert(structure.into(), display_name.into());
    }

    pub fn display_name(&self, structure: &str) -> Option<&str> {
        self.names.get(structure).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectivityTrait {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoTrait {
    #[serde(default)]
    custom_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HumidityTrait {
    ambient_humidity_percent: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemperatureTrait {
    ambient_temperature_celsius: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermostatModeTrait {
    mode: String,
    #[serde(default)]
    available_modes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermostatEcoTrait {
    mode: String,
    #[serde(default)]
    available_modes: Vec<String>,
    heat_celsius: Option<f64>,
    cool_celsius: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermostatHvacTrait {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetpointTrait {
    heat_celsius: Option<f64>,
    cool_celsius: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FanTrait {
    timer_mode: Option<String>,
    /// RFC 3339, only present while the timer runs
    timer_timeout: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsTrait {
    temperature_scale: Option<String>,
}

fn trait_key(name: &str) -> String {
    format!("{DEVICE_TRAITS_PREFIX}.{name}")
}

fn decode_trait<T: DeserializeOwned>(raw: &RawDevice, name: &str, value: &Value) -> NestResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| NestError::malformed(format!("{}: invalid {name} trait: {e}", raw.name)))
}

fn required_trait<T: DeserializeOwned>(raw: &RawDevice, name: &str) -> NestResult<T> {
    let value = raw.traits.get(&trait_key(name)).ok_or_else(|| {
        NestError::malformed(format!("{}: missing required trait {name}", raw.name))
    })?;
    decode_trait(raw, name, value)
}

fn optional_trait<T: DeserializeOwned>(raw: &RawDevice, name: &str) -> NestResult<Option<T>> {
    raw.traits
        .get(&trait_key(name))
        .map(|value| decode_trait(raw, name, value))
        .transpose()
}

fn parse_all<T: FromStr<Err = NestError>>(values: &[String]) -> NestResult<Vec<T>> {
    values.iter().map(|v| v.parse()).collect()
}

fn device_id_of(name: &str) -> NestResult<&str> {
    match name.rsplit_once("/devices/") {
        Some((_, id)) if !id.is_empty() && !id.contains('/') => Ok(id),
        _ => Err(NestError::malformed(format!(
            "resource name '{name}' has no device segment"
        ))),
    }
}

/// `enterprises/{p}/structures/{s}/rooms/{r}` to `enterprises/{p}/structures/{s}`
fn structure_of_room(room: &str) -> String {
    room.split('/').take(4).collect::<Vec<_>>().join("/")
}

fn last_segment(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_owned()
}

struct Placement {
    structure_name: String,
    room_name: Option<String>,
}

fn resolve_placement(raw: &RawDevice, structures: &StructureDirectory) -> NestResult<Placement> {
    let mut explicit_structure = None;
    let mut room_structure = None;
    let mut room_name = None;

    for relation in &raw.parent_relations {
        if relation.parent.contains("/rooms/") {
            let structure = structure_of_room(&relation.parent);
            room_structure = Some(
                structures
                    .display_name(&structure)
                    .map_or_else(|| last_segment(&structure), ToOwned::to_owned),
            );
            room_name = Some(relation.display_name.clone());
        } else if relation.parent.contains("/structures/") {
            explicit_structure = Some(
                structures
                    .display_name(&relation.parent)
                    .map_or_else(|| relation.display_name.clone(), ToOwned::to_owned),
            );
        } else {
            return Err(NestError::malformed(format!(
                "{}: parent '{}' is neither structure nor room",
                raw.name, relation.parent
            )));
        }
    }

    Ok(Placement {
        structure_name: explicit_structure.or(room_structure).unwrap_or_default(),
        room_name,
    })
}

/// Build a snapshot from a raw device resource
///
/// Pure: the result depends only on the arguments. Fails with
/// [`NestError::MalformedResource`] without producing a partial snapshot.
pub fn parse_device(
    raw: &RawDevice,
    structures: &StructureDirectory,
    fetched_at: DateTime<Utc>,
) -> NestResult<DeviceSnapshot> {
    if raw.device_type != THERMOSTAT_TYPE {
        return Err(NestError::malformed(format!(
            "{}: unsupported device type {}",
            raw.name, raw.device_type
        )));
    }
    let device_id = device_id_of(&raw.name)?.to_owned();
    let placement = resolve_placement(raw, structures)?;

    let connectivity: ConnectivityTrait = required_trait(raw, "Connectivity")?;
    let temperature: TemperatureTrait = required_trait(raw, "Temperature")?;
    let mode: ThermostatModeTrait = required_trait(raw, "ThermostatMode")?;
    let eco: ThermostatEcoTrait = required_trait(raw, "ThermostatEco")?;
    let hvac: ThermostatHvacTrait = required_trait(raw, "ThermostatHvac")?;

    let info: Option<InfoTrait> = optional_trait(raw, "Info")?;
    let humidity: Option<HumidityTrait> = optional_trait(raw, "Humidity")?;
    let setpoint: Option<SetpointTrait> = optional_trait(raw, "ThermostatTemperatureSetpoint")?;
    let fan: Option<FanTrait> = optional_trait(raw, "Fan")?;
    let settings: Option<SettingsTrait> = optional_trait(raw, "Settings")?;

    let (fan_timer_mode, fan_timer_timeout) =
        fan.map_or((None, None), |f| (f.timer_mode, f.timer_timeout));
    let fan_timer_mode = fan_timer_mode
        .map(|m| m.parse::<FanTimerMode>())
        .transpose()?;
    let temperature_scale = settings
        .and_then(|s| s.temperature_scale)
        .map(|s| s.parse::<TemperatureScale>())
        .transpose()?;
    let (setpoint_heat_celsius, setpoint_cool_celsius) =
        setpoint.map_or((None, None), |s| (s.heat_celsius, s.cool_celsius));

    Ok(DeviceSnapshot {
        device_id,
        resource_name: raw.name.clone(),
        display_name: info.map(|i| i.custom_name).unwrap_or_default(),
        structure_name: placement.structure_name,
        room_name: placement.room_name,
        connectivity_status: connectivity.status.parse::<ConnectivityStatus>()?,
        ambient_temperature_celsius: temperature.ambient_temperature_celsius,
        ambient_humidity_percent: humidity.and_then(|h| h.ambient_humidity_percent),
        hvac_mode: mode.mode.parse()?,
        available_hvac_modes: parse_all::<HvacMode>(&mode.available_modes)?,
        hvac_status: HvacMode::from_hvac_status(&hvac.status)?,
        eco_mode: eco.mode.parse()?,
        available_eco_modes: parse_all::<EcoMode>(&eco.available_modes)?,
        eco_heat_celsius: eco.heat_celsius,
        eco_cool_celsius: eco.cool_celsius,
        setpoint_heat_celsius,
        setpoint_cool_celsius,
        fan_timer_mode,
        fan_timer_timeout,
        temperature_scale,
        fetched_at,
    })
}
