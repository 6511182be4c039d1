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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{NestError, NestResult};
use crate::units;

/// Connectivity reported by the `Connectivity` trait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        }
    }
}

impl FromStr for ConnectivityStatus {
    type Err = NestError;

    fn from_str(s: &str) -> NestResult<Self> {
        match s {
            "ONLINE" => Ok(Self::Online),
            "OFFLINE" => Ok(Self::Offline),
            other => Err(NestError::malformed(format!(
                "unknown connectivity status '{other}'"
            ))),
        }
    }
}

/// Thermostat operating mode
///
/// Used both for the selected mode (`ThermostatMode.mode`) and for what the
/// HVAC is doing right now (`ThermostatHvac.status`), where the API reports
/// `HEATING`/`COOLING` instead of `HEAT`/`COOL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::HeatCool => "HEATCOOL",
        }
    }

    /// Parse a `ThermostatHvac.status` value
    pub fn from_hvac_status(s: &str) -> NestResult<Self> {
        match s {
            "HEATING" => Ok(Self::Heat),
            "COOLING" => Ok(Self::Cool),
            "OFF" => Ok(Self::Off),
            other => Err(NestError::malformed(format!("unknown hvac status '{other}'"))),
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HvacMode {
    type Err = NestError;

    fn from_str(s: &str) -> NestResult<Self> {
        match s {
            "OFF" => Ok(Self::Off),
            "HEAT" => Ok(Self::Heat),
            "COOL" => Ok(Self::Cool),
            "HEATCOOL" => Ok(Self::HeatCool),
            other => Err(NestError::malformed(format!("unknown thermostat mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcoMode {
    ManualEco,
    Off,
}

impl EcoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualEco => "MANUAL_ECO",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for EcoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EcoMode {
    type Err = NestError;

    fn from_str(s: &str) -> NestResult<Self> {
        match s {
            "MANUAL_ECO" => Ok(Self::ManualEco),
            "OFF" => Ok(Self::Off),
            other => Err(NestError::malformed(format!("unknown eco mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FanTimerMode {
    On,
    Off,
}

impl FromStr for FanTimerMode {
    type Err = NestError;

    fn from_str(s: &str) -> NestResult<Self> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(NestError::malformed(format!("unknown fan timer mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureScale {
    Celsius,
    Fahrenheit,
}

impl TemperatureScale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Celsius => "CELSIUS",
            Self::Fahrenheit => "FAHRENHEIT",
        }
    }
}

impl FromStr for TemperatureScale {
    type Err = NestError;

    fn from_str(s: &str) -> NestResult<Self> {
        match s {
            "CELSIUS" => Ok(Self::Celsius),
            "FAHRENHEIT" => Ok(Self::Fahrenheit),
            other => Err(NestError::malformed(format!(
                "unknown temperature scale '{other}'"
            ))),
        }
    }
}

/// State of one thermostat as of a single upstream fetch
///
/// Built by [`crate::parser::parse_device`] and never mutated afterwards; a
/// refresh replaces the whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Trailing segment of the resource name
    pub device_id: String,
    /// Full resource name (`enterprises/{project}/devices/{id}`)
    pub resource_name: String,

    pub display_name: String,
    pub structure_name: String,
    /// `None` when the device hangs directly off a structure
    pub room_name: Option<String>,

    pub connectivity_status: ConnectivityStatus,
    pub ambient_temperature_celsius: Option<f64>,
    pub ambient_humidity_percent: Option<f64>,

    pub hvac_mode: HvacMode,
    pub available_hvac_modes: Vec<HvacMode>,
    pub hvac_status: HvacMode,

    pub eco_mode: EcoMode,
    pub available_eco_modes: Vec<EcoMode>,
    pub eco_heat_celsius: Option<f64>,
    pub eco_cool_celsius: Option<f64>,

    pub setpoint_heat_celsius: Option<f64>,
    pub setpoint_cool_celsius: Option<f64>,

    pub fan_timer_mode: Option<FanTimerMode>,
    /// When a running fan timer stops
    pub fan_timer_timeout: Option<DateTime<Utc>>,
    /// Display scale chosen on the device; readings are always Celsius
    pub temperature_scale: Option<TemperatureScale>,

    pub fetched_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    pub fn is_online(&self) -> bool {
        self.connectivity_status == ConnectivityStatus::Online
    }

    /// Whether the HVAC is actively heating or cooling
    pub fn is_running(&self) -> bool {
        self.hvac_status != HvacMode::Off
    }

    pub fn is_eco_active(&self) -> bool {
        self.eco_mode == EcoMode::ManualEco
    }

    pub fn ambient_temperature_fahrenheit(&self) -> Option<f64> {
        self.ambient_temperature_celsius.map(units::c_to_f)
    }

    pub fn setpoint_heat_fahrenheit(&self) -> Option<f64> {
        self.setpoint_heat_celsius.map(units::c_to_f)
    }

    pub fn setpoint_cool_fahrenheit(&self) -> Option<f64> {
        self.setpoint_cool_celsius.map(units::c_to_f)
    }

    pub fn eco_heat_fahrenheit(&self) -> Option<f64> {
        self.eco_heat_celsius.map(units::c_to_f)
    }

    pub fn eco_cool_fahrenheit(&self) -> Option<f64> {
        self.eco_cool_celsius.map(units::c_to_f)
    }

    /// Check that `mode` is one of the device's advertised eco modes
    pub fn validate_eco_mode(&self, mode: EcoMode) -> NestResult<()> {
        if self.available_eco_modes.contains(&mode) {
            Ok(())
        } else {
            Err(NestError::UnsupportedEcoMode {
                requested: mode,
                available: self.available_eco_modes.clone(),
            })
        }
    }

    /// Copy of this snapshot with a different eco mode, if the device supports it
    pub fn with_eco_mode(&self, mode: EcoMode) -> NestResult<Self> {
        self.validate_eco_mode(mode)?;
        Ok(Self {
            eco_mode: mode,
            ..self.clone()
        })
    }
}
