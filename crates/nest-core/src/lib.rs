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

pub mod cache;
pub mod errors;
pub mod parser;
pub mod refresher;
pub mod thermostat;
pub mod traits;
pub mod units;

pub use cache::{Clock, FreshnessCache, ManualClock, SystemClock};
pub use errors::{NestError, NestResult};
pub use parser::{
    DEVICE_TRAITS_PREFIX, ParentRelation, RawDevice, RawStructure, STRUCTURE_INFO_TRAIT,
    StructureDirectory, THERMOSTAT_TYPE, parse_device,
};
pub use refresher::DeviceRefresher;
pub use thermostat::{
    ConnectivityStatus, DeviceSnapshot, EcoMode, FanTimerMode, HvacMode, TemperatureScale,
};
pub use traits::{DeviceCommand, DeviceSource};
