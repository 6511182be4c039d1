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

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::NestResult;
use crate::parser::{RawDevice, RawStructure};
use crate::thermostat::EcoMode;

/// Command sent to a single device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    SetEcoMode(EcoMode),
}

impl DeviceCommand {
    /// Fully qualified SDM command name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetEcoMode(_) => "sdm.devices.commands.ThermostatEco.SetMode",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Self::SetEcoMode(mode) => json!({ "mode": mode.as_str() }),
        }
    }
}

/// Upstream device API for one enterprise
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// All devices in the enterprise (called once at startup)
    async fn list_devices(&self) -> NestResult<Vec<RawDevice>>;

    /// One device by its trailing id
    async fn get_device(&self, device_id: &str) -> NestResult<RawDevice>;

    /// All structures, used to label devices with a human name
    async fn list_structures(&self) -> NestResult<Vec<RawStructure>>;

    async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> NestResult<()>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}
