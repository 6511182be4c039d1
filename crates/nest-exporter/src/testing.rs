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

//! In-memory `DeviceSource` shared by the unit tests

use async_trait::async_trait;
use nest_core::{DeviceCommand, DeviceSource, NestError, NestResult, RawDevice, RawStructure};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn thermostat_json(id: &str) -> serde_json::Value {
    json!({
        "name": format!("enterprises/project-1/devices/{id}"),
        "type": "sdm.devices.types.THERMOSTAT",
        "traits": {
            "sdm.devices.traits.Info": { "customName": format!("Thermostat {id}") },
            "sdm.devices.traits.Humidity": { "ambientHumidityPercent": 41 },
            "sdm.devices.traits.Connectivity": { "status": "ONLINE" },
            "sdm.devices.traits.Fan": { "timerMode": "OFF" },
            "sdm.devices.traits.ThermostatMode": {
                "mode": "HEAT",
                "availableModes": ["HEAT", "COOL", "HEATCOOL", "OFF"]
            },
            "sdm.devices.traits.ThermostatEco": {
                "availableModes": ["OFF", "MANUAL_ECO"],
                "mode": "OFF",
                "heatCelsius": 15.5,
                "coolCelsius": 27.8
            },
            "sdm.devices.traits.ThermostatHvac": { "status": "HEATING" },
            "sdm.devices.traits.Settings": { "temperatureScale": "CELSIUS" },
            "sdm.devices.traits.ThermostatTemperatureSetpoint": { "heatCelsius": 20.5 },
            "sdm.devices.traits.Temperature": { "ambientTemperatureCelsius": 21.0 }
        },
        "parentRelations": [
            {
                "parent": "enterprises/project-1/structures/s1/rooms/r1",
                "displayName": "Living Room"
            }
        ]
    })
}

pub fn raw_thermostat(id: &str) -> RawDevice {
    serde_json::from_value(thermostat_json(id)).unwrap()
}

pub fn home_structure() -> RawStructure {
    serde_json::from_value(json!({
        "name": "enterprises/project-1/structures/s1",
        "traits": { "sdm.structures.traits.Info": { "customName": "Home" } }
    }))
    .unwrap()
}

#[derive(Default)]
pub struct FakeSource {
    devices: Vec<RawDevice>,
    temperatures: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    listing_error: Mutex<Option<fn() -> NestError>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeSource {
    pub fn with_devices(devices: Vec<RawDevice>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }

    pub fn set_temperature(&self, device_id: &str, celsius: f64) {
        self.temperatures.lock().insert(device_id.to_owned(), celsius);
    }

    pub fn fail_device(&self, device_id: &str) {
        self.failing.lock().insert(device_id.to_owned());
    }

    pub fn fail_listing_with(&self, make_err: fn() -> NestError) {
        *self.listing_error.lock() = Some(make_err);
    }

    /// Hold every device fetch for `delay` before answering
    pub fn delay_fetches(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fetches that ran to the end rather than being dropped mid-flight
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceSource for FakeSource {
    async fn list_devices(&self) -> NestResult<Vec<RawDevice>> {
        if let Some(make_err) = *self.listing_error.lock() {
            return Err(make_err());
        }
        Ok(self.devices.clone())
    }

    async fn get_device(&self, device_id: &str) -> NestResult<RawDevice> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(device_id) {
            return Err(NestError::Fetch(format!("{device_id}: 503 Service Unavailable")));
        }

        let mut raw = self
            .devices
            .iter()
            .find(|d| d.name.ends_with(&format!("/devices/{device_id}")))
            .cloned()
            .ok_or_else(|| NestError::Fetch(format!("{device_id}: not found")))?;
        if let Some(celsius) = self.temperatures.lock().get(device_id).copied() {
            raw.traits.insert(
                "sdm.devices.traits.Temperature".to_owned(),
                json!({ "ambientTemperatureCelsius": celsius }),
            );
        }
        Ok(raw)
    }

    async fn list_structures(&self) -> NestResult<Vec<RawStructure>> {
        Ok(vec![home_structure()])
    }

    async fn execute_command(&self, _device_id: &str, _command: &DeviceCommand) -> NestResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
