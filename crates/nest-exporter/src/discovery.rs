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

//! One-time startup discovery of structures and thermostats

use nest_core::{
    Clock, DeviceSnapshot, DeviceSource, NestError, NestResult, StructureDirectory,
    THERMOSTAT_TYPE, parse_device,
};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Discovery {
    pub structures: StructureDirectory,
    pub thermostats: Vec<DeviceSnapshot>,
}

/// List structures and devices once and parse every thermostat
///
/// Non-thermostat devices are ignored and a thermostat that fails to parse is
/// skipped with a warning. Finding no usable thermostat is an error.
pub async fn discover(source: &dyn DeviceSource, clock: &dyn Clock) -> NestResult<Discovery> {
    let structures = StructureDirectory::from_structures(&source.list_structures().await?);
    debug!(count = structures.len(), "Discovered structures");

    let devices = source.list_devices().await?;
    let fetched_at = clock.now();

    let mut thermostats = Vec::new();
    for raw in &devices {
        if raw.device_type != THERMOSTAT_TYPE {
            debug!(device = %raw.name, device_type = %raw.device_type, "Skipping non-thermostat");
            continue;
        }
        match parse_device(raw, &structures, fetched_at) {
            Ok(snapshot) => thermostats.push(snapshot),
            Err(e) => warn!(device = %raw.name, error = %e, "Skipping unparseable thermostat"),
        }
    }

    if thermostats.is_empty() {
        return Err(NestError::NoDevices);
    }

    info!(
        source = source.name(),
        devices = devices.len(),
        thermostats = thermostats.len(),
        structures = structures.len(),
        "Discovery complete"
    );
    Ok(Discovery {
        structures,
        thermostats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, raw_thermostat};
    use chrono::{TimeZone, Utc};
    use nest_core::ManualClock;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn keeps_thermostats_and_skips_the_rest() {
        let mut camera = raw_thermostat("cam-1");
        camera.device_type = "sdm.devices.types.CAMERA".to_owned();
        let mut broken = raw_thermostat("broken");
        broken.traits.remove("sdm.devices.traits.ThermostatEco");

        let source = FakeSource::with_devices(vec![
            raw_thermostat("t-1"),
            camera,
            broken,
            raw_thermostat("t-2"),
        ]);

        let found = discover(&source, &clock()).await.unwrap();
        let ids: Vec<_> = found
            .thermostats
            .iter()
            .map(|t| t.device_id.as_str())
            .collect();
        assert_eq!(ids, ["t-1", "t-2"]);
        assert_eq!(
            found
                .structures
                .display_name("enterprises/project-1/structures/s1"),
            Some("Home")
        );
    }

    #[tokio::test]
    async fn no_thermostats_is_an_error() {
        let source = FakeSource::with_devices(Vec::new());
        let err = discover(&source, &clock()).await.unwrap_err();
        assert!(matches!(err, NestError::NoDevices));
    }

    #[tokio::test]
    async fn auth_failure_propagates() {
        let source = FakeSource::with_devices(vec![raw_thermostat("t-1")]);
        source.fail_listing_with(|| NestError::Auth("invalid_grant".to_owned()));

        let err = discover(&source, &clock()).await.unwrap_err();
        assert!(err.is_auth());
    }
}
