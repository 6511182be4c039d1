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

//! Per-device gauges whose values are computed from a fresh snapshot on scrape

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use nest_core::units::UNAVAILABLE;
use nest_core::{DeviceRefresher, DeviceSnapshot, FanTimerMode, HvacMode, TemperatureScale};
use prometheus::{Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RoomLabel;

pub const METRIC_PREFIX: &str = "nest_thermostat_";
pub const DEVICE_LABELS: [&str; 3] = ["structure", "room", "device"];
const INFO_LABELS: [&str; 5] = ["structure", "room", "device", "name", "scale"];
const HVAC_MODE_LABELS: [&str; 4] = ["structure", "room", "device", "mode"];

/// Reads one value out of a snapshot; `None` is exported as NaN
pub type Projection = fn(&DeviceSnapshot) -> Option<f64>;

#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    /// Name without the `nest_thermostat_` prefix
    pub name: &'static str,
    pub help: &'static str,
    pub projection: Projection,
}

impl MetricSpec {
    pub fn full_name(&self) -> String {
        format!("{METRIC_PREFIX}{}", self.name)
    }
}

fn flag(on: bool) -> Option<f64> {
    Some(if on { 1.0 } else { 0.0 })
}

#[expect(clippy::cast_precision_loss, reason = "whole seconds fit an f64 mantissa")]
fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64
}

/// Gauges exported for every thermostat
pub fn thermostat_metric_specs(fahrenheit: bool) -> Vec<MetricSpec> {
    let mut specs = vec![
        MetricSpec {
            name: "temperature_celsius",
            help: "Ambient temperature",
            projection: |s| s.ambient_temperature_celsius,
        },
        MetricSpec {
            name: "humidity_percent",
            help: "Relative humidity",
            projection: |s| s.ambient_humidity_percent,
        },
        MetricSpec {
            name: "eco_cool_celsius",
            help: "Eco mode cooling temperature",
            projection: |s| s.eco_cool_celsius,
        },
        MetricSpec {
            name: "eco_heat_celsius",
            help: "Eco mode heating temperature",
            projection: |s| s.eco_heat_celsius,
        },
        MetricSpec {
            name: "setpoint_cool_celsius",
            help: "Cooling setpoint temperature",
            projection: |s| s.setpoint_cool_celsius,
        },
        MetricSpec {
            name: "setpoint_heat_celsius",
            help: "Heating setpoint temperature",
            projection: |s| s.setpoint_heat_celsius,
        },
        MetricSpec {
            name: "connectivity_state",
            help: "1 if the thermostat is online",
            projection: |s| flag(s.is_online()),
        },
        MetricSpec {
            name: "running_state",
            help: "1 if the system is currently heating or cooling",
            projection: |s| flag(s.is_running()),
        },
        MetricSpec {
            name: "eco_mode_state",
            help: "1 if manual eco mode is active",
            projection: |s| flag(s.is_eco_active()),
        },
        MetricSpec {
            name: "fan_timer_state",
            help: "1 if the fan timer is running, NaN without a fan",
            projection: |s| s.fan_timer_mode.and_then(|m| flag(m == FanTimerMode::On)),
        },
        MetricSpec {
            name: "fan_timer_timeout_timestamp_seconds",
            help: "Unix time the running fan timer stops, NaN when it is not running",
            projection: |s| s.fan_timer_timeout.map(unix_seconds),
        },
    ];

    if fahrenheit {
        specs.extend([
            MetricSpec {
                name: "temperature_fahrenheit",
                help: "Ambient temperature in Fahrenheit",
                projection: DeviceSnapshot::ambient_temperature_fahrenheit,
            },
            MetricSpec {
                name: "setpoint_cool_fahrenheit",
                help: "Cooling setpoint temperature in Fahrenheit",
                projection: DeviceSnapshot::setpoint_cool_fahrenheit,
            },
            MetricSpec {
                name: "setpoint_heat_fahrenheit",
                help: "Heating setpoint temperature in Fahrenheit",
                projection: DeviceSnapshot::setpoint_heat_fahrenheit,
            },
            MetricSpec {
                name: "eco_cool_fahrenheit",
                help: "Eco mode cooling temperature in Fahrenheit",
                projection: DeviceSnapshot::eco_cool_fahrenheit,
            },
            MetricSpec {
                name: "eco_heat_fahrenheit",
                help: "Eco mode heating temperature in Fahrenheit",
                projection: DeviceSnapshot::eco_heat_fahrenheit,
            },
        ]);
    }
    specs
}

/// Label values identifying one thermostat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLabels {
    pub structure: String,
    pub room: String,
    pub device: String,
    pub name: String,
    /// Display scale, empty when the device does not report one
    pub scale: &'static str,
}

impl DeviceLabels {
    pub fn for_snapshot(snapshot: &DeviceSnapshot, policy: RoomLabel) -> Self {
        let room = match (&snapshot.room_name, policy) {
            (Some(room), _) => room.clone(),
            (None, RoomLabel::Structure) => snapshot.structure_name.clone(),
            (None, RoomLabel::Empty) => String::new(),
        };
        Self {
            structure: snapshot.structure_name.clone(),
            room,
            device: snapshot.device_id.clone(),
            name: snapshot.display_name.clone(),
            scale: snapshot
                .temperature_scale
                .map_or("", TemperatureScale::as_str),
        }
    }

    fn values(&self) -> [&str; 3] {
        [&self.structure, &self.room, &self.device]
    }

    fn info_values(&self) -> [&str; 5] {
        [
            &self.structure,
            &self.room,
            &self.device,
            &self.name,
            self.scale,
        ]
    }

    fn with_mode(&self, mode: HvacMode) -> [&str; 4] {
        [&self.structure, &self.room, &self.device, mode.as_str()]
    }
}

struct Binding {
    device_id: String,
    gauges: Vec<(&'static str, Gauge, Projection)>,
    /// One state-set series per advertised HVAC mode
    hvac_modes: Vec<(HvacMode, Gauge)>,
    up: Gauge,
    fetch_errors: IntCounter,
}

impl Binding {
    fn apply(&self, snapshot: &DeviceSnapshot) {
        for (_, gauge, projection) in &self.gauges {
            gauge.set(projection(snapshot).unwrap_or(UNAVAILABLE));
        }
        for (mode, gauge) in &self.hvac_modes {
            gauge.set(if snapshot.hvac_mode == *mode { 1.0 } else { 0.0 });
        }
        self.up.set(1.0);
    }

    fn mark_failed(&self) {
        for (_, gauge, _) in &self.gauges {
            gauge.set(UNAVAILABLE);
        }
        for (_, gauge) in &self.hvac_modes {
            gauge.set(UNAVAILABLE);
        }
        self.up.set(0.0);
        self.fetch_errors.inc();
    }
}

/// Registry of thermostat gauges bound to the device refresher
///
/// The device set is fixed once startup registration is done; each scrape
/// refreshes every bound device once and re-evaluates its projections.
pub struct MetricBinder {
    registry: Registry,
    refresher: Arc<DeviceRefresher>,
    room_label: RoomLabel,
    families: HashMap<&'static str, GaugeVec>,
    info: GaugeVec,
    hvac_mode: GaugeVec,
    up: GaugeVec,
    fetch_errors: IntCounterVec,
    bindings: Vec<Binding>,
}

impl fmt::Debug for MetricBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricBinder")
            .field("room_label", &self.room_label)
            .field("families", &self.families.len())
            .field("devices", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

impl MetricBinder {
    pub fn new(refresher: Arc<DeviceRefresher>, room_label: RoomLabel) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let info = GaugeVec::new(
            Opts::new(
                format!("{METRIC_PREFIX}info"),
                "Thermostat identity, always 1",
            ),
            &INFO_LABELS,
        )?;
        let hvac_mode = GaugeVec::new(
            Opts::new(
                format!("{METRIC_PREFIX}hvac_mode"),
                "1 for the selected HVAC mode, 0 for the other advertised modes",
            ),
            &HVAC_MODE_LABELS,
        )?;
        let up = GaugeVec::new(
            Opts::new(
                format!("{METRIC_PREFIX}up"),
                "1 if the last refresh of the thermostat succeeded",
            ),
            &DEVICE_LABELS,
        )?;
        let fetch_errors = IntCounterVec::new(
            Opts::new(
                format!("{METRIC_PREFIX}fetch_errors_total"),
                "Failed thermostat refreshes",
            ),
            &DEVICE_LABELS,
        )?;
        registry.register(Box::new(info.clone()))?;
        registry.register(Box::new(hvac_mode.clone()))?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(fetch_errors.clone()))?;

        Ok(Self {
            registry,
            refresher,
            room_label,
            families: HashMap::new(),
            info,
            hvac_mode,
            up,
            fetch_errors,
            bindings: Vec::new(),
        })
    }

    fn family(&mut self, spec: &MetricSpec) -> prometheus::Result<GaugeVec> {
        if let Some(family) = self.families.get(spec.name) {
            return Ok(family.clone());
        }
        let family = GaugeVec::new(Opts::new(spec.full_name(), spec.help), &DEVICE_LABELS)?;
        self.registry.register(Box::new(family.clone()))?;
        self.families.insert(spec.name, family.clone());
        Ok(family)
    }

    /// Bind `specs` to one device, reusing families and children already present
    ///
    /// Re-registering a known device only adds what it lacks; gauges that
    /// already carry live values keep them.
    pub fn register(
        &mut self,
        snapshot: &DeviceSnapshot,
        specs: &[MetricSpec],
    ) -> prometheus::Result<()> {
        let labels = DeviceLabels::for_snapshot(snapshot, self.room_label);
        let values = labels.values();

        let mut families = Vec::with_capacity(specs.len());
        for spec in specs {
            families.push((spec, self.family(spec)?));
        }
        let new_gauge = |spec: &MetricSpec, family: &GaugeVec| {
            let gauge = family.with_label_values(&values);
            gauge.set(UNAVAILABLE);
            (spec.name, gauge, spec.projection)
        };

        let mut modes = snapshot.available_hvac_modes.clone();
        if !modes.contains(&snapshot.hvac_mode) {
            modes.push(snapshot.hvac_mode);
        }
        let new_mode = |mode: HvacMode| {
            let gauge = self.hvac_mode.with_label_values(&labels.with_mode(mode));
            gauge.set(UNAVAILABLE);
            (mode, gauge)
        };

        if let Some(existing) = self
            .bindings
            .iter_mut()
            .find(|b| b.device_id == snapshot.device_id)
        {
            for (spec, family) in &families {
                if !existing.gauges.iter().any(|(name, _, _)| *name == spec.name) {
                    existing.gauges.push(new_gauge(*spec, family));
                }
            }
            for mode in modes {
                if !existing.hvac_modes.iter().any(|(m, _)| *m == mode) {
                    existing.hvac_modes.push(new_mode(mode));
                }
            }
            return Ok(());
        }

        let gauges: Vec<_> = families
            .iter()
            .map(|(spec, family)| new_gauge(*spec, family))
            .collect();
        let hvac_modes: Vec<_> = modes.into_iter().map(new_mode).collect();
        self.info.with_label_values(&labels.info_values()).set(1.0);
        let up = self.up.with_label_values(&values);
        let fetch_errors = self.fetch_errors.with_label_values(&values);

        debug!(
            device = %labels.device,
            structure = %labels.structure,
            room = %labels.room,
            gauges = gauges.len(),
            hvac_modes = hvac_modes.len(),
            "Registered thermostat metrics"
        );
        self.bindings.push(Binding {
            device_id: snapshot.device_id.clone(),
            gauges,
            hvac_modes,
            up,
            fetch_errors,
        });
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.bindings.len()
    }

    /// Refresh every bound device once, concurrently, and update its gauges
    ///
    /// A failing device gets NaN everywhere and `up` 0; the others are unaffected.
    pub async fn refresh(&self) {
        let results = join_all(self.bindings.iter().map(|binding| async move {
            (binding, self.refresher.get_fresh(&binding.device_id).await)
        }))
        .await;

        for (binding, result) in results {
            match result {
                Ok(snapshot) => binding.apply(&snapshot),
                Err(e) => {
                    warn!(device = %binding.device_id, error = %e, "Thermostat refresh failed");
                    binding.mark_failed();
                }
            }
        }
    }

    /// Prometheus text exposition of the current values
    pub fn encode(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    pub async fn scrape(&self) -> prometheus::Result<String> {
        self.refresh().await;
        self.encode()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::float_cmp)]

    use super::*;
    use crate::testing::{FakeSource, home_structure, raw_thermostat};
    use chrono::{TimeDelta, TimeZone};
    use nest_core::{Clock, DeviceSource, ManualClock, StructureDirectory, parse_device};
    use std::time::Duration;

    struct Fixture {
        source: Arc<FakeSource>,
        clock: Arc<ManualClock>,
        binder: MetricBinder,
    }

    fn fixture(ids: &[&str], fahrenheit: bool) -> Fixture {
        let source = Arc::new(FakeSource::with_devices(
            ids.iter().map(|id| raw_thermostat(id)).collect(),
        ));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ));
        let structures = StructureDirectory::from_structures(&[home_structure()]);
        let refresher = Arc::new(DeviceRefresher::new(
            Arc::clone(&source) as Arc<dyn DeviceSource>,
            structures.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        let mut binder = MetricBinder::new(refresher, RoomLabel::Structure).unwrap();
        let specs = thermostat_metric_specs(fahrenheit);
        for id in ids {
            let snapshot = parse_device(&raw_thermostat(id), &structures, clock.now()).unwrap();
            binder.register(&snapshot, &specs).unwrap();
        }
        Fixture {
            source,
            clock,
            binder,
        }
    }

    fn gauge(binder: &MetricBinder, name: &str, device: &str) -> f64 {
        binder
            .families
            .get(name)
            .unwrap()
            .with_label_values(&["Home", "Living Room", device])
            .get()
    }

    fn up(binder: &MetricBinder, device: &str) -> f64 {
        binder
            .up
            .with_label_values(&["Home", "Living Room", device])
            .get()
    }

    #[test]
    fn fahrenheit_gauges_are_optional() {
        assert_eq!(thermostat_metric_specs(false).len(), 11);
        let with_f = thermostat_metric_specs(true);
        assert_eq!(with_f.len(), 16);
        for name in [
            "nest_thermostat_temperature_fahrenheit",
            "nest_thermostat_eco_cool_fahrenheit",
            "nest_thermostat_eco_heat_fahrenheit",
        ] {
            assert!(with_f.iter().any(|s| s.full_name() == name), "{name}");
        }
    }

    fn projection(name: &str) -> Projection {
        thermostat_metric_specs(true)
            .into_iter()
            .find(|s| s.name == name)
            .unwrap()
            .projection
    }

    #[test]
    fn fan_timer_timeout_is_a_unix_timestamp() {
        let structures = StructureDirectory::from_structures(&[home_structure()]);
        let mut raw = raw_thermostat("t-1");
        raw.traits.insert(
            "sdm.devices.traits.Fan".to_owned(),
            serde_json::json!({ "timerMode": "ON", "timerTimeout": "2025-01-01T12:30:00Z" }),
        );
        let snapshot = parse_device(&raw, &structures, Utc::now()).unwrap();

        let timeout = projection("fan_timer_timeout_timestamp_seconds");
        assert_eq!(timeout(&snapshot), Some(1_735_734_600.0));
        assert_eq!(projection("fan_timer_state")(&snapshot), Some(1.0));
    }

    #[test]
    fn eco_fahrenheit_follows_celsius() {
        let structures = StructureDirectory::from_structures(&[home_structure()]);
        let snapshot = parse_device(&raw_thermostat("t-1"), &structures, Utc::now()).unwrap();

        let heat = projection("eco_heat_fahrenheit")(&snapshot).unwrap();
        let cool = projection("eco_cool_fahrenheit")(&snapshot).unwrap();
        assert!((heat - 59.9).abs() < 1e-9);
        assert!((cool - 82.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn scrape_exposes_projections() {
        let f = fixture(&["t-1"], true);
        let text = f.binder.scrape().await.unwrap();

        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 21.0);
        assert_eq!(gauge(&f.binder, "running_state", "t-1"), 1.0);
        assert_eq!(gauge(&f.binder, "eco_mode_state", "t-1"), 0.0);
        assert_eq!(gauge(&f.binder, "fan_timer_state", "t-1"), 0.0);
        assert!((gauge(&f.binder, "temperature_fahrenheit", "t-1") - 69.8).abs() < 1e-9);
        assert!(gauge(&f.binder, "fan_timer_timeout_timestamp_seconds", "t-1").is_nan());
        assert_eq!(up(&f.binder, "t-1"), 1.0);

        assert!(text.contains(
            r#"nest_thermostat_temperature_celsius{device="t-1",room="Living Room",structure="Home"} 21"#
        ));
        assert!(text.contains(
            r#"nest_thermostat_info{device="t-1",name="Thermostat t-1",room="Living Room",scale="CELSIUS",structure="Home"} 1"#
        ));
    }

    fn hvac_mode(binder: &MetricBinder, device: &str, mode: &str) -> f64 {
        binder
            .hvac_mode
            .with_label_values(&["Home", "Living Room", device, mode])
            .get()
    }

    #[tokio::test]
    async fn hvac_mode_is_a_state_set() {
        let f = fixture(&["t-1", "t-2"], false);
        f.source.fail_device("t-2");
        let text = f.binder.scrape().await.unwrap();

        assert_eq!(hvac_mode(&f.binder, "t-1", "HEAT"), 1.0);
        for mode in ["COOL", "HEATCOOL", "OFF"] {
            assert_eq!(hvac_mode(&f.binder, "t-1", mode), 0.0, "{mode}");
        }
        assert!(hvac_mode(&f.binder, "t-2", "HEAT").is_nan());
        assert_eq!(f.binder.bindings[0].hvac_modes.len(), 4);
        assert!(text.contains(
            r#"nest_thermostat_hvac_mode{device="t-1",mode="HEAT",room="Living Room",structure="Home"} 1"#
        ));
    }

    #[tokio::test]
    async fn absent_field_is_nan() {
        let f = fixture(&["t-1"], false);
        f.binder.scrape().await.unwrap();

        // The fixture has no cooling setpoint
        assert!(gauge(&f.binder, "setpoint_cool_celsius", "t-1").is_nan());
        assert_eq!(gauge(&f.binder, "setpoint_heat_celsius", "t-1"), 20.5);
    }

    #[tokio::test]
    async fn failing_device_is_isolated() {
        let f = fixture(&["t-1", "t-2", "t-3"], false);
        f.source.set_temperature("t-1", 19.0);
        f.source.set_temperature("t-3", 23.5);
        f.source.fail_device("t-2");

        f.binder.scrape().await.unwrap();

        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 19.0);
        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-3"), 23.5);
        assert!(gauge(&f.binder, "temperature_celsius", "t-2").is_nan());
        assert!(gauge(&f.binder, "connectivity_state", "t-2").is_nan());
        assert_eq!(up(&f.binder, "t-1"), 1.0);
        assert_eq!(up(&f.binder, "t-2"), 0.0);
        assert_eq!(
            f.binder
                .fetch_errors
                .with_label_values(&["Home", "Living Room", "t-2"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn scrapes_within_ttl_share_one_fetch() {
        let f = fixture(&["t-1"], false);
        f.binder.scrape().await.unwrap();
        f.source.set_temperature("t-1", 25.0);
        f.binder.scrape().await.unwrap();

        assert_eq!(f.source.fetches(), 1);
        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 21.0);

        f.clock.advance(TimeDelta::seconds(15));
        f.binder.scrape().await.unwrap();
        assert_eq!(f.source.fetches(), 2);
        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 25.0);
    }

    #[tokio::test]
    async fn re_registering_a_device_does_not_duplicate() {
        let mut f = fixture(&["t-1"], false);
        let snapshot = parse_device(
            &raw_thermostat("t-1"),
            &StructureDirectory::from_structures(&[home_structure()]),
            f.clock.now(),
        )
        .unwrap();
        f.binder
            .register(&snapshot, &thermostat_metric_specs(true))
            .unwrap();

        assert_eq!(f.binder.device_count(), 1);
        assert_eq!(f.binder.bindings[0].gauges.len(), 16);
        assert_eq!(f.binder.bindings[0].hvac_modes.len(), 4);
    }

    #[tokio::test]
    async fn re_registering_keeps_live_values() {
        let mut f = fixture(&["t-1"], false);
        f.binder.scrape().await.unwrap();
        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 21.0);

        let snapshot = parse_device(
            &raw_thermostat("t-1"),
            &StructureDirectory::from_structures(&[home_structure()]),
            f.clock.now(),
        )
        .unwrap();
        f.binder
            .register(&snapshot, &thermostat_metric_specs(true))
            .unwrap();

        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-1"), 21.0);
        assert_eq!(hvac_mode(&f.binder, "t-1", "HEAT"), 1.0);
        assert_eq!(up(&f.binder, "t-1"), 1.0);
        // Newly added gauges wait for the next scrape
        assert!(gauge(&f.binder, "temperature_fahrenheit", "t-1").is_nan());
    }

    #[tokio::test]
    async fn concurrent_scrapes_settle_on_one_entry_per_device() {
        let f = fixture(&["t-1", "t-2"], false);
        f.source.delay_fetches(Duration::from_millis(20));

        let (a, b, c) = tokio::join!(f.binder.scrape(), f.binder.scrape(), f.binder.scrape());
        for text in [a.unwrap(), b.unwrap(), c.unwrap()] {
            assert!(text.contains("nest_thermostat_up{"));
        }

        assert_eq!(f.binder.refresher.cache().len(), 2);
        assert!((2..=6).contains(&f.source.fetches()));
        assert_eq!(up(&f.binder, "t-1"), 1.0);
        assert_eq!(up(&f.binder, "t-2"), 1.0);
        assert_eq!(gauge(&f.binder, "temperature_celsius", "t-2"), 21.0);
    }

    #[test]
    fn room_label_policy_for_structure_level_device() {
        let structures = StructureDirectory::from_structures(&[home_structure()]);
        let mut raw = raw_thermostat("t-1");
        raw.parent_relations[0].parent = "enterprises/project-1/structures/s1".to_owned();
        let snapshot = parse_device(&raw, &structures, Utc::now()).unwrap();
        assert!(snapshot.room_name.is_none());

        let labels = DeviceLabels::for_snapshot(&snapshot, RoomLabel::Structure);
        assert_eq!(labels.room, "Home");
        let labels = DeviceLabels::for_snapshot(&snapshot, RoomLabel::Empty);
        assert_eq!(labels.room, "");
    }
}
