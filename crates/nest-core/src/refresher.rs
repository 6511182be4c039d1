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

use chrono::TimeDelta;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{Clock, FreshnessCache};
use crate::errors::{NestError, NestResult};
use crate::parser::{StructureDirectory, parse_device};
use crate::thermostat::{DeviceSnapshot, EcoMode};
use crate::traits::{DeviceCommand, DeviceSource};

pub const DEFAULT_TTL_SECS: i64 = 15;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves device snapshots from the cache, fetching from upstream on a miss
///
/// Failed fetches are returned to the caller as-is: nothing is cached and no
/// stale value is served in their place.
pub struct DeviceRefresher {
    source: Arc<dyn DeviceSource>,
    cache: FreshnessCache,
    structures: StructureDirectory,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    fetch_timeout: Duration,
}

impl fmt::Debug for DeviceRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRefresher")
            .field("source", &self.source.name())
            .field("cache", &self.cache)
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl DeviceRefresher {
    pub fn new(
        source: Arc<dyn DeviceSource>,
        structures: StructureDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache: FreshnessCache::new(Arc::clone(&clock)),
            structures,
            clock,
            ttl: TimeDelta::seconds(DEFAULT_TTL_SECS),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Snapshot for `device_id` no older than the configured TTL
    pub async fn get_fresh(&self, device_id: &str) -> NestResult<Arc<DeviceSnapshot>> {
        if let Some(snapshot) = self.cache.get(device_id) {
            debug!(device_id, "Cache hit");
            return Ok(snapshot);
        }

        debug!(device_id, source = self.source.name(), "Cache miss, fetching");
        let raw = tokio::time::timeout(self.fetch_timeout, self.source.get_device(device_id))
            .await
            .map_err(|_| {
                NestError::Fetch(format!(
                    "{device_id}: no response within {:?}",
                    self.fetch_timeout
                ))
            })??;

        let snapshot = Arc::new(parse_device(&raw, &self.structures, self.clock.now())?);
        if snapshot.device_id != device_id {
            warn!(
                requested = device_id,
                returned = %snapshot.device_id,
                "Upstream returned a different device"
            );
        }

        self.cache.put(device_id, Arc::clone(&snapshot), self.ttl);
        Ok(snapshot)
    }

    /// Switch eco mode on a device
    ///
    /// The mode is checked against the device's advertised eco modes first; an
    /// unsupported mode never reaches upstream.
    pub async fn set_eco_mode(&self, device_id: &str, mode: EcoMode) -> NestResult<()> {
        let snapshot = self.get_fresh(device_id).await?;
        snapshot.validate_eco_mode(mode)?;

        self.source
            .execute_command(device_id, &DeviceCommand::SetEcoMode(mode))
            .await?;
        self.cache.invalidate(device_id);

        info!(device_id, mode = %mode, "Eco mode changed");
        Ok(())
    }
}
