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

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::thermostat::DeviceSnapshot;

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

struct CacheEntry {
    snapshot: Arc<DeviceSnapshot>,
    expires_at: DateTime<Utc>,
}

/// Latest snapshot per device, valid until its expiry
///
/// One lock covers lookup-and-evict as well as overwrite. Expired entries are
/// only dropped when a lookup finds them.
pub struct FreshnessCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for FreshnessCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessCache")
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl FreshnessCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Cached snapshot for `device_id` if it has not expired yet
    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceSnapshot>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let entry = entries.get(device_id)?;
        if now < entry.expires_at {
            return Some(Arc::clone(&entry.snapshot));
        }

        trace!(device_id, "Evicting expired cache entry");
        entries.remove(device_id);
        None
    }

    /// Store `snapshot`, replacing any previous entry, valid for `ttl` from now
    ///
    /// An expiry past the representable range saturates at `DateTime::<Utc>::MAX_UTC`.
    pub fn put(&self, device_id: &str, snapshot: Arc<DeviceSnapshot>, ttl: TimeDelta) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.lock().insert(
            device_id.to_owned(),
            CacheEntry {
                snapshot,
                expires_at,
            },
        );
    }

    pub fn invalidate(&self, device_id: &str) {
        self.entries.lock().remove(device_id);
    }

    /// Number of entries held, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
