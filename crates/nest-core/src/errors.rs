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

use thiserror::Error;

use crate::thermostat::EcoMode;

/// Errors raised while discovering, fetching or parsing thermostats
#[derive(Error, Debug)]
pub enum NestError {
    /// A required trait or key was missing, or a mode value was unknown
    #[error("Malformed resource: {0}")]
    MalformedResource(String),

    /// Upstream call failed (network, non-success status, timeout)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Credentials rejected or expired
    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Eco mode {requested} is not available (available: {available:?})")]
    UnsupportedEcoMode {
        requested: EcoMode,
        available: Vec<EcoMode>,
    },

    #[error("No thermostats discovered")]
    NoDevices,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NestError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResource(reason.into())
    }

    /// True for credential failures, which are fatal at startup
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub type NestResult<T> = Result<T, NestError>;
