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

pub mod cli;
pub mod config;
pub mod discovery;
pub mod metrics;
pub mod server;

#[cfg(test)]
mod testing;

pub use cli::Cli;
pub use config::{ExporterConfig, RoomLabel};
pub use discovery::{Discovery, discover};
pub use metrics::{MetricBinder, MetricSpec, thermostat_metric_specs};
pub use server::router;
