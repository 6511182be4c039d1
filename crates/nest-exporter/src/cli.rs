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

//! Command-line flags. Anything left unset falls back to the config file.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "nest-exporter")]
#[command(version, about = "Prometheus exporter for Nest thermostats")]
#[command(
    long_about = "Polls the Smart Device Management API and serves thermostat state as Prometheus metrics.\n\
    \nExamples:\n  \
    nest-exporter --nest.project-id my-project\n  \
    nest-exporter --config.file exporter.toml --web.listen-address 127.0.0.1:9810"
)]
pub struct Cli {
    /// Address to listen on for web interface and telemetry [default: :9810]
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics [default: /metrics]
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Path to the Google client_secret.json file [default: client_secret.json]
    #[arg(long = "config.client_secret", value_name = "FILE")]
    pub client_secret: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(long = "config.file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Device Access project id (falls back to the config file, then NEST_PROJECT_ID)
    #[arg(long = "nest.project-id", value_name = "ID")]
    pub project_id: Option<String>,
}
