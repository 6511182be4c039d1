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

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nest_core::{Clock, DeviceRefresher, DeviceSource, NestError, SystemClock};
use nest_exporter::{Cli, ExporterConfig, MetricBinder, discover, router, thermostat_metric_specs};
use nest_sdm::{OAuthTokenProvider, SdmClient, SdmDeviceSource, SdmError};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("nest_exporter=info,nest_core=info,nest_sdm=info")
        }))
        .init();

    let cli = Cli::parse();
    let config = ExporterConfig::load(&cli)?;
    let project_id = config
        .project_id()
        .context("nest.project_id is not set")?
        .to_owned();

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build OAuth HTTP client")?;
    let tokens = match OAuthTokenProvider::load_or_authorize(
        http,
        &config.auth.client_secret,
        config.credentials_path(),
    )
    .await
    {
        Ok(tokens) => tokens,
        Err(SdmError::AuthenticationFailed(reason)) => {
            error!(reason = %reason, "Authorization failed");
            eprintln!("Invalid authorization code");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Failed to load credentials"),
    };

    let client = SdmClient::new(
        config.nest.api_base_url.clone(),
        project_id,
        Arc::new(tokens),
        config.request_timeout(),
    )?
    .with_retry_config(config.nest.max_retries, config.retry_delay());
    let source: Arc<dyn DeviceSource> = Arc::new(SdmDeviceSource::new(Arc::new(client)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let discovery = match discover(source.as_ref(), clock.as_ref()).await {
        Ok(discovery) => discovery,
        Err(NestError::Auth(reason)) => {
            error!(reason = %reason, "Stored credentials were rejected");
            eprintln!("Authorization failed: {reason}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Device discovery failed"),
    };

    let refresher = DeviceRefresher::new(source, discovery.structures, clock)
        .with_ttl(config.ttl())
        .with_fetch_timeout(config.fetch_budget());

    let mut binder = MetricBinder::new(Arc::new(refresher), config.metrics.room_label)?;
    let specs = thermostat_metric_specs(config.metrics.fahrenheit);
    for thermostat in &discovery.thermostats {
        binder.register(thermostat, &specs)?;
    }
    info!(
        thermostats = binder.device_count(),
        gauges = specs.len(),
        "Metrics registered"
    );

    let app = router(Arc::new(binder), &config.web.telemetry_path);
    let addr = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "Nest exporter listening on {addr}{}",
        config.web.telemetry_path
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
