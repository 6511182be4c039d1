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

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tracing::error;

use crate::metrics::MetricBinder;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone, Debug)]
pub struct ExporterState {
    pub binder: Arc<MetricBinder>,
    pub telemetry_path: Arc<str>,
}

pub fn router(binder: Arc<MetricBinder>, telemetry_path: &str) -> Router {
    let state = ExporterState {
        binder,
        telemetry_path: Arc::from(telemetry_path),
    };

    Router::new()
        .route("/", get(landing_handler))
        .route(telemetry_path, get(metrics_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<ExporterState>) -> Response {
    // Run on its own task so a dropped connection does not cancel fetches
    let binder = Arc::clone(&state.binder);
    let scrape = tokio::spawn(async move { binder.scrape().await });

    match scrape.await {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "Scrape task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn landing_handler(State(state): State<ExporterState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>Nest Thermostat Exporter</title></head>\n<body>\n\
         <h1>Nest Thermostat Exporter</h1>\n\
         <p>{} thermostat(s) exported</p>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n</body>\n</html>\n",
        state.binder.device_count(),
        path = state.telemetry_path,
    ))
}
