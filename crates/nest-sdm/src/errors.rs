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

use nest_core::NestError;
use thiserror::Error;

/// SDM API error types
#[derive(Error, Debug)]
pub enum SdmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SDM API returned error status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type SdmResult<T> = Result<T, SdmError>;

impl From<SdmError> for NestError {
    fn from(err: SdmError) -> Self {
        match err {
            SdmError::AuthenticationFailed(reason) => NestError::Auth(reason),
            SdmError::ConfigError(reason) => NestError::Config(reason),
            other => NestError::Fetch(other.to_string()),
        }
    }
}
