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

pub mod adapters;
pub mod auth;
pub mod client;
pub mod errors;
pub mod types;

pub use adapters::SdmDeviceSource;
pub use auth::{
    AuthorizedUser, ClientSecret, DEFAULT_CREDENTIALS_FILE, OAuthTokenProvider, SDM_SCOPE,
    StaticToken, TokenProvider, default_credentials_path, exchange_code,
};
pub use client::{DEFAULT_API_BASE_URL, SdmClient};
pub use errors::{SdmError, SdmResult};
