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

use nest_core::{RawDevice, RawStructure};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET enterprises/{p}/devices`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceList {
    pub devices: Option<Vec<RawDevice>>,
}

/// `GET enterprises/{p}/structures`
#[derive(Debug, Clone, Deserialize)]
pub struct StructureList {
    pub structures: Option<Vec<RawStructure>>,
}

/// Body of `POST enterprises/{p}/devices/{id}:executeCommand`
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest<'a> {
    pub command: &'a str,
    pub params: Value,
}

/// Successful OAuth token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// OAuth token endpoint error body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
