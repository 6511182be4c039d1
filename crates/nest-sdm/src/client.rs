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

use crate::auth::TokenProvider;
use crate::errors::{SdmError, SdmResult};
use crate::types::{CommandRequest, DeviceList, StructureList};
use nest_core::{DeviceCommand, RawDevice, RawStructure};
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://smartdevicemanagement.googleapis.com/v1";

/// Smart Device Management REST client
#[derive(Clone)]
pub struct SdmClient {
    base_url: String,
    project_id: String,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
    max_retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for SdmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdmClient")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl SdmClient {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> SdmResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdmError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let project_id = project_id.into();
        info!(base_url = %base_url, project_id = %project_id, "Initializing SDM client");

        Ok(Self {
            base_url,
            project_id,
            client,
            tokens,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the transport retry policy
    #[must_use]
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn enterprise_url(&self) -> String {
        format!("{}/enterprises/{}", self.base_url, self.project_id)
    }

    /// All devices visible to the project
    pub async fn list_devices(&self) -> SdmResult<Vec<RawDevice>> {
        let url = format!("{}/devices", self.enterprise_url());
        debug!(url = %url, "Listing devices");

        let response = self.get(&url, None).await?;
        let list = response.json::<DeviceList>().await?;
        let devices = list.devices.ok_or_else(|| {
            SdmError::InvalidResponse("device list response has no 'devices' key".to_owned())
        })?;

        info!(count = devices.len(), "Listed devices");
        Ok(devices)
    }

    /// Single device by its trailing id
    pub async fn get_device(&self, device_id: &str) -> SdmResult<RawDevice> {
        let url = format!("{}/devices/{device_id}", self.enterprise_url());
        debug!(device = %device_id, "Fetching device");

        let response = self.get(&url, Some(device_id)).await?;
        Ok(response.json::<RawDevice>().await?)
    }

    /// All structures visible to the project; an absent key means none
    pub async fn list_structures(&self) -> SdmResult<Vec<RawStructure>> {
        let url = format!("{}/structures", self.enterprise_url());
        debug!(url = %url, "Listing structures");

        let response = self.get(&url, None).await?;
        let list = response.json::<StructureList>().await?;
        Ok(list.structures.unwrap_or_default())
    }

    pub async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> SdmResult<()> {
        let url = format!(
            "{}/devices/{device_id}:executeCommand",
            self.enterprise_url()
        );
        let body = CommandRequest {
            command: command.name(),
            params: command.params(),
        };
        info!(device = %device_id, command = %body.command, "Executing device command");

        let response = self
            .retry_request(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&body)
                    .send()
            })
            .await?;
        Self::check_status(response, Some(device_id)).await?;
        Ok(())
    }

    async fn get(&self, url: &str, device_id: Option<&str>) -> SdmResult<Response> {
        let response = self
            .retry_request(|token| self.client.get(url).bearer_auth(token).send())
            .await?;
        Self::check_status(response, device_id).await
    }

    async fn check_status(response: Response, device_id: Option<&str>) -> SdmResult<Response> {
        match (response.status(), device_id) {
            (status, _) if status.is_success() => Ok(response),
            (StatusCode::NOT_FOUND, Some(id)) => {
                error!(device = %id, "Device not found");
                Err(SdmError::DeviceNotFound(id.to_owned()))
            }
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                let message = response.text().await.unwrap_or_default();
                error!(message = %message, "SDM rejected credentials");
                Err(SdmError::AuthenticationFailed(message))
            }
            (status, _) => {
                let message = response.text().await.unwrap_or_default();
                error!(status = status.as_u16(), message = %message, "SDM request failed");
                Err(SdmError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Retry transport failures with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> SdmResult<Response>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            let token = self.tokens.access_token().await?;
            match request_fn(token).await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!(attempts, error = %e, "Request failed");
                    return Err(if e.is_timeout() {
                        SdmError::Timeout
                    } else {
                        SdmError::HttpError(e)
                    });
                }
                Err(e) => {
                    warn!(
                        attempt = attempts,
                        max = self.max_retries,
                        error = %e,
                        "Request failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}
