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

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::client::SdmClient;
use nest_core::{DeviceCommand, DeviceSource, NestResult, RawDevice, RawStructure};

/// SDM adapter implementing `DeviceSource`
pub struct SdmDeviceSource {
    client: Arc<SdmClient>,
}

impl SdmDeviceSource {
    pub fn new(client: Arc<SdmClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<SdmClient> {
        &self.client
    }
}

#[async_trait]
impl DeviceSource for SdmDeviceSource {
    async fn list_devices(&self) -> NestResult<Vec<RawDevice>> {
        Ok(self.client.list_devices().await?)
    }

    async fn get_device(&self, device_id: &str) -> NestResult<RawDevice> {
        let device = self.client.get_device(device_id).await?;
        debug!(device = %device_id, traits = device.traits.len(), "Fetched device");
        Ok(device)
    }

    async fn list_structures(&self) -> NestResult<Vec<RawStructure>> {
        Ok(self.client.list_structures().await?)
    }

    async fn execute_command(&self, device_id: &str, command: &DeviceCommand) -> NestResult<()> {
        Ok(self.client.execute_command(device_id, command).await?)
    }

    fn name(&self) -> &str {
        "Nest SDM"
    }
}
