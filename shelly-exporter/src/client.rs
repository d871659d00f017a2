//! HTTP client for the Shelly Gen2 RPC API.

use std::time::Duration;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{DeviceError, Result, TargetError};
use crate::model::{
    CHANNELS, DeviceInfo, DeviceSnapshot, InputStatus, SwitchStatus, SysStatus, Target,
};

/// Time allowed to establish a connection to a device.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time allowed for each read from a device connection.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for fetching the status documents of Shelly devices.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ShellyClient {
    http: reqwest::Client,
}

impl ShellyClient {
    /// Create a client with the fixed connect/read timeouts.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(DeviceError::Client)?;

        Ok(Self { http })
    }

    /// Fetch every document the renderer needs from one device.
    ///
    /// The six RPC calls run concurrently; the first failure aborts the
    /// whole target. There are no retries. Channel documents are keyed by
    /// the channel that was requested, whatever `id` the device reports.
    pub async fn fetch(&self, target: &Target) -> std::result::Result<DeviceSnapshot, TargetError> {
        let result = tokio::try_join!(
            try_join_all(CHANNELS.iter().map(|&id| async move {
                let mut status: SwitchStatus =
                    self.get(target, "Switch.GetStatus", Some(id)).await?;
                status.id = id;
                Ok::<_, DeviceError>(status)
            })),
            try_join_all(CHANNELS.iter().map(|&id| async move {
                let mut status: InputStatus = self.get(target, "Input.GetStatus", Some(id)).await?;
                status.id = id;
                Ok::<_, DeviceError>(status)
            })),
            self.get::<SysStatus>(target, "Sys.GetStatus", None),
            self.get::<DeviceInfo>(target, "Shelly.GetDeviceInfo", None),
        );

        let (switches, inputs, sys, info) =
            result.map_err(|e| TargetError::new(target.clone(), e))?;

        Ok(DeviceSnapshot {
            switches,
            inputs,
            sys,
            info,
        })
    }

    /// Call one RPC method and decode its JSON response.
    async fn get<T: DeserializeOwned>(
        &self,
        target: &Target,
        method: &str,
        id: Option<u8>,
    ) -> Result<T> {
        let endpoint = rpc_url(target, method, id);
        debug!(endpoint = %endpoint, "Calling device RPC");

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| DeviceError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let body = response
            .bytes()
            .await
            .map_err(|source| DeviceError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| DeviceError::Decode { endpoint, source })
    }
}

/// Build the URL of an RPC method on a target.
pub fn rpc_url(target: &Target, method: &str, id: Option<u8>) -> String {
    match id {
        Some(id) => format!("http://{}/rpc/{}?id={}", target, method, id),
        None => format!("http://{}/rpc/{}", target, method),
    }
}
