//! HTTP implementation of the valve protocol

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, redirect};
use tracing::debug;

use super::{CLOSE_PATH, OPEN_PATH, ProtocolError, STATUS_PATH, StatusBody, ValveClient, ValveState};
use crate::config::DeviceConfig;

/// Valve client speaking plain HTTP to the device
///
/// Every request is bounded by a finite timeout so a half-open connection
/// cannot stall a run; idle connections are not pooled because the device
/// closes each one after responding. Redirects are not followed: one call is
/// one request, and only `200 OK` counts as an acknowledgement.
#[derive(Debug, Clone)]
pub struct HttpValveClient {
    http: Client,
}

impl HttpValveClient {
    /// Create a client with explicit timeouts
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ProtocolError> {
        debug!(?request_timeout, ?connect_timeout, "HttpValveClient::new: called");
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(0)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { http })
    }

    pub fn from_config(config: &DeviceConfig) -> Result<Self, ProtocolError> {
        Self::new(
            Duration::from_millis(config.request_timeout_ms),
            Duration::from_millis(config.connect_timeout_ms),
        )
    }

    async fn post_command(&self, address: &str, path: &'static str) -> Result<(), ProtocolError> {
        let url = device_url(address, path);
        debug!(%url, "post_command: sending");

        let response = self.http.post(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!(%url, status = status.as_u16(), "post_command: rejected");
            return Err(ProtocolError::Status {
                status: status.as_u16(),
                path,
            });
        }

        // Body is expected to be empty; reading it completes the exchange
        response.bytes().await?;
        debug!(%url, "post_command: accepted");
        Ok(())
    }
}

#[async_trait]
impl ValveClient for HttpValveClient {
    async fn send_open(&self, address: &str) -> Result<(), ProtocolError> {
        self.post_command(address, OPEN_PATH).await
    }

    async fn send_close(&self, address: &str) -> Result<(), ProtocolError> {
        self.post_command(address, CLOSE_PATH).await
    }

    async fn get_status(&self, address: &str) -> Result<ValveState, ProtocolError> {
        let url = device_url(address, STATUS_PATH);
        debug!(%url, "get_status: querying");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!(%url, status = status.as_u16(), "get_status: rejected");
            return Err(ProtocolError::Status {
                status: status.as_u16(),
                path: STATUS_PATH,
            });
        }

        let bytes = response.bytes().await?;
        let body: StatusBody = serde_json::from_slice(&bytes).map_err(|e| ProtocolError::MalformedBody {
            path: STATUS_PATH,
            message: e.to_string(),
        })?;
        debug!(state = %body.status, "get_status: parsed");
        Ok(body.status)
    }
}

/// Build a request URL from a device address
///
/// Bare addresses (`192.168.1.40`, `host:8080`) are taken as plain HTTP; an
/// address that already carries a scheme is used as the base URL.
pub fn device_url(address: &str, path: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        format!("{}{}", address, path)
    } else {
        format!("http://{}{}", address, path)
    }
}
