//! HTTP gateway to the vendor owner API.
//!
//! Performs no triage beyond transport failures: every HTTP response is
//! returned as status plus body for the dispatcher to classify.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use voltbridge_core::ports::{AccessTokenProvider, ApiResponse, GatewayError, VehicleApi};
use voltbridge_core::CommandName;
use voltbridge_domain::VehicleHandle;

use super::catalog::{self, HttpMethod};

/// Configuration for the vehicle gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the owner API
    pub base_url: String,
    /// Timeout for API requests; the vehicle can take tens of seconds to
    /// relay a command while drowsy
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://owner-api.teslamotors.com".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Gateway implementing [`VehicleApi`] over reqwest.
pub struct VehicleGateway {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    config: GatewayConfig,
}

impl VehicleGateway {
    /// Create a gateway.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: GatewayConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, tokens, config })
    }

    #[instrument(skip(self, body), fields(path = %path))]
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, GatewayError> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(url = %url, "owner API request");

        let token = self.tokens.access_token().await.unwrap_or_default();

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.config.timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to read body: {e}")))?;

        debug!(status, bytes = body.len(), "owner API response");
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl VehicleApi for VehicleGateway {
    async fn list_vehicles(&self) -> Result<ApiResponse, GatewayError> {
        self.request(Method::GET, "/api/1/vehicles", None).await
    }

    async fn wake(&self, vehicle: &VehicleHandle) -> Result<ApiResponse, GatewayError> {
        let path = format!("/api/1/vehicles/{}/wake_up", vehicle.id);
        self.request(Method::POST, &path, None).await
    }

    async fn is_awake(&self, vehicle: &VehicleHandle) -> Result<bool, GatewayError> {
        let path = format!("/api/1/vehicles/{}", vehicle.id);
        let response = self.request(Method::GET, &path, None).await?;

        if response.status != 200 {
            warn!(status = response.status, "awake probe returned non-200");
            return Ok(false);
        }

        let state = response
            .json()
            .and_then(|v| v["response"]["state"].as_str().map(str::to_string));
        Ok(state.as_deref() == Some("online"))
    }

    async fn execute(
        &self,
        vehicle: &VehicleHandle,
        name: CommandName,
        params: Option<&Value>,
    ) -> Result<ApiResponse, GatewayError> {
        let (method, path) = catalog::endpoint(name, &vehicle.id);
        let body = catalog::payload(name, params);

        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        self.request(method, &path, body.as_ref()).await
    }
}
