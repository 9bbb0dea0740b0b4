use std::time::Duration;

use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use shared_config::AppConfig;

/// Transport-level outcome of a failed call to the clinic API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

/// Thin JSON-over-HTTP client for the remote appointment service.
#[derive(Clone)]
pub struct ClinicApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ClinicApiClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.clinic_api_timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.clinic_api_url.trim_end_matches('/').to_string(),
            api_key: config.clinic_api_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !self.api_key.is_empty() {
            match HeaderValue::from_str(&self.api_key) {
                Ok(value) => {
                    headers.insert("apikey", value);
                }
                Err(_) => warn!("CLINIC_API_KEY contains invalid header characters, skipping"),
            }
        }

        headers
    }

    fn build(&self, method: Method, path: &str, body: Option<Value>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers());

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        req
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let response = req
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response)
    }

    /// Issue a request and decode the JSON body.
    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.build(method, path, body)).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// Issue a request whose body is an acknowledgement only.
    pub async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<(), RemoteError> {
        self.send(self.build(method, path, body)).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
