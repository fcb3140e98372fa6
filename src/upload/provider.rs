//! Hosting gateway client
//!
//! The gateway fronts two hosting accounts ("regular" and "premium")
//! behind one HTTP endpoint. A dual upload is a single call; the
//! gateway fans the file out and reports one result per account.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::core::config;
use crate::core::retry::Retryable;

/// One of the two hosting accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Regular,
    Premium,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Regular => "regular",
            ProviderKind::Premium => "premium",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account outcome of an upload call
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider: ProviderKind,
    pub success: bool,
    /// Host-assigned file code on success
    pub file_code: Option<String>,
    /// Provider error text on failure
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn ok(provider: ProviderKind, file_code: impl Into<String>) -> Self {
        Self {
            provider,
            success: true,
            file_code: Some(file_code.into()),
            error: None,
        }
    }

    pub fn err(provider: ProviderKind, error: impl Into<String>) -> Self {
        Self {
            provider,
            success: false,
            file_code: None,
            error: Some(error.into()),
        }
    }
}

/// Combined outcome of a dual upload call
#[derive(Debug, Clone)]
pub struct DualOutcome {
    pub regular: ProviderResult,
    pub premium: ProviderResult,
}

impl DualOutcome {
    pub fn both_succeeded(&self) -> bool {
        self.regular.success && self.premium.success
    }

    pub fn any_succeeded(&self) -> bool {
        self.regular.success || self.premium.success
    }
}

/// Everything the gateway needs to fetch and store one file
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Telegram file_id the gateway pulls the bytes from
    pub file_id: String,
    /// Collision-resistant name to store the file under
    pub remote_filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub duration: i64,
}

/// Gateway call failures (call-level, before per-account results exist)
#[derive(Debug, Error)]
pub enum HostError {
    /// Transport-level failure
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx HTTP response
    #[error("Gateway returned status {0}")]
    Status(reqwest::StatusCode),

    /// 2xx response with success=false
    #[error("Gateway rejected the call: {0}")]
    Gateway(String),
}

impl Retryable for HostError {
    fn is_retryable(&self) -> bool {
        match self {
            HostError::Request(_) => true,
            HostError::Status(status) => status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            HostError::Gateway(_) => true,
        }
    }
}

/// Abstraction over the hosting gateway, mockable in tests
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Uploads to both accounts in one call
    async fn upload_dual(&self, request: &UploadRequest) -> Result<DualOutcome, HostError>;

    /// Uploads to a single account (admin-triggered retries)
    async fn upload_single(&self, provider: ProviderKind, request: &UploadRequest) -> Result<ProviderResult, HostError>;

    /// Asks the gateway to re-sync its catalog; returns the entry count
    async fn sync_catalog(&self) -> Result<u64, HostError>;
}

/// Per-account result as the gateway reports it
#[derive(Debug, Deserialize)]
struct WireResult {
    success: bool,
    file_code: Option<String>,
    error: Option<String>,
}

impl WireResult {
    fn into_provider_result(self, provider: ProviderKind) -> ProviderResult {
        ProviderResult {
            provider,
            success: self.success,
            file_code: self.file_code,
            error: self.error,
        }
    }
}

/// Top-level gateway response envelope
#[derive(Debug, Deserialize)]
struct WireResponse {
    success: bool,
    error: Option<String>,
    regular_result: Option<WireResult>,
    premium_result: Option<WireResult>,
    result: Option<WireResult>,
    synced: Option<u64>,
}

fn missing_side(provider: ProviderKind) -> ProviderResult {
    ProviderResult::err(provider, "gateway returned no result for this account")
}

/// Production gateway client
pub struct HostClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    premium_api_key: String,
}

impl HostClient {
    pub fn new(base_url: String, api_key: String, premium_api_key: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config::network::timeout()).build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            premium_api_key,
        })
    }

    /// Builds a client from HOST_GATEWAY_URL / HOST_API_KEY / HOST_PREMIUM_API_KEY
    pub fn from_env() -> Result<Self, reqwest::Error> {
        Self::new(
            config::HOST_GATEWAY_URL.clone(),
            config::HOST_API_KEY.clone(),
            config::HOST_PREMIUM_API_KEY.clone(),
        )
    }

    async fn call(&self, body: serde_json::Value) -> Result<WireResponse, HostError> {
        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("x-premium-api-key", &self.premium_api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Status(status));
        }

        let parsed: WireResponse = response.json().await?;
        if !parsed.success {
            return Err(HostError::Gateway(
                parsed.error.unwrap_or_else(|| "no error detail".to_string()),
            ));
        }
        Ok(parsed)
    }

    fn file_body(request: &UploadRequest) -> serde_json::Value {
        json!({
            "file_id": request.file_id,
            "remote_filename": request.remote_filename,
            "original_filename": request.original_filename,
            "file_size": request.file_size,
            "mime_type": request.mime_type,
            "duration": request.duration,
        })
    }
}

#[async_trait]
impl VideoHost for HostClient {
    async fn upload_dual(&self, request: &UploadRequest) -> Result<DualOutcome, HostError> {
        let body = json!({
            "action": "upload_dual",
            "file": Self::file_body(request),
        });
        let parsed = self.call(body).await?;

        Ok(DualOutcome {
            regular: parsed
                .regular_result
                .map(|r| r.into_provider_result(ProviderKind::Regular))
                .unwrap_or_else(|| missing_side(ProviderKind::Regular)),
            premium: parsed
                .premium_result
                .map(|r| r.into_provider_result(ProviderKind::Premium))
                .unwrap_or_else(|| missing_side(ProviderKind::Premium)),
        })
    }

    async fn upload_single(
        &self,
        provider: ProviderKind,
        request: &UploadRequest,
    ) -> Result<ProviderResult, HostError> {
        let body = json!({
            "action": "upload_single",
            "provider": provider.as_str(),
            "file": Self::file_body(request),
        });
        let parsed = self.call(body).await?;

        Ok(parsed
            .result
            .map(|r| r.into_provider_result(provider))
            .unwrap_or_else(|| missing_side(provider)))
    }

    async fn sync_catalog(&self) -> Result<u64, HostError> {
        let parsed = self.call(json!({ "action": "sync_catalog" })).await?;
        Ok(parsed.synced.unwrap_or(0))
    }
}
