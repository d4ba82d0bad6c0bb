//! Remote authorization source
//!
//! The management API exposes a cheap version hash endpoint and a full data
//! endpoint. Every request authenticates with basic auth, username `api` and
//! the configured API key as password.

use crate::auth::decision::Verdict;
use crate::auth::snapshot::Snapshot;
use crate::config::{EndpointFlavour, PayloadFormat, RemoteConfig, SyncConfig};
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use std::io::Read;
use tracing::debug;

/// Basic auth username expected by the management API
pub const API_USERNAME: &str = "api";

/// Source of authorization snapshots
#[async_trait]
pub trait AuthSource: Send + Sync {
    /// Current opaque version hash
    async fn fetch_version(&self) -> Result<String>;

    /// Full snapshot; `version` is the hash it will be published under
    async fn fetch_snapshot(&self, version: &str) -> Result<Snapshot>;

    /// Master password from a dedicated endpoint
    ///
    /// `Ok(None)` means the source has no such endpoint. A returned password
    /// replaces the one carried in the snapshot payload.
    async fn fetch_master_password(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Per-attempt remote login check
#[async_trait]
pub trait LoginChecker: Send + Sync {
    async fn check_login(&self, proxy_ip: &str, credentials: &str, remote_ip: &str)
        -> Result<Verdict>;
}

/// Decompress a gzip body
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AuthError::decode(format!("Failed to decompress auth payload: {}", e)))?;
    Ok(out)
}

/// Management API client
#[derive(Debug, Clone)]
pub struct HttpAuthSource {
    client: Client,
    remote: RemoteConfig,
    flavour: EndpointFlavour,
    format: PayloadFormat,
    master_password_endpoint: bool,
}

impl HttpAuthSource {
    pub fn new(remote: RemoteConfig, sync: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(sync.request_timeout())
            .user_agent(concat!("proxyauth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            remote,
            flavour: sync.endpoint_flavour,
            format: sync.payload_format,
            master_password_endpoint: sync.uses_master_password_endpoint(),
        })
    }

    pub fn hash_url(&self) -> String {
        self.remote.server_endpoint(self.flavour.hash_path())
    }

    pub fn data_url(&self) -> String {
        self.remote.server_endpoint(self.flavour.data_path())
    }

    pub fn master_password_url(&self) -> String {
        self.remote.endpoint("master_password/get")
    }

    pub fn check_login_url(&self) -> String {
        self.remote.server_endpoint("check_login")
    }

    async fn get_ok(&self, url: &str) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .basic_auth(API_USERNAME, Some(self.remote.api_key()))
            .send()
            .await
            .map_err(|e| AuthError::source_unavailable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::source_unavailable(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        Ok(response)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_ok(url).await?;
        let bytes = response.bytes().await.map_err(|e| {
            AuthError::source_unavailable(format!("Reading body of {} failed: {}", url, e))
        })?;
        Ok(bytes.to_vec())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get_bytes(url).await?;
        String::from_utf8(bytes)
            .map_err(|e| AuthError::decode(format!("Body of {} is not UTF-8: {}", url, e)))
    }
}

#[async_trait]
impl AuthSource for HttpAuthSource {
    async fn fetch_version(&self) -> Result<String> {
        let version = self.get_text(&self.hash_url()).await?.trim().to_string();
        if version.is_empty() {
            return Err(AuthError::source_unavailable("Empty auth hash"));
        }
        Ok(version)
    }

    async fn fetch_snapshot(&self, version: &str) -> Result<Snapshot> {
        match self.format {
            PayloadFormat::Json => {
                let compressed = self.get_bytes(&self.data_url()).await?;
                let raw = gunzip(&compressed)?;
                Snapshot::from_json(version, &raw)
            }
            PayloadFormat::Legacy => {
                let text = self.get_text(&self.data_url()).await?;
                Snapshot::from_legacy_blocks(version, &text)
            }
        }
    }

    async fn fetch_master_password(&self) -> Result<Option<String>> {
        if !self.master_password_endpoint {
            return Ok(None);
        }
        let password = self.get_text(&self.master_password_url()).await?;
        Ok(Some(password.trim().to_string()))
    }
}

#[async_trait]
impl LoginChecker for HttpAuthSource {
    async fn check_login(
        &self,
        proxy_ip: &str,
        credentials: &str,
        remote_ip: &str,
    ) -> Result<Verdict> {
        let url = self.check_login_url();
        let response = self
            .client
            .get(&url)
            .basic_auth(API_USERNAME, Some(self.remote.api_key()))
            .query(&[
                ("proxy_ip", proxy_ip),
                ("credentials", credentials),
                ("remote_ip", remote_ip),
            ])
            .send()
            .await
            .map_err(|e| AuthError::source_unavailable(format!("GET {} failed: {}", url, e)))?;

        match response.status() {
            StatusCode::OK => Ok(Verdict::Allow),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Ok(Verdict::Deny)
            }
            status => Err(AuthError::source_unavailable(format!(
                "GET {} returned {}",
                url, status
            ))),
        }
    }
}
