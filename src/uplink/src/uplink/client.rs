use crate::config::UplinkConfig;
use crate::error::{RegistryError, Result, UplinkError};
use crate::manifest::Manifest;
use crate::uplink::transport::{FetchRequest, RemoteMetadata, RemoteResponse};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Accept header for package metadata requests
pub const METADATA_ACCEPT_HEADER: &str = "application/json;q=0.9, */*;q=0.8";

/// HTTP client for one uplink registry
pub struct UplinkClient {
    client: Client,
    base_url: String,
    upname: String,
    timeout: Duration,
}

impl UplinkClient {
    pub fn new(config: &UplinkConfig) -> Result<Self> {
        let timeout = config.request_timeout();

        let mut client_builder = reqwest::Client::builder()
            .user_agent(concat!("uplink/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)));

        // Proxy routing is decided upstream of this crate
        client_builder = match &config.proxy {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                    RegistryError::Config(format!(
                        "Invalid proxy for uplink {}: {}",
                        config.name, e
                    ))
                })?;
                client_builder.proxy(proxy)
            }
            None => client_builder.no_proxy(),
        };

        let client = client_builder.build().map_err(RegistryError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            upname: config.name.clone(),
            timeout,
        })
    }

    pub fn upname(&self) -> &str {
        &self.upname
    }

    /// Metadata URL for a package; scoped names keep the `@` and escape the slash
    pub fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }
}

#[async_trait]
impl RemoteMetadata for UplinkClient {
    async fn fetch_remote_metadata(
        &self,
        name: &str,
        request: &FetchRequest,
    ) -> std::result::Result<RemoteResponse, UplinkError> {
        let url = self.package_url(name);
        let mut builder = self
            .client
            .get(&url)
            .header("Accept", METADATA_ACCEPT_HEADER)
            .timeout(request.timeout.unwrap_or(self.timeout));
        if let Some(etag) = &request.etag {
            builder = builder.header("If-None-Match", etag);
        }

        tracing::debug!(upname = %self.upname, url = %url, etag = ?request.etag, "Requesting remote metadata");

        let response = builder.send().await.map_err(UplinkError::from)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(upname = %self.upname, package = %name, "Uplink replied not modified");
            return Ok(RemoteResponse::NotModified);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(UplinkError::NotFound);
        }
        if !status.is_success() {
            return Err(UplinkError::Status(status.as_u16()));
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await.map_err(UplinkError::from)?;
        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| UplinkError::Malformed(e.to_string()))?;

        tracing::debug!(
            upname = %self.upname,
            package = %name,
            status = %status,
            versions = manifest.versions.len(),
            "Remote metadata received"
        );

        Ok(RemoteResponse::Modified { manifest, etag })
    }
}
