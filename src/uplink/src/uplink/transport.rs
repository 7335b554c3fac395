use crate::error::UplinkError;
use crate::manifest::Manifest;
use async_trait::async_trait;
use std::time::Duration;

/// Parameters for one remote metadata request
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Sent as `If-None-Match`
    pub etag: Option<String>,
    /// Overrides the uplink's configured timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResponse {
    Modified {
        manifest: Manifest,
        etag: Option<String>,
    },
    NotModified,
}

/// Network access to one upstream registry
#[async_trait]
pub trait RemoteMetadata: Send + Sync {
    /// Fetch the remote manifest for `name`
    async fn fetch_remote_metadata(
        &self,
        name: &str,
        request: &FetchRequest,
    ) -> std::result::Result<RemoteResponse, UplinkError>;
}
