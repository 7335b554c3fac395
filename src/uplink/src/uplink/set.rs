use crate::config::{Config, UplinkConfig};
use crate::error::Result;
use crate::uplink::client::UplinkClient;
use crate::uplink::transport::RemoteMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// One configured uplink: its policy plus the transport that reaches it
#[derive(Clone)]
pub struct Uplink {
    pub config: UplinkConfig,
    pub transport: Arc<dyn RemoteMetadata>,
}

impl Uplink {
    pub fn upname(&self) -> &str {
        &self.config.name
    }
}

impl std::fmt::Debug for Uplink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uplink")
            .field("upname", &self.config.name)
            .field("url", &self.config.url)
            .finish()
    }
}

/// Consecutive-failure tracking for one uplink
#[derive(Debug, Clone, Default)]
pub struct UplinkHealth {
    pub failed_requests: u32,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
}

impl UplinkHealth {
    pub fn record_success(&mut self) {
        self.failed_requests = 0;
        self.last_success = Some(Instant::now());
    }

    pub fn record_failure(&mut self) {
        self.failed_requests = self.failed_requests.saturating_add(1);
        self.last_failure = Some(Instant::now());
    }

    /// An uplink that reached `max_fails` stays offline until `fail_timeout`
    /// has passed since its last failure; then one probe is let through.
    pub fn is_offline(&self, config: &UplinkConfig) -> bool {
        if config.max_fails == 0 || self.failed_requests < config.max_fails {
            return false;
        }
        match (self.last_failure, config.fail_timeout.as_duration()) {
            (Some(at), Some(window)) => at.elapsed() < window,
            _ => false,
        }
    }
}

/// Ordered collection of uplinks, in configuration order. The set itself is
/// fixed once built; only health counters change.
#[derive(Debug, Default)]
pub struct UplinkSet {
    uplinks: Vec<Uplink>,
    health: Arc<RwLock<HashMap<String, UplinkHealth>>>,
}

impl UplinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one HTTP client per configured uplink
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut set = Self::new();
        for uplink_config in &config.uplinks {
            let client = Arc::new(UplinkClient::new(uplink_config)?);
            tracing::info!(
                upname = %uplink_config.name,
                url = %uplink_config.url,
                proxy = ?uplink_config.proxy,
                "Configured uplink"
            );
            set = set.with_transport(uplink_config.clone(), client);
        }
        Ok(set)
    }

    /// Append an uplink with a custom transport
    pub fn with_transport(mut self, config: UplinkConfig, transport: Arc<dyn RemoteMetadata>) -> Self {
        self.uplinks.push(Uplink { config, transport });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uplink> {
        self.uplinks.iter()
    }

    pub fn len(&self) -> usize {
        self.uplinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uplinks.is_empty()
    }

    pub fn get(&self, upname: &str) -> Option<&Uplink> {
        self.uplinks.iter().find(|u| u.upname() == upname)
    }

    pub async fn is_offline(&self, uplink: &Uplink) -> bool {
        let health = self.health.read().await;
        health
            .get(uplink.upname())
            .map(|h| h.is_offline(&uplink.config))
            .unwrap_or(false)
    }

    pub async fn record_success(&self, upname: &str) {
        let mut health = self.health.write().await;
        health.entry(upname.to_string()).or_default().record_success();
    }

    pub async fn record_failure(&self, upname: &str) {
        let mut health = self.health.write().await;
        let entry = health.entry(upname.to_string()).or_default();
        entry.record_failure();
        tracing::debug!(
            upname = %upname,
            failed_requests = entry.failed_requests,
            "Uplink failure recorded"
        );
    }

    pub async fn health(&self, upname: &str) -> Option<UplinkHealth> {
        let health = self.health.read().await;
        health.get(upname).cloned()
    }
}
