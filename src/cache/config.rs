//! Cache configuration
//!
//! TTLs for the metadata and quota caches and the policy that picks a cache
//! stack for a provider.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Default TTL for metadata entries: 10 seconds
pub const DEFAULT_METADATA_TTL_SECS: u64 = 10;

/// Default TTL for quota entries: 10 seconds
pub const DEFAULT_QUOTA_TTL_SECS: u64 = 10;

/// Which cache stack wraps a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackSelection {
    /// Follow the provider's `caching_capability()`
    #[default]
    Auto,
    /// Always use single-flight coalescing plus the quota TTL cache
    Coalescing,
    /// Always use the TTL metadata cache
    Metadata,
}

/// Cache layer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub metadata_ttl_secs: u64,
    pub quota_ttl_secs: u64,
    pub stack: StackSelection,
    /// Sub-second override for the metadata TTL, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_ttl_millis: Option<u64>,
    /// Sub-second override for the quota TTL, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_ttl_millis: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: DEFAULT_METADATA_TTL_SECS,
            quota_ttl_secs: DEFAULT_QUOTA_TTL_SECS,
            stack: StackSelection::Auto,
            metadata_ttl_millis: None,
            quota_ttl_millis: None,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CacheConfig =
            serde_json::from_str(json).context("Failed to parse cache configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache configuration: {:?}", path))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid cache configuration in {:?}", path))
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl_secs = ttl.as_secs();
        self.metadata_ttl_millis = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_quota_ttl(mut self, ttl: Duration) -> Self {
        self.quota_ttl_secs = ttl.as_secs();
        self.quota_ttl_millis = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_stack(mut self, stack: StackSelection) -> Self {
        self.stack = stack;
        self
    }

    pub fn metadata_ttl(&self) -> Duration {
        self.metadata_ttl_millis
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(self.metadata_ttl_secs))
    }

    pub fn quota_ttl(&self) -> Duration {
        self.quota_ttl_millis
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(self.quota_ttl_secs))
    }

    /// Reject TTLs of zero, which would disable caching without saying so
    pub fn validate(&self) -> Result<()> {
        if self.metadata_ttl().is_zero() {
            bail!("metadata TTL must be greater than zero");
        }
        if self.quota_ttl().is_zero() {
            bail!("quota TTL must be greater than zero");
        }
        Ok(())
    }
}
