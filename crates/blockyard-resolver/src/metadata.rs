//! Plugin metadata store
//!
//! Records what each successful resolution produced. The daemon injects its
//! own store; the in-memory one backs tests and single-process use.

use crate::error::ResolveResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub plugin_id: String,
    pub version: String,
    pub sha256: String,
    pub provider: Option<String>,
    pub last_used_at: DateTime<Utc>,
}

#[async_trait]
pub trait PluginMetadataStore: Send + Sync {
    /// Insert or replace the record for the plugin id and version
    async fn record(&self, metadata: PluginMetadata) -> ResolveResult<()>;

    async fn get(&self, plugin_id: &str, version: &str) -> ResolveResult<Option<PluginMetadata>>;

    async fn list(&self) -> ResolveResult<Vec<PluginMetadata>>;
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<(String, String), PluginMetadata>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginMetadataStore for InMemoryMetadataStore {
    async fn record(&self, metadata: PluginMetadata) -> ResolveResult<()> {
        let key = (metadata.plugin_id.clone(), metadata.version.clone());
        self.records.write().await.insert(key, metadata);
        Ok(())
    }

    async fn get(&self, plugin_id: &str, version: &str) -> ResolveResult<Option<PluginMetadata>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(plugin_id.to_string(), version.to_string()))
            .cloned())
    }

    async fn list(&self) -> ResolveResult<Vec<PluginMetadata>> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| {
            a.plugin_id
                .cmp(&b.plugin_id)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(all)
    }
}
