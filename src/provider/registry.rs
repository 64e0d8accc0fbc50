//! Central registry for provider adapters
//!
//! Adapters are registered as factories and instantiated lazily on first use;
//! the cached instance is shared by every concurrent task afterwards.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::provider::adapter::Provider;
use crate::provider::model::{Capability, MediaType, ProviderModel};

/// Builds one adapter instance on demand
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn Provider>> + Send + Sync>;

/// Registry entry for one provider
struct ProviderEntry {
    name: String,
    display_name: String,
    media_type: MediaType,
    /// Lower = higher priority
    priority: i32,
    enabled: bool,
    factory: ProviderFactory,
    instance: RwLock<Option<Arc<dyn Provider>>>,
}

/// Serializable snapshot of a registered provider, for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub display_name: String,
    pub media_type: MediaType,
    pub priority: i32,
    pub enabled: bool,
    pub available: bool,
    pub models: Vec<ProviderModel>,
}

/// Central registry for all provider adapters
#[derive(Default)]
pub struct ProviderRegistry {
    image_providers: DashMap<String, ProviderEntry>,
    video_providers: DashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image_provider(
        &self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        priority: i32,
        enabled: bool,
        factory: ProviderFactory,
    ) {
        let name = name.into();
        info!(provider = %name, priority, "Registered image provider");
        self.image_providers.insert(
            name.clone(),
            ProviderEntry {
                name,
                display_name: display_name.into(),
                media_type: MediaType::Image,
                priority,
                enabled,
                factory,
                instance: RwLock::new(None),
            },
        );
    }

    pub fn register_video_provider(
        &self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        priority: i32,
        enabled: bool,
        factory: ProviderFactory,
    ) {
        let name = name.into();
        info!(provider = %name, priority, "Registered video provider");
        self.video_providers.insert(
            name.clone(),
            ProviderEntry {
                name,
                display_name: display_name.into(),
                media_type: MediaType::Video,
                priority,
                enabled,
                factory,
                instance: RwLock::new(None),
            },
        );
    }

    fn map_for(&self, media_type: MediaType) -> &DashMap<String, ProviderEntry> {
        match media_type {
            MediaType::Image => &self.image_providers,
            MediaType::Video => &self.video_providers,
        }
    }

    /// Get a provider instance, instantiating and caching on first use
    pub fn get_provider(&self, name: &str, media_type: MediaType) -> Option<Arc<dyn Provider>> {
        let entry = self.map_for(media_type).get(name)?;
        if !entry.enabled {
            warn!(provider = %name, "Provider is disabled");
            return None;
        }

        if let Some(instance) = entry.instance.read().as_ref() {
            return Some(instance.clone());
        }

        let mut slot = entry.instance.write();
        // Another task may have won the instantiation race
        if let Some(instance) = slot.as_ref() {
            return Some(instance.clone());
        }
        match (entry.factory)() {
            Ok(instance) => {
                debug!(provider = %name, "Instantiated provider");
                *slot = Some(instance.clone());
                Some(instance)
            }
            Err(e) => {
                error!(provider = %name, error = %e, "Failed to instantiate provider");
                None
            }
        }
    }

    pub fn get_image_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.get_provider(name, MediaType::Image)
    }

    pub fn get_video_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.get_provider(name, MediaType::Video)
    }

    /// All enabled, available providers for a media type, priority order
    pub fn available_providers(&self, media_type: MediaType) -> Vec<Arc<dyn Provider>> {
        let mut names: Vec<(i32, String)> = self
            .map_for(media_type)
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.priority, e.name.clone()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        names
            .into_iter()
            .filter_map(|(_, name)| self.get_provider(&name, media_type))
            .filter(|p| p.is_available())
            .collect()
    }

    /// Providers whose models support a capability, priority order
    pub fn providers_by_capability(
        &self,
        capability: Capability,
        media_type: MediaType,
    ) -> Vec<Arc<dyn Provider>> {
        self.available_providers(media_type)
            .into_iter()
            .filter(|p| p.models().iter().any(|m| m.supports_capability(capability)))
            .collect()
    }

    /// All models across providers supporting a capability, best quality first
    pub fn models_by_capability(
        &self,
        capability: Capability,
        media_type: MediaType,
    ) -> Vec<ProviderModel> {
        let mut models: Vec<ProviderModel> = self
            .available_providers(media_type)
            .iter()
            .flat_map(|p| p.models())
            .filter(|m| m.supports_capability(capability))
            .collect();
        models.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        models
    }

    pub fn provider_names(&self, media_type: MediaType) -> Vec<String> {
        self.map_for(media_type)
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.image_providers.contains_key(name) || self.video_providers.contains_key(name)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut found = false;
        for map in [&self.image_providers, &self.video_providers] {
            if let Some(mut entry) = map.get_mut(name) {
                entry.enabled = enabled;
                found = true;
            }
        }
        found
    }

    /// Drop the cached instance, forcing re-instantiation on next use
    pub fn invalidate(&self, name: &str) -> bool {
        let mut found = false;
        for map in [&self.image_providers, &self.video_providers] {
            if let Some(entry) = map.get(name) {
                *entry.instance.write() = None;
                found = true;
            }
        }
        found
    }

    fn entry_info(&self, entry: &ProviderEntry) -> ProviderInfo {
        let provider = if entry.enabled {
            self.get_provider(&entry.name, entry.media_type)
        } else {
            None
        };
        ProviderInfo {
            name: entry.name.clone(),
            display_name: entry.display_name.clone(),
            media_type: entry.media_type,
            priority: entry.priority,
            enabled: entry.enabled,
            available: provider.as_ref().map(|p| p.is_available()).unwrap_or(false),
            models: provider.map(|p| p.models()).unwrap_or_default(),
        }
    }

    pub fn provider_info(&self, name: &str) -> Option<ProviderInfo> {
        self.image_providers
            .get(name)
            .map(|e| self.entry_info(&e))
            .or_else(|| self.video_providers.get(name).map(|e| self.entry_info(&e)))
    }

    /// Snapshot of every registered provider
    pub fn list_all(&self) -> Vec<ProviderInfo> {
        let mut infos: Vec<ProviderInfo> = self
            .image_providers
            .iter()
            .map(|e| self.entry_info(&e))
            .chain(self.video_providers.iter().map(|e| self.entry_info(&e)))
            .collect();
        infos.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        infos
    }

    /// Remove every registration (mainly for tests)
    pub fn clear(&self) {
        self.image_providers.clear();
        self.video_providers.clear();
    }
}
