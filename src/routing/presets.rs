//! Quality preset tiers, legacy alias resolution, and the model catalog

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::provider::model::{MediaType, ProviderModel};
use crate::provider::registry::ProviderRegistry;

/// User-facing quality tier that maps to a concrete model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Premium,
    Balanced,
    Fast,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Premium => "premium",
            QualityPreset::Balanced => "balanced",
            QualityPreset::Fast => "fast",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QualityPreset::Premium => "Best quality, slower generation",
            QualityPreset::Balanced => "Good quality and speed",
            QualityPreset::Fast => "Fastest generation, good quality",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "premium" => Ok(QualityPreset::Premium),
            "balanced" => Ok(QualityPreset::Balanced),
            "fast" => Ok(QualityPreset::Fast),
            other => Err(format!("unknown quality preset: {}", other)),
        }
    }
}

/// Catalog entry for the model listing surface
#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub provider: String,
    pub model: ProviderModel,
}

/// Resolve a model id or legacy alias to its canonical (provider, model id).
///
/// Direct id matches win over alias matches. Unknown ids are returned
/// unchanged with no provider, letting the caller decide how to fail.
pub fn resolve_alias(registry: &ProviderRegistry, model_id: &str) -> (Option<String>, String) {
    let providers = registry.available_providers(MediaType::Image);

    for provider in &providers {
        for model in provider.models() {
            if model.id == model_id {
                return (Some(provider.name().to_string()), model.id);
            }
        }
    }
    for provider in &providers {
        for model in provider.models() {
            if model.matches_alias(model_id) {
                debug!(alias = %model_id, canonical = %model.id, "Resolved legacy model alias");
                return (Some(provider.name().to_string()), model.id);
            }
        }
    }
    (None, model_id.to_string())
}

/// Pick the best visible image model for a quality tier.
///
/// Candidates are filtered to `tier == preset` and sorted by arena score
/// descending. Cascade on no match: drop the preferred-provider restriction,
/// then fall back to the balanced tier.
pub fn select_model_by_preset(
    registry: &ProviderRegistry,
    preset: QualityPreset,
    preferred_provider: Option<&str>,
) -> Option<(String, String)> {
    let providers = registry.available_providers(MediaType::Image);

    let mut candidates: Vec<(String, ProviderModel)> = Vec::new();
    for provider in &providers {
        if let Some(preferred) = preferred_provider {
            if provider.name() != preferred {
                continue;
            }
        }
        for model in provider.models() {
            if model.hidden || model.media_type != MediaType::Image {
                continue;
            }
            if model.tier == Some(preset) {
                candidates.push((provider.name().to_string(), model));
            }
        }
    }

    if candidates.is_empty() {
        if preferred_provider.is_some() {
            return select_model_by_preset(registry, preset, None);
        }
        if preset != QualityPreset::Balanced {
            return select_model_by_preset(registry, QualityPreset::Balanced, None);
        }
        return None;
    }

    candidates.sort_by(|a, b| {
        let sa = a.1.arena_score.unwrap_or(0.0);
        let sb = b.1.arena_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    let (provider, model) = candidates.into_iter().next()?;
    Some((provider, model.id))
}

/// All image models across providers, arena score descending
pub fn all_models(registry: &ProviderRegistry, include_hidden: bool) -> Vec<ModelCatalogEntry> {
    let mut entries: Vec<ModelCatalogEntry> = registry
        .available_providers(MediaType::Image)
        .iter()
        .flat_map(|p| {
            let name = p.name().to_string();
            p.models()
                .into_iter()
                .map(move |m| ModelCatalogEntry {
                    provider: name.clone(),
                    model: m,
                })
        })
        .filter(|e| include_hidden || !e.model.hidden)
        .collect();
    entries.sort_by(|a, b| {
        let sa = a.model.arena_score.unwrap_or(0.0);
        let sb = b.model.arena_score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    entries
}
