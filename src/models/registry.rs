//! Model lifecycle registry
//!
//! Single authority over which models are resident in device memory.
//! Loads are deduplicated (warm reuse), variant swaps evict the old entry
//! before the new one is constructed, and every eviction is followed by a
//! best-effort memory reclamation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};

use super::capability::ModelHandle;
use super::family::{ModelFamily, ModelSize};
use crate::device::{DeviceKind, MemoryReclaimer};
use crate::error::ScribeError;

/// Parameters for loading one model
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub family: ModelFamily,
    /// Size variant; only transcription families have more than one.
    pub size: Option<ModelSize>,
    pub device: DeviceKind,
}

impl LoadSpec {
    /// Variant key used for warm-reuse comparison
    pub fn variant(&self) -> String {
        match self.size {
            Some(size) => size.to_string(),
            None => "default".to_string(),
        }
    }
}

/// Constructor capability for model handles. Invoked only when no warm
/// entry matches; expensive (seconds to minutes for large variants).
#[async_trait::async_trait]
pub trait ModelFactory: Send + Sync {
    async fn build(&self, spec: &LoadSpec) -> anyhow::Result<ModelHandle>;
}

/// Lifecycle events emitted by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    Loaded(ModelFamily),
    Evicted(ModelFamily),
}

/// One resident model
pub struct LoadedModel {
    pub family: ModelFamily,
    pub variant: String,
    pub device: DeviceKind,
    pub handle: ModelHandle,
    pub loaded_at: DateTime<Utc>,
}

/// Snapshot of a resident entry for listing endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ResidentModel {
    pub family: ModelFamily,
    pub variant: String,
    pub device: DeviceKind,
    pub loaded_at: DateTime<Utc>,
}

/// Family-keyed registry of resident models
///
/// Overlapping load/evict calls are serialized by a dedicated mutation
/// lock; the entry map's own lock is only held for map operations, never
/// across a construction, so lookups stay responsive while a model loads.
/// Dropping an entry releases the last reference to its handle, which is
/// what actually frees the device allocation; the injected reclaimer only
/// adds a best-effort hint on top.
pub struct ModelRegistry {
    entries: RwLock<HashMap<ModelFamily, LoadedModel>>,
    mutation_lock: Mutex<()>,
    factory: Arc<dyn ModelFactory>,
    reclaimer: Arc<dyn MemoryReclaimer>,
    event_tx: broadcast::Sender<ModelEvent>,
}

impl ModelRegistry {
    pub fn new(factory: Arc<dyn ModelFactory>, reclaimer: Arc<dyn MemoryReclaimer>) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        Self {
            entries: RwLock::new(HashMap::new()),
            mutation_lock: Mutex::new(()),
            factory,
            reclaimer,
            event_tx,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ModelEvent> {
        self.event_tx.subscribe()
    }

    /// Load a model, reusing the warm entry when the variant matches.
    ///
    /// On a variant change the stale entry is evicted *before* the new one
    /// is constructed: the device cannot hold two variants of a family at
    /// once, even momentarily. The same ordering applies to conflicting
    /// families. A failed construction therefore leaves the family absent,
    /// never half-swapped.
    pub async fn load(&self, spec: LoadSpec) -> Result<ModelHandle, ScribeError> {
        let _guard = self.mutation_lock.lock().await;
        let variant = spec.variant();

        let mut evicted = false;
        {
            let mut entries = self.entries.write().await;

            if let Some(entry) = entries.get(&spec.family)
                && entry.variant == variant
            {
                tracing::debug!(family = %spec.family, variant = %variant, "Reusing warm model");
                return Ok(entry.handle.clone());
            }

            if entries.remove(&spec.family).is_some() {
                tracing::info!(family = %spec.family, variant = %variant, "Evicting stale variant before swap");
                let _ = self.event_tx.send(ModelEvent::Evicted(spec.family));
                crate::metrics::record_model_evicted(spec.family);
                evicted = true;
            }
            for &conflict in spec.family.conflicts_with() {
                if entries.remove(&conflict).is_some() {
                    tracing::info!(family = %conflict, loading = %spec.family, "Evicting conflicting family");
                    let _ = self.event_tx.send(ModelEvent::Evicted(conflict));
                    crate::metrics::record_model_evicted(conflict);
                    evicted = true;
                }
            }
        }
        if evicted {
            self.reclaimer.reclaim();
        }

        let handle = self
            .factory
            .build(&spec)
            .await
            .map_err(|e| ScribeError::ModelLoad {
                family: spec.family,
                message: e.to_string(),
            })?;

        tracing::info!(
            family = %spec.family,
            variant = %variant,
            device = %spec.device,
            "Model loaded"
        );

        let mut entries = self.entries.write().await;
        entries.insert(
            spec.family,
            LoadedModel {
                family: spec.family,
                variant: variant.clone(),
                device: spec.device,
                handle: handle.clone(),
                loaded_at: Utc::now(),
            },
        );

        let _ = self.event_tx.send(ModelEvent::Loaded(spec.family));
        crate::metrics::record_model_loaded(spec.family, &variant);
        crate::metrics::update_resident_count(entries.len());

        Ok(handle)
    }

    /// Evict the named families. Absent families are a no-op, but the
    /// reclamation pass runs unconditionally so peak memory stays bounded
    /// even across no-op calls.
    pub async fn evict(&self, families: &[ModelFamily]) {
        let _guard = self.mutation_lock.lock().await;
        {
            let mut entries = self.entries.write().await;

            for &family in families {
                if entries.remove(&family).is_some() {
                    tracing::info!(family = %family, "Model evicted");
                    let _ = self.event_tx.send(ModelEvent::Evicted(family));
                    crate::metrics::record_model_evicted(family);
                }
            }

            crate::metrics::update_resident_count(entries.len());
        }

        self.reclaimer.reclaim();
    }

    /// Clear every entry and reclaim. Fluent: returns the registry.
    pub async fn evict_all(&self) -> &Self {
        let _guard = self.mutation_lock.lock().await;
        {
            let mut entries = self.entries.write().await;

            for family in entries.keys().copied().collect::<Vec<_>>() {
                tracing::info!(family = %family, "Model evicted");
                let _ = self.event_tx.send(ModelEvent::Evicted(family));
                crate::metrics::record_model_evicted(family);
            }
            entries.clear();

            crate::metrics::update_resident_count(0);
        }

        self.reclaimer.reclaim();

        self
    }

    /// Pure lookup, no side effects
    pub async fn get(&self, family: ModelFamily) -> Option<ModelHandle> {
        let entries = self.entries.read().await;
        entries.get(&family).map(|entry| entry.handle.clone())
    }

    /// Snapshot of resident entries, sorted by family
    pub async fn resident(&self) -> Vec<ResidentModel> {
        let entries = self.entries.read().await;
        let mut resident: Vec<_> = entries
            .values()
            .map(|entry| ResidentModel {
                family: entry.family,
                variant: entry.variant.clone(),
                device: entry.device,
                loaded_at: entry.loaded_at,
            })
            .collect();
        resident.sort_by_key(|entry| entry.family);
        resident
    }

    /// Number of resident models
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}
