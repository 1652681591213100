//! Model snapshots
//!
//! A [`ModelSnapshot`] bundles the trained predictors with the category maps
//! they were trained against. It is built once and never mutated; every
//! pipeline call receives it by handle. Reloading replaces the whole
//! snapshot through [`SnapshotHandle::swap`], so a reader holds either the
//! old snapshot or the new one, never a mix.

use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::aggregate::{OutlierClip, FEATURE_NAMES};
use crate::encoding::CategoryMaps;
use crate::error::{Error, Result};
use crate::predictors::{
    AmountRegressor, BoostedClassifier, BoostedMulticlass, BoostedRegressor, IncrementClassifier,
    PurchaseClassifier,
};

/// On-disk snapshot layout (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub maps: CategoryMaps,
    pub classifier: BoostedClassifier,
    pub regressor: BoostedRegressor,
    #[serde(default)]
    pub increment: Option<BoostedMulticlass>,
    /// Amount clip threshold fixed when the models were trained
    #[serde(default)]
    pub clip_threshold: Option<f64>,
}

/// Immutable bundle of predictors and category maps
pub struct ModelSnapshot {
    maps: CategoryMaps,
    classifier: Arc<dyn PurchaseClassifier>,
    regressor: Arc<dyn AmountRegressor>,
    increment: Option<Arc<dyn IncrementClassifier>>,
    clip: Option<OutlierClip>,
    fingerprint: String,
}

impl std::fmt::Debug for ModelSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSnapshot")
            .field("fingerprint", &self.fingerprint)
            .field("clients", &self.maps.client.len())
            .field("merchants", &self.maps.merchant.len())
            .field("has_increment_model", &self.increment.is_some())
            .finish()
    }
}

impl ModelSnapshot {
    /// Bundle predictors with their maps
    ///
    /// Both predictors must accept the per-transaction feature row.
    pub fn new(
        maps: CategoryMaps,
        classifier: Arc<dyn PurchaseClassifier>,
        regressor: Arc<dyn AmountRegressor>,
    ) -> Result<Self> {
        let expected = FEATURE_NAMES.len();
        for actual in [classifier.n_features(), regressor.n_features()] {
            if actual != expected {
                return Err(Error::FeatureShape { expected, actual });
            }
        }

        Ok(Self {
            maps,
            classifier,
            regressor,
            increment: None,
            clip: None,
            fingerprint: "in-memory".to_string(),
        })
    }

    pub fn with_increment_model(mut self, model: Arc<dyn IncrementClassifier>) -> Self {
        self.increment = Some(model);
        self
    }

    pub fn with_clip(mut self, clip: OutlierClip) -> Self {
        self.clip = Some(clip);
        self
    }

    /// Load a JSON snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            Error::MissingModel(format!("cannot read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot = Self::from_slice(&bytes)?;
        info!(
            "Loaded model snapshot {} from {} ({} clients, {} merchants)",
            snapshot.fingerprint,
            path.display(),
            snapshot.maps.client.len(),
            snapshot.maps.merchant.len()
        );
        Ok(snapshot)
    }

    /// Parse snapshot JSON
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_slice(bytes)?;
        file.classifier.ensemble.validate()?;
        file.regressor.ensemble.validate()?;
        if let Some(increment) = &file.increment {
            increment.validate()?;
        }

        let mut snapshot = Self::new(
            file.maps,
            Arc::new(file.classifier),
            Arc::new(file.regressor),
        )?;
        if let Some(increment) = file.increment {
            snapshot = snapshot.with_increment_model(Arc::new(increment));
        }
        if let Some(threshold) = file.clip_threshold {
            snapshot = snapshot.with_clip(OutlierClip { threshold });
        }
        snapshot.fingerprint = fingerprint(bytes);
        Ok(snapshot)
    }

    pub fn maps(&self) -> &CategoryMaps {
        &self.maps
    }

    pub fn classifier(&self) -> &dyn PurchaseClassifier {
        self.classifier.as_ref()
    }

    pub fn regressor(&self) -> &dyn AmountRegressor {
        self.regressor.as_ref()
    }

    /// The increment model, or `MissingModel` when the snapshot has none
    pub fn increment_model(&self) -> Result<&dyn IncrementClassifier> {
        self.increment
            .as_deref()
            .ok_or_else(|| Error::MissingModel("snapshot has no increment classifier".into()))
    }

    pub fn clip(&self) -> Option<OutlierClip> {
        self.clip
    }

    /// Short SHA-256 of the snapshot file, or "in-memory"
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..6])
}

/// Shared, atomically replaceable snapshot reference
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in effect now; stays valid even if a swap happens later
    pub fn current(&self) -> Arc<ModelSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole snapshot, returning the previous one
    pub fn swap(&self, snapshot: ModelSnapshot) -> Arc<ModelSnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Swapping model snapshot {} -> {}",
            guard.fingerprint(),
            next.fingerprint()
        );
        std::mem::replace(&mut *guard, next)
    }

    /// Load a snapshot file and swap it in; on failure the current one stays
    pub fn reload(&self, path: &Path) -> Result<Arc<ModelSnapshot>> {
        let snapshot = ModelSnapshot::load(path)?;
        Ok(self.swap(snapshot))
    }
}
