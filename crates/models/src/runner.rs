//! In-process model evaluation. Artifacts are deterministic serialized
//! regressors; "no artifact" is a normal state that yields no signal, never
//! an error. Loads are lazy and cached per (property, model), including the
//! negative result, so a horizon run touches the store at most once per
//! model. The file reads run on the blocking pool so a cold load never
//! stalls the async workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use priceye_core::{FeatureVector, PropertyId};

use crate::artifacts::ArtifactStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Demand,
    Xgboost,
    NeuralNet,
}

impl ModelKind {
    /// Manifest key for this model slot.
    pub fn manifest_name(self) -> &'static str {
        match self {
            Self::Demand => "demand",
            Self::Xgboost => "xgboost",
            Self::NeuralNet => "neural_net",
        }
    }
}

/// A trained linear regressor over the normalized feature vector. The first
/// weight pairs with the bias term; the output is a nightly price in cents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub weights: Vec<f64>,
}

impl LinearRegressor {
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let inputs = features.to_normalized_vector();
        let raw: f64 =
            self.weights.iter().zip(inputs.iter()).map(|(w, x)| w * x).sum();
        raw.max(0.0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Nightly price in cents, never negative.
    pub price: f64,
    /// Version label from the manifest.
    pub version: String,
}

struct LoadedModel {
    regressor: Arc<LinearRegressor>,
    version: String,
}

pub struct ModelRunner {
    store: Arc<dyn ArtifactStore>,
    cache: Mutex<HashMap<(String, ModelKind), Option<Arc<LoadedModel>>>>,
}

impl ModelRunner {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn predict(
        &self,
        property_id: &PropertyId,
        kind: ModelKind,
        features: &FeatureVector,
    ) -> Option<Prediction> {
        let model = self.load(property_id, kind).await?;
        Some(Prediction { price: model.regressor.predict(features), version: model.version.clone() })
    }

    pub async fn predict_demand(
        &self,
        property_id: &PropertyId,
        features: &FeatureVector,
    ) -> Option<Prediction> {
        self.predict(property_id, ModelKind::Demand, features).await
    }

    pub async fn predict_price_xgb(
        &self,
        property_id: &PropertyId,
        features: &FeatureVector,
    ) -> Option<Prediction> {
        self.predict(property_id, ModelKind::Xgboost, features).await
    }

    pub async fn predict_price_nn(
        &self,
        property_id: &PropertyId,
        features: &FeatureVector,
    ) -> Option<Prediction> {
        self.predict(property_id, ModelKind::NeuralNet, features).await
    }

    async fn load(&self, property_id: &PropertyId, kind: ModelKind) -> Option<Arc<LoadedModel>> {
        let key = (property_id.0.clone(), kind);
        {
            let cache = self.lock_cache();
            if let Some(cached) = cache.get(&key) {
                return cached.clone();
            }
        }

        let store = self.store.clone();
        let owner = property_id.clone();
        let loaded =
            match tokio::task::spawn_blocking(move || load_uncached(store.as_ref(), &owner, kind))
                .await
            {
                Ok(loaded) => loaded.map(Arc::new),
                Err(error) => {
                    warn!(
                        event_name = "models.load_task_failed",
                        property_id = %property_id.0,
                        model = kind.manifest_name(),
                        error = %error,
                        "treating model signal as unavailable"
                    );
                    None
                }
            };
        self.lock_cache().insert(key, loaded.clone());
        loaded
    }

    fn lock_cache(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(String, ModelKind), Option<Arc<LoadedModel>>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_uncached(
    store: &dyn ArtifactStore,
    property_id: &PropertyId,
    kind: ModelKind,
) -> Option<LoadedModel> {
    let manifest = match store.manifest(property_id) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => return None,
        Err(error) => {
            warn!(
                event_name = "models.manifest_unreadable",
                property_id = %property_id.0,
                error = %error,
                "treating model signal as unavailable"
            );
            return None;
        }
    };
    let entry = manifest.entry(kind.manifest_name())?.clone();

    let bytes = match store.read_object(&entry.digest) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!(
                event_name = "models.artifact_missing",
                property_id = %property_id.0,
                model = kind.manifest_name(),
                digest = %entry.digest,
                "manifest points at a missing object"
            );
            return None;
        }
        Err(error) => {
            warn!(
                event_name = "models.artifact_unreadable",
                property_id = %property_id.0,
                model = kind.manifest_name(),
                error = %error,
                "treating model signal as unavailable"
            );
            return None;
        }
    };

    match serde_json::from_slice::<LinearRegressor>(&bytes) {
        Ok(regressor) => {
            Some(LoadedModel { regressor: Arc::new(regressor), version: entry.version })
        }
        Err(error) => {
            warn!(
                event_name = "models.artifact_corrupt",
                property_id = %property_id.0,
                model = kind.manifest_name(),
                error = %error,
                "treating model signal as unavailable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use priceye_core::{FeatureVector, PropertyId};

    use crate::artifacts::{ArtifactStore, FsArtifactStore, ManifestEntry, ModelManifest};

    use super::{LinearRegressor, ModelKind, ModelRunner};

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    fn store_with_model(
        store: &FsArtifactStore,
        property: &PropertyId,
        model: &str,
        weights: Vec<f64>,
    ) {
        let digest =
            store.put_object(&LinearRegressor { weights }.to_bytes()).expect("put object");
        let mut manifest = store.manifest(property).expect("read").unwrap_or_default();
        manifest.models.insert(
            model.to_string(),
            ManifestEntry { digest, version: "2025-05-01".to_string() },
        );
        store.write_manifest(property, &manifest).expect("write manifest");
    }

    #[tokio::test]
    async fn missing_artifact_is_no_signal_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = ModelRunner::new(Arc::new(FsArtifactStore::new(dir.path())));
        let features = FeatureVector::new(date("2025-06-01"), date("2025-06-10"));

        assert!(runner
            .predict_price_xgb(&PropertyId("P-1".to_string()), &features)
            .await
            .is_none());
        // second call answers from the negative cache
        assert!(runner
            .predict_price_xgb(&PropertyId("P-1".to_string()), &features)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn predictions_are_deterministic_and_non_negative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path());
        let property = PropertyId("P-1".to_string());
        // Constant 12_000 cents plus a demand-sensitive term.
        store_with_model(
            &store,
            &property,
            "xgboost",
            vec![12_000.0, 0.0, 0.0, 0.0, 0.0, 2_000.0, 0.0],
        );
        store_with_model(&store, &property, "neural_net", vec![-50_000.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let runner = ModelRunner::new(Arc::new(store));
        let features = FeatureVector::new(date("2025-06-01"), date("2025-06-10"))
            .with_market_demand(0.5);

        let xgb = runner.predict_price_xgb(&property, &features).await.expect("prediction");
        assert!((xgb.price - 13_000.0).abs() < 1e-9);
        assert_eq!(xgb.version, "2025-05-01");

        let again = runner.predict_price_xgb(&property, &features).await.expect("prediction");
        assert_eq!(xgb, again);

        // negative raw output clamps to zero
        let nn = runner.predict_price_nn(&property, &features).await.expect("prediction");
        assert_eq!(nn.price, 0.0);
    }

    #[tokio::test]
    async fn corrupt_artifact_degrades_to_no_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path());
        let property = PropertyId("P-1".to_string());

        let digest = store.put_object(b"not a regressor").expect("put");
        let mut manifest = ModelManifest::default();
        manifest.models.insert(
            ModelKind::Demand.manifest_name().to_string(),
            ManifestEntry { digest, version: "v0".to_string() },
        );
        store.write_manifest(&property, &manifest).expect("write");

        let runner = ModelRunner::new(Arc::new(store));
        let features = FeatureVector::new(date("2025-06-01"), date("2025-06-02"));
        assert!(runner.predict_demand(&property, &features).await.is_none());
    }
}
