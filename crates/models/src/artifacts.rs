//! Content-addressed model artifact store. Objects live under
//! `objects/<sha256-hex>` and are immutable; per-property manifests under
//! `manifests/<property-id>.json` name which object backs which model and
//! at which version. Swapping a model is a manifest edit, never an object
//! rewrite.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use priceye_core::PropertyId;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact store io failure: {0}")]
    Io(#[from] io::Error),
    #[error("manifest for {property_id} is not valid json: {reason}")]
    ManifestInvalid { property_id: String, reason: String },
    #[error("object {digest} does not match its digest")]
    DigestMismatch { digest: String },
}

/// One model slot in a property manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// sha256 hex of the backing object.
    pub digest: String,
    /// Human-facing version label, e.g. a training date.
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Model name ("demand", "xgboost", "neural_net") -> backing object.
    pub models: BTreeMap<String, ManifestEntry>,
}

impl ModelManifest {
    pub fn entry(&self, model: &str) -> Option<&ManifestEntry> {
        self.models.get(model)
    }
}

pub trait ArtifactStore: Send + Sync {
    /// The manifest for a property, or `None` when the property has no
    /// trained models.
    fn manifest(&self, property_id: &PropertyId) -> Result<Option<ModelManifest>, ArtifactError>;

    /// An object by digest, or `None` when the store never saw it.
    fn read_object(&self, digest: &str) -> Result<Option<Vec<u8>>, ArtifactError>;

    /// Stores bytes and returns their digest. Re-storing identical bytes is
    /// a no-op.
    fn put_object(&self, bytes: &[u8]) -> Result<String, ArtifactError>;

    fn write_manifest(
        &self,
        property_id: &PropertyId,
        manifest: &ModelManifest,
    ) -> Result<(), ArtifactError>;
}

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, digest: &str) -> PathBuf {
        self.root.join("objects").join(digest)
    }

    fn manifest_path(&self, property_id: &PropertyId) -> PathBuf {
        self.root.join("manifests").join(format!("{}.json", property_id.0))
    }
}

pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl ArtifactStore for FsArtifactStore {
    fn manifest(&self, property_id: &PropertyId) -> Result<Option<ModelManifest>, ArtifactError> {
        let path = self.manifest_path(property_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let manifest = serde_json::from_slice(&raw).map_err(|error| {
            ArtifactError::ManifestInvalid {
                property_id: property_id.0.clone(),
                reason: error.to_string(),
            }
        })?;
        Ok(Some(manifest))
    }

    fn read_object(&self, digest: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.object_path(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        if digest_hex(&bytes) != digest {
            return Err(ArtifactError::DigestMismatch { digest: digest.to_string() });
        }
        Ok(Some(bytes))
    }

    fn put_object(&self, bytes: &[u8]) -> Result<String, ArtifactError> {
        let digest = digest_hex(bytes);
        let path = self.object_path(&digest);
        if path.exists() {
            return Ok(digest);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps readers from seeing a torn object.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(digest)
    }

    fn write_manifest(
        &self,
        property_id: &PropertyId,
        manifest: &ModelManifest,
    ) -> Result<(), ArtifactError> {
        let path = self.manifest_path(property_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(manifest).map_err(|error| {
            ArtifactError::ManifestInvalid {
                property_id: property_id.0.clone(),
                reason: error.to_string(),
            }
        })?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use priceye_core::PropertyId;

    use super::{ArtifactStore, FsArtifactStore, ManifestEntry, ModelManifest};

    #[test]
    fn objects_round_trip_by_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path());

        let digest = store.put_object(b"model bytes").expect("put");
        let bytes = store.read_object(&digest).expect("read").expect("present");
        assert_eq!(bytes, b"model bytes");

        assert!(store.read_object("0".repeat(64).as_str()).expect("read").is_none());
    }

    #[test]
    fn corrupted_object_fails_the_digest_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path());

        let digest = store.put_object(b"original").expect("put");
        std::fs::write(dir.path().join("objects").join(&digest), b"tampered").expect("overwrite");
        assert!(store.read_object(&digest).is_err());
    }

    #[test]
    fn manifests_are_per_property() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path());
        let property = PropertyId("P-1".to_string());

        assert!(store.manifest(&property).expect("read").is_none());

        let mut manifest = ModelManifest::default();
        manifest.models.insert(
            "xgboost".to_string(),
            ManifestEntry { digest: "a".repeat(64), version: "2025-05-01".to_string() },
        );
        store.write_manifest(&property, &manifest).expect("write");

        let loaded = store.manifest(&property).expect("read").expect("present");
        assert_eq!(loaded, manifest);
        assert!(store.manifest(&PropertyId("P-2".to_string())).expect("read").is_none());
    }
}
