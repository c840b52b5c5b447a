pub mod adjuster;
pub mod artifacts;
pub mod brief;
pub mod runner;

pub use adjuster::{AdjustedPrice, HttpLlmClient, LlmAdjuster, LlmClient, ScriptedLlmClient};
pub use artifacts::{ArtifactError, ArtifactStore, FsArtifactStore, ManifestEntry, ModelManifest};
pub use brief::ContextualBrief;
pub use runner::{LinearRegressor, ModelKind, ModelRunner, Prediction};
