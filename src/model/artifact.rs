//! The versioned model artifact: normaliser settings, vectoriser and
//! classifier weights in one JSON document.
//!
//! An artifact is loaded once, validated as a whole and then shared
//! read-only (`Arc<ModelArtifact>`) by every classification call. Nothing in
//! it changes at inference time.

use crate::error::DoctriageError;
use crate::model::predictor::LogisticRegression;
use crate::model::vectorizer::TfidfVectorizer;
use crate::pipeline::normalize::NormalizerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Artifact layout version understood by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Trained model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Layout version; must equal [`ARTIFACT_FORMAT_VERSION`].
    pub format_version: u32,
    /// Free-form identifier of the training run, reported in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Cleanup applied to text before vectorising, identical to training.
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    pub vectorizer: TfidfVectorizer,
    pub classifier: LogisticRegression,
}

impl ModelArtifact {
    /// Assemble and validate an artifact from its parts.
    pub fn new(
        normalizer: NormalizerConfig,
        vectorizer: TfidfVectorizer,
        classifier: LogisticRegression,
    ) -> Result<Self, DoctriageError> {
        let artifact = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_version: None,
            normalizer,
            vectorizer,
            classifier,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Read, parse and validate an artifact from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DoctriageError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DoctriageError::ArtifactNotFound {
                path: path.to_path_buf(),
            });
        }
        let json = std::fs::read_to_string(path).map_err(|source| DoctriageError::ArtifactRead {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Self =
            serde_json::from_str(&json).map_err(|e| DoctriageError::ArtifactParse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        artifact.validate()?;

        info!(
            "Loaded model artifact '{}' ({}): {} classes, {} features",
            path.display(),
            artifact.model_version.as_deref().unwrap_or("unversioned"),
            artifact.classes().len(),
            artifact.vectorizer.dimension()
        );
        Ok(artifact)
    }

    /// Parse and validate an artifact held in memory.
    pub fn from_json_str(json: &str) -> Result<Self, DoctriageError> {
        let artifact: Self = serde_json::from_str(json).map_err(|e| {
            DoctriageError::ArtifactParse {
                path: "<memory>".into(),
                detail: e.to_string(),
            }
        })?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn to_json_pretty(&self) -> Result<String, DoctriageError> {
        serde_json::to_string_pretty(self).map_err(|e| DoctriageError::Internal(e.to_string()))
    }

    /// Check the version and that vectoriser and classifier fit together.
    pub fn validate(&self) -> Result<(), DoctriageError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(DoctriageError::UnsupportedArtifactVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        self.vectorizer
            .validate()
            .map_err(DoctriageError::InvalidArtifact)?;
        self.classifier
            .validate()
            .map_err(DoctriageError::InvalidArtifact)?;
        if self.classifier.n_features() != self.vectorizer.dimension() {
            return Err(DoctriageError::InvalidArtifact(format!(
                "classifier expects {} features but the vocabulary has {} terms",
                self.classifier.n_features(),
                self.vectorizer.dimension()
            )));
        }
        Ok(())
    }

    /// Class labels in output order.
    pub fn classes(&self) -> &[String] {
        &self.classifier.classes
    }
}
