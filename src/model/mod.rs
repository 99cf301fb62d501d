//! The trained model: artifact loading, TF-IDF vectorisation and
//! logistic-regression prediction.
//!
//! ```text
//! NormalizedText ──▶ TfidfVectorizer::transform ──▶ FeatureVector
//!                                                       │
//!                    LogisticRegression::predict ◀──────┘
//!                               │
//!                               ▼
//!                     Prediction { label, probabilities }
//! ```

pub mod artifact;
pub mod predictor;
pub mod vectorizer;

pub use artifact::{ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use predictor::{LogisticRegression, PredictError, Prediction};
pub use vectorizer::{FeatureVector, Norm, TfidfVectorizer};
