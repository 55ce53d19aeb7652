//! Voice biometrics module
//!
//! Speaker embeddings, the enrollment store and the match decision.

pub mod biometrics;
pub mod oracle;
pub mod store;

use serde::{Deserialize, Serialize};

pub use biometrics::{BiometricsConfig, Comparison, OracleKind, VerificationEngine};
pub use oracle::{EmbeddingOracle, LazyOracle};
pub use store::{EnrollmentStore, StoreConfig};

/// Fixed-dimension speaker embedding
///
/// Always non-empty with finite components; serialized as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct VoiceEmbedding(Vec<f32>);

impl VoiceEmbedding {
    pub fn new(values: Vec<f32>) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for VoiceEmbedding {
    type Error = String;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        let len = values.len();
        Self::new(values).ok_or_else(|| {
            format!(
                "embedding must be non-empty with finite values (got {} values)",
                len
            )
        })
    }
}

impl From<VoiceEmbedding> for Vec<f32> {
    fn from(embedding: VoiceEmbedding) -> Self {
        embedding.0
    }
}
