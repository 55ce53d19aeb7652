use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::VoiceEmbedding;
use crate::error::{Result, VoxgateError};
use crate::validation::validate_threshold;

/// Threshold applied when the caller does not supply one
pub const DEFAULT_VERIFY_THRESHOLD: f32 = 0.7;

/// Which embedding oracle backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Model-free signal signature (development, tests)
    Signature,
    /// ONNX speaker encoder (requires the onnx_real feature)
    Onnx,
}

/// Configuration for speaker biometrics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiometricsConfig {
    /// Cosine similarity threshold for verification
    pub verify_threshold: f32,
    pub oracle: OracleKind,
    /// Output dimension of the signature oracle
    pub embedding_dim: usize,
    /// ONNX model path (defaults to `<data>/models/speaker-encoder.onnx`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Expected SHA-256 of the ONNX model, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_sha256: Option<String>,
}

impl Default for BiometricsConfig {
    fn default() -> Self {
        Self {
            verify_threshold: DEFAULT_VERIFY_THRESHOLD,
            oracle: OracleKind::Signature,
            embedding_dim: 64,
            model_path: None,
            model_sha256: None,
        }
    }
}

/// Outcome of comparing a live embedding with a stored one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(rename = "match")]
    pub matched: bool,
    pub score: f32,
}

/// Cosine scoring and the threshold decision
#[derive(Debug, Clone, Copy)]
pub struct VerificationEngine {
    default_threshold: f32,
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_VERIFY_THRESHOLD,
        }
    }
}

impl VerificationEngine {
    pub fn new(default_threshold: f32) -> Result<Self> {
        Ok(Self {
            default_threshold: validate_threshold(default_threshold)?,
        })
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Score `live` against `stored`; a match is `score >= threshold`
    pub fn compare(
        &self,
        live: &VoiceEmbedding,
        stored: &VoiceEmbedding,
        threshold: Option<f32>,
    ) -> Result<Comparison> {
        let threshold = match threshold {
            Some(t) => validate_threshold(t)?,
            None => self.default_threshold,
        };

        if live.dimension() != stored.dimension() {
            return Err(VoxgateError::DimensionMismatch {
                live: live.dimension(),
                stored: stored.dimension(),
            });
        }

        let score = Self::cosine_similarity(live.as_slice(), stored.as_slice());

        Ok(Comparison {
            matched: score >= threshold,
            score,
        })
    }

    /// Compute cosine similarity between two equal-length vectors
    ///
    /// Accumulates in f64 and clamps, so a vector scored against itself
    /// yields exactly 1.0. Zero-norm input scores 0.0.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        let (dot, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
            (0.0f64, 0.0f64, 0.0f64),
            |(dot, na, nb), (&x, &y)| {
                let (x, y) = (x as f64, y as f64);
                (dot + x * y, na + x * x, nb + y * y)
            },
        );

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
    }

    /// Normalize an embedding to unit length
    pub fn normalize_embedding(embedding: &mut [f32]) {
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in embedding.iter_mut() {
                *x /= norm;
            }
        }
    }
}
