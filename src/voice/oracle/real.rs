//! ONNX speaker encoder
//!
//! Model contract: one f32 input `[1, N]` holding a 16 kHz waveform, one f32
//! output `[1, D]` holding the embedding. The session needs `&mut` to run, so
//! it sits behind a mutex; inference calls are serialized.

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

use super::EmbeddingOracle;
use crate::audio::{CanonicalWaveform, TARGET_SAMPLE_RATE};
use crate::error::{Result, VoxgateError};
use crate::integrity;
use crate::voice::biometrics::VerificationEngine;
use crate::voice::VoiceEmbedding;

/// One second of silence used to discover the output dimension
const WARMUP_SAMPLES: usize = TARGET_SAMPLE_RATE as usize;

pub struct OnnxOracle {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    dimension: usize,
}

impl OnnxOracle {
    pub fn load(model_path: &Path, expected_sha256: Option<&str>) -> Result<Self> {
        if !model_path.exists() {
            return Err(VoxgateError::OracleInit(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        if let Some(expected) = expected_sha256 {
            integrity::verify_sha256(model_path, expected)
                .map_err(|e| VoxgateError::OracleInit(format!("{:#}", e)))?;
        }

        let mut session = Session::builder()
            .map_err(|e| init_err("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| init_err("Failed to set optimization level", e))?
            .with_intra_threads(1)
            .map_err(|e| init_err("Failed to set threads", e))?
            .commit_from_file(model_path)
            .map_err(|e| init_err("Failed to load model", e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| VoxgateError::OracleInit("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| VoxgateError::OracleInit("model declares no outputs".to_string()))?;

        let warmup = run_encoder(&mut session, &input_name, &output_name, &[0.0; WARMUP_SAMPLES])
            .map_err(|e| VoxgateError::OracleInit(format!("Warm-up inference failed: {}", e)))?;
        if warmup.is_empty() {
            return Err(VoxgateError::OracleInit(
                "model produced an empty embedding".to_string(),
            ));
        }

        log::info!(
            "Speaker encoder loaded: {} ({} -> {}, dim={})",
            model_path.display(),
            input_name,
            output_name,
            warmup.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            dimension: warmup.len(),
        })
    }
}

impl EmbeddingOracle for OnnxOracle {
    fn embed(&self, waveform: &CanonicalWaveform) -> Result<VoiceEmbedding> {
        if waveform.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(VoxgateError::Embedding(format!(
                "expected {}Hz input, got {}Hz",
                TARGET_SAMPLE_RATE,
                waveform.sample_rate()
            )));
        }

        let mut values = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| VoxgateError::Embedding("encoder session poisoned".to_string()))?;
            run_encoder(
                &mut session,
                &self.input_name,
                &self.output_name,
                waveform.samples(),
            )
            .map_err(VoxgateError::Embedding)?
        };

        if values.len() != self.dimension {
            return Err(VoxgateError::Embedding(format!(
                "encoder returned {} values, expected {}",
                values.len(),
                self.dimension
            )));
        }

        VerificationEngine::normalize_embedding(&mut values);
        VoiceEmbedding::new(values)
            .ok_or_else(|| VoxgateError::Embedding("encoder produced non-finite values".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }
}

fn init_err(context: &str, e: impl std::fmt::Display) -> VoxgateError {
    VoxgateError::OracleInit(format!("{}: {}", context, e))
}

fn run_encoder(
    session: &mut Session,
    input_name: &str,
    output_name: &str,
    samples: &[f32],
) -> std::result::Result<Vec<f32>, String> {
    let input = ndarray::Array2::from_shape_vec((1, samples.len()), samples.to_vec())
        .map_err(|e| format!("Failed to shape input: {}", e))?;
    let tensor =
        Value::from_array(input).map_err(|e| format!("Failed to create input tensor: {}", e))?;

    let outputs = session
        .run(ort::inputs![input_name => tensor])
        .map_err(|e| format!("Inference failed: {}", e))?;

    let output = outputs
        .get(output_name)
        .ok_or_else(|| format!("Missing '{}' in results", output_name))?;
    let (_, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| format!("Failed to extract output: {}", e))?;

    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxOracle::load(&dir.path().join("absent.onnx"), None)
            .err()
            .unwrap();
        assert!(matches!(err, VoxgateError::OracleInit(_)));
    }

    #[test]
    fn test_checksum_mismatch_rejected_before_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speaker-encoder.onnx");
        std::fs::write(&path, b"not a model").unwrap();

        let err = OnnxOracle::load(&path, Some("00")).err().unwrap();
        assert!(err.to_string().contains("Checksum mismatch"));
    }
}
