//! Signature oracle (model-free)
//!
//! Frames the waveform, computes normalized autocorrelation at spread lags
//! plus log-energy and zero-crossing rate per frame, averages over frames and
//! L2-normalizes. Deterministic and cheap; it tells tones and timbres apart
//! well enough for development, not for real speaker discrimination.

use super::EmbeddingOracle;
use crate::audio::{CanonicalWaveform, TARGET_SAMPLE_RATE};
use crate::error::{Result, VoxgateError};
use crate::voice::biometrics::VerificationEngine;
use crate::voice::VoiceEmbedding;

/// 25ms @ 16kHz
const FRAME_LEN: usize = 400;
/// 10ms @ 16kHz
const HOP_LEN: usize = 160;
/// Longest lag examined (80 Hz pitch period)
const MAX_LAG: usize = 200;
/// Floor added before taking log-energy
const ENERGY_FLOOR: f64 = 1e-10;
/// Autocorrelation lags plus log-energy and zero-crossing rate
const MIN_DIMENSION: usize = 3;

#[derive(Debug, Clone)]
pub struct SignatureOracle {
    dimension: usize,
    lags: Vec<usize>,
}

impl SignatureOracle {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension < MIN_DIMENSION {
            return Err(VoxgateError::OracleInit(format!(
                "signature embedding needs at least {} dimensions, got {}",
                MIN_DIMENSION, dimension
            )));
        }

        let n_lags = dimension - 2;
        let lags = (0..n_lags)
            .map(|k| {
                if n_lags == 1 {
                    1
                } else {
                    1 + k * (MAX_LAG - 1) / (n_lags - 1)
                }
            })
            .collect();

        log::info!("Signature oracle created (dim={})", dimension);
        Ok(Self { dimension, lags })
    }

    fn frame_features(&self, frame: &[f32], acc: &mut [f64]) {
        let n_lags = self.lags.len();

        let r0: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if r0 > 0.0 {
            for (slot, &lag) in acc[..n_lags].iter_mut().zip(&self.lags) {
                let r: f64 = frame
                    .iter()
                    .zip(&frame[lag..])
                    .map(|(&a, &b)| a as f64 * b as f64)
                    .sum();
                *slot += r / r0;
            }
        }

        let energy = r0 / frame.len() as f64;
        acc[n_lags] += (energy + ENERGY_FLOOR).ln() / 10.0;

        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        acc[n_lags + 1] += crossings as f64 / (frame.len() - 1) as f64;
    }
}

impl EmbeddingOracle for SignatureOracle {
    fn embed(&self, waveform: &CanonicalWaveform) -> Result<VoiceEmbedding> {
        if waveform.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(VoxgateError::Embedding(format!(
                "expected {}Hz input, got {}Hz",
                TARGET_SAMPLE_RATE,
                waveform.sample_rate()
            )));
        }

        let samples = waveform.samples();
        if samples.len() < FRAME_LEN {
            return Err(VoxgateError::Embedding(format!(
                "audio too short: {} samples, need at least {}",
                samples.len(),
                FRAME_LEN
            )));
        }

        let mut acc = vec![0.0f64; self.dimension];
        let mut frames = 0usize;
        let mut start = 0;
        while start + FRAME_LEN <= samples.len() {
            self.frame_features(&samples[start..start + FRAME_LEN], &mut acc);
            frames += 1;
            start += HOP_LEN;
        }

        let mut embedding: Vec<f32> = acc.iter().map(|&v| (v / frames as f64) as f32).collect();
        VerificationEngine::normalize_embedding(&mut embedding);

        log::debug!("Signature embedding over {} frames", frames);

        VoiceEmbedding::new(embedding)
            .ok_or_else(|| VoxgateError::Embedding("non-finite embedding".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }
}
