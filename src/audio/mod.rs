pub mod decode;
pub mod ingest;
pub mod resample;
pub mod transcode;

use serde::{Deserialize, Serialize};

/// Target sample rate for all audio processing (16 kHz)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Target number of channels for processing (always mono)
pub const TARGET_CHANNELS: usize = 1;

/// Lowest sample rate accepted from a decoded stream
pub const MIN_SAMPLE_RATE: u32 = 1_000;

/// Highest sample rate accepted from a decoded stream
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Longest accepted format hint
const MAX_HINT_LEN: usize = 8;

pub fn is_supported_rate(sample_rate: u32) -> bool {
    (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate)
}

/// Raw caller-supplied audio plus an optional container hint
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub bytes: Vec<u8>,
    /// File extension of the upload, e.g. "webm" or "ogg"
    pub format_hint: Option<String>,
}

impl AudioSample {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            format_hint: None,
        }
    }

    /// Attach a file-extension hint; anything but a short alphanumeric extension is dropped
    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        let hint = hint.trim_start_matches('.').to_ascii_lowercase();
        let valid = !hint.is_empty()
            && hint.len() <= MAX_HINT_LEN
            && hint.bytes().all(|b| b.is_ascii_alphanumeric());
        if !valid && !hint.is_empty() {
            log::debug!("Ignoring format hint {:?}", hint);
        }
        self.format_hint = valid.then_some(hint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Mono f32 waveform tagged with its true sample rate
///
/// Never empty: construction fails for zero samples or a rate outside
/// `MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWaveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl CanonicalWaveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Option<Self> {
        if samples.is_empty() || !is_supported_rate(sample_rate) {
            return None;
        }
        Some(Self {
            samples,
            sample_rate,
        })
    }

    /// Build from interleaved frames, averaging channels down to mono
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Option<Self> {
        Self::new(downmix_interleaved(interleaved, channels), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate requested from the transcoder fallback
    pub sample_rate_hz: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: TARGET_SAMPLE_RATE,
        }
    }
}

/// Collapse interleaved frames to mono by per-frame arithmetic mean
///
/// A trailing partial frame is dropped.
pub fn downmix_interleaved(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= TARGET_CHANNELS {
        return data.to_vec();
    }

    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
