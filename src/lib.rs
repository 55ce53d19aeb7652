//! Voxgate - speaker verification against enrolled voiceprints
//!
//! Audio of any container is normalized to a mono waveform, embedded by a
//! pluggable oracle and compared by cosine similarity with the signature
//! stored for the claimed identity.

pub mod audio;
pub mod config;
pub mod error;
pub mod integrity;
pub mod paths;
pub mod service;
pub mod validation;
pub mod voice;

pub use audio::{AudioSample, CanonicalWaveform};
pub use config::AppConfig;
pub use error::{ErrorClass, ErrorReport, Result, VoxgateError};
pub use paths::AppPaths;
pub use service::{Enrolled, Health, Removed, VerifyResult, VoiceAuth};
pub use voice::VoiceEmbedding;
