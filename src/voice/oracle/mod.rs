//! Embedding oracle - waveform to speaker embedding
//!
//! This module provides speaker embeddings using either:
//! - Signature oracle (default): model-free framed signal statistics for development
//! - ONNX oracle (onnx_real feature): pretrained speaker encoder via `ort`
//!
//! Construction is deferred to first use and happens at most once through
//! [`LazyOracle`], which the service owns; there is no process-global handle.

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use super::biometrics::{BiometricsConfig, OracleKind};
use super::VoiceEmbedding;
use crate::audio::CanonicalWaveform;
use crate::error::Result;
use crate::paths::AppPaths;

// Always compile the signature oracle
pub mod stub;

cfg_if::cfg_if! {
    if #[cfg(feature = "onnx_real")] {
        pub mod real;
    }
}

/// Maps a canonical waveform to a fixed-dimension embedding
///
/// Implementations must be deterministic for identical input and keep the
/// same output dimension for their whole lifetime.
pub trait EmbeddingOracle: Send + Sync {
    fn embed(&self, waveform: &CanonicalWaveform) -> Result<VoiceEmbedding>;

    fn dimension(&self) -> usize;

    /// Input sample rate the oracle expects
    fn sample_rate(&self) -> u32;
}

type OracleFactory = Box<dyn Fn() -> Result<Arc<dyn EmbeddingOracle>> + Send + Sync>;

/// Oracle handle constructed on first use
///
/// Concurrent first callers block on the same initialization. A failed
/// initialization is not cached; the next call runs the factory again.
pub struct LazyOracle {
    cell: OnceCell<Arc<dyn EmbeddingOracle>>,
    factory: OracleFactory,
}

impl LazyOracle {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingOracle>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Wrap an already constructed oracle
    pub fn ready(oracle: Arc<dyn EmbeddingOracle>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Arc::clone(&oracle));
        Self {
            cell,
            factory: Box::new(move || Ok(Arc::clone(&oracle))),
        }
    }

    pub fn get(&self) -> Result<&Arc<dyn EmbeddingOracle>> {
        self.cell.get_or_try_init(|| {
            log::info!("Initializing embedding oracle");
            let oracle = (self.factory)().map_err(|e| {
                log::error!("Embedding oracle initialization failed: {}", e);
                e
            })?;
            log::info!(
                "Embedding oracle ready (dim={}, rate={}Hz)",
                oracle.dimension(),
                oracle.sample_rate()
            );
            Ok(oracle)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for LazyOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyOracle")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Build the configured oracle as a lazy handle
pub fn build_oracle(config: &BiometricsConfig, paths: &AppPaths) -> LazyOracle {
    match config.oracle {
        OracleKind::Signature => {
            let dimension = config.embedding_dim;
            LazyOracle::new(move || {
                let oracle = stub::SignatureOracle::new(dimension)?;
                Ok(Arc::new(oracle) as Arc<dyn EmbeddingOracle>)
            })
        }
        OracleKind::Onnx => {
            let model_path = config
                .model_path
                .clone()
                .unwrap_or_else(|| paths.speaker_model_file());
            let expected_sha256 = config.model_sha256.clone();
            onnx_factory(model_path, expected_sha256)
        }
    }
}

#[cfg(feature = "onnx_real")]
fn onnx_factory(model_path: std::path::PathBuf, expected_sha256: Option<String>) -> LazyOracle {
    LazyOracle::new(move || {
        let oracle = real::OnnxOracle::load(&model_path, expected_sha256.as_deref())?;
        Ok(Arc::new(oracle) as Arc<dyn EmbeddingOracle>)
    })
}

#[cfg(not(feature = "onnx_real"))]
fn onnx_factory(model_path: std::path::PathBuf, _expected_sha256: Option<String>) -> LazyOracle {
    LazyOracle::new(move || {
        Err(crate::error::VoxgateError::OracleInit(format!(
            "ONNX oracle requested for {} but voxgate was built without the onnx_real feature",
            model_path.display()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoxgateError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    struct Fixed;

    impl EmbeddingOracle for Fixed {
        fn embed(&self, _waveform: &CanonicalWaveform) -> Result<VoiceEmbedding> {
            VoiceEmbedding::new(vec![1.0, 0.0])
                .ok_or_else(|| VoxgateError::Embedding("unreachable".into()))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    #[test]
    fn test_concurrent_first_use_constructs_once() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let lazy = {
            let constructed = Arc::clone(&constructed);
            Arc::new(LazyOracle::new(move || {
                constructed.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(Arc::new(Fixed) as Arc<dyn EmbeddingOracle>)
            }))
        };

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    Arc::as_ptr(lazy.get().unwrap()) as *const () as usize
                })
            })
            .collect();

        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let lazy = {
            let attempts = Arc::clone(&attempts);
            LazyOracle::new(move || {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VoxgateError::OracleInit("model missing".into()))
                } else {
                    Ok(Arc::new(Fixed) as Arc<dyn EmbeddingOracle>)
                }
            })
        };

        assert!(matches!(lazy.get(), Err(VoxgateError::OracleInit(_))));
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.get().unwrap().dimension(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ready_is_initialized() {
        let lazy = LazyOracle::ready(Arc::new(Fixed));
        assert!(lazy.is_initialized());
        assert_eq!(lazy.get().unwrap().sample_rate(), 16000);
    }

    #[test]
    fn test_build_signature_oracle_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::under(dir.path());
        let config = BiometricsConfig {
            embedding_dim: 32,
            ..Default::default()
        };

        let lazy = build_oracle(&config, &paths);
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.get().unwrap().dimension(), 32);
    }

    #[cfg(not(feature = "onnx_real"))]
    #[test]
    fn test_onnx_without_feature_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::under(dir.path());
        let config = BiometricsConfig {
            oracle: OracleKind::Onnx,
            ..Default::default()
        };

        let err = build_oracle(&config, &paths).get().err().unwrap();
        assert!(matches!(err, VoxgateError::OracleInit(_)));
    }
}
