//! Voice authentication service
//!
//! `VoiceAuth` owns the ingestor, the lazily built oracle, the enrollment
//! store and the verification engine. It is cheap to clone and safe to share
//! across threads; `*_async` variants run the blocking work on tokio's
//! blocking pool.

use serde::Serialize;
use std::fs;
use std::sync::Arc;

use crate::audio::ingest::AudioIngestor;
use crate::audio::resample::resample;
use crate::audio::transcode::Transcoder;
use crate::audio::AudioSample;
use crate::config::AppConfig;
use crate::error::{Result, VoxgateError};
use crate::paths::AppPaths;
use crate::validation::{validate_identity, validate_threshold};
use crate::voice::biometrics::{Comparison, VerificationEngine};
use crate::voice::oracle::{build_oracle, LazyOracle};
use crate::voice::store::EnrollmentStore;
use crate::voice::VoiceEmbedding;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Enrolled {
    pub enrolled: bool,
}

/// `{"match": bool, "score": float}`
pub type VerifyResult = Comparison;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Health {
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Removed {
    pub removed: bool,
}

struct Inner {
    ingestor: AudioIngestor,
    oracle: LazyOracle,
    store: EnrollmentStore,
    engine: VerificationEngine,
}

#[derive(Clone)]
pub struct VoiceAuth {
    inner: Arc<Inner>,
}

impl VoiceAuth {
    pub fn new(
        ingestor: AudioIngestor,
        oracle: LazyOracle,
        store: EnrollmentStore,
        default_threshold: f32,
    ) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                ingestor,
                oracle,
                store,
                engine: VerificationEngine::new(default_threshold)?,
            }),
        })
    }

    /// Wire the service from resolved paths and loaded configuration
    pub fn from_config(paths: &AppPaths, config: &AppConfig) -> Result<Self> {
        let scratch = paths.tmp_audio_dir();
        fs::create_dir_all(&scratch)
            .map_err(|e| VoxgateError::io("Failed to create transcoder scratch directory", e))?;

        let transcoder = Transcoder::new(&config.transcoder, config.audio.sample_rate_hz, scratch);
        let snapshot = config
            .store
            .snapshot_path
            .clone()
            .unwrap_or_else(|| paths.snapshot_file());

        log::info!(
            "Voice auth configured: oracle={:?}, threshold={:.3}, transcoder='{}'",
            config.biometrics.oracle,
            config.biometrics.verify_threshold,
            config.transcoder.program
        );

        Self::new(
            AudioIngestor::new(transcoder),
            build_oracle(&config.biometrics, paths),
            EnrollmentStore::open(snapshot),
            config.biometrics.verify_threshold,
        )
    }

    /// Record (or replace) the voice signature for `uid`
    pub fn enroll(&self, uid: &str, sample: &AudioSample) -> Result<Enrolled> {
        let uid = validate_identity(uid)?;

        let embedding = self.embed(sample)?;
        self.inner.store.put(uid, embedding)?;

        log::info!("Enrollment complete for user '{}'", uid);
        Ok(Enrolled { enrolled: true })
    }

    /// Score `sample` against the signature enrolled for `uid`
    pub fn verify(
        &self,
        uid: &str,
        sample: &AudioSample,
        threshold: Option<f32>,
    ) -> Result<VerifyResult> {
        let uid = validate_identity(uid)?;
        let threshold = threshold.map(validate_threshold).transpose()?;

        let stored = self
            .inner
            .store
            .get(uid)?
            .ok_or_else(|| VoxgateError::NotEnrolled(uid.to_string()))?;

        let live = self.embed(sample)?;
        let result = self.inner.engine.compare(&live, &stored, threshold)?;

        log::info!(
            "Verification for user '{}': score={:.3}, threshold={:.3}, result={}",
            uid,
            result.score,
            threshold.unwrap_or(self.inner.engine.default_threshold()),
            if result.matched { "PASS" } else { "FAIL" }
        );

        Ok(result)
    }

    /// Liveness only; touches neither the oracle nor the store
    pub fn health(&self) -> Health {
        Health { ok: true }
    }

    pub fn remove(&self, uid: &str) -> Result<Removed> {
        let uid = validate_identity(uid)?;
        Ok(Removed {
            removed: self.inner.store.remove(uid)?,
        })
    }

    pub fn is_enrolled(&self, uid: &str) -> Result<bool> {
        let uid = validate_identity(uid)?;
        self.inner.store.contains(uid)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.inner.store.identities()
    }

    pub fn oracle(&self) -> &LazyOracle {
        &self.inner.oracle
    }

    pub async fn enroll_async(&self, uid: String, sample: AudioSample) -> Result<Enrolled> {
        let this = self.clone();
        run_blocking(move || this.enroll(&uid, &sample)).await
    }

    pub async fn verify_async(
        &self,
        uid: String,
        sample: AudioSample,
        threshold: Option<f32>,
    ) -> Result<VerifyResult> {
        let this = self.clone();
        run_blocking(move || this.verify(&uid, &sample, threshold)).await
    }

    pub async fn remove_async(&self, uid: String) -> Result<Removed> {
        let this = self.clone();
        run_blocking(move || this.remove(&uid)).await
    }

    /// Ingest, bring to the oracle's rate, embed
    fn embed(&self, sample: &AudioSample) -> Result<VoiceEmbedding> {
        let waveform = self.inner.ingestor.normalize(sample)?;
        let oracle = self.inner.oracle.get()?;

        let waveform = if waveform.sample_rate() != oracle.sample_rate() {
            resample(&waveform, oracle.sample_rate())?
        } else {
            waveform
        };

        let embedding = oracle.embed(&waveform)?;
        if embedding.dimension() != oracle.dimension() {
            return Err(VoxgateError::Embedding(format!(
                "oracle returned {} values, declared {}",
                embedding.dimension(),
                oracle.dimension()
            )));
        }

        log::debug!(
            "Embedded {}ms of audio -> {} dims",
            waveform.duration_ms(),
            embedding.dimension()
        );
        Ok(embedding)
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VoxgateError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::{tone, wav_bytes};
    use crate::audio::transcode::TranscoderConfig;
    use crate::audio::CanonicalWaveform;
    use crate::error::ErrorClass;
    use crate::voice::oracle::stub::SignatureOracle;
    use crate::voice::oracle::EmbeddingOracle;
    use std::path::Path;
    use std::sync::Mutex;

    fn ingestor(scratch: &Path) -> AudioIngestor {
        let config = TranscoderConfig {
            program: "/nonexistent/voxgate-ffmpeg".to_string(),
            ..Default::default()
        };
        AudioIngestor::new(Transcoder::new(&config, 16000, scratch))
    }

    fn service_with(dir: &Path, oracle: LazyOracle) -> VoiceAuth {
        VoiceAuth::new(
            ingestor(dir),
            oracle,
            EnrollmentStore::open(dir.join("embeddings.json")),
            0.7,
        )
        .unwrap()
    }

    fn service(dir: &Path) -> VoiceAuth {
        service_with(dir, signature(64))
    }

    fn signature(dim: usize) -> LazyOracle {
        LazyOracle::new(move || Ok(Arc::new(SignatureOracle::new(dim)?) as Arc<dyn EmbeddingOracle>))
    }

    fn tone_wav(freq: f32, rate: u32, len: usize) -> AudioSample {
        AudioSample::new(wav_bytes(&tone(freq, rate, len), 1, rate)).with_format_hint("wav")
    }

    #[test]
    fn test_self_match() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());
        let audio = tone_wav(220.0, 16000, 16000);

        assert_eq!(auth.enroll("alice", &audio).unwrap(), Enrolled { enrolled: true });

        let result = auth.verify("alice", &audio, Some(1.0)).unwrap();
        assert_eq!(result.score, 1.0);
        assert!(result.matched);
    }

    #[test]
    fn test_unknown_identity_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());

        for audio in [
            tone_wav(220.0, 16000, 16000),
            AudioSample::new(b"garbage bytes".to_vec()),
            AudioSample::new(Vec::new()),
        ] {
            let err = auth.verify("nobody", &audio, None).unwrap_err();
            assert!(matches!(err, VoxgateError::NotEnrolled(_)));
            assert_eq!(err.class(), ErrorClass::NotFound);
        }
        assert!(!auth.oracle().is_initialized());
    }

    #[test]
    fn test_reenrollment_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());
        let a = tone_wav(220.0, 16000, 16000);
        let b = tone_wav(900.0, 16000, 16000);

        auth.enroll("alice", &a).unwrap();
        auth.enroll("alice", &b).unwrap();

        let with_b = auth.verify("alice", &b, None).unwrap();
        let with_a = auth.verify("alice", &a, None).unwrap();
        assert_eq!(with_b.score, 1.0);
        assert!(with_b.score > with_a.score);
        assert_eq!(auth.list().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_corrupt_snapshot_then_enroll_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("embeddings.json"), b"[[[ nope").unwrap();
        let auth = service(dir.path());
        let audio = tone_wav(330.0, 16000, 8000);

        assert!(matches!(
            auth.verify("alice", &audio, None),
            Err(VoxgateError::NotEnrolled(_))
        ));
        auth.enroll("alice", &audio).unwrap();
        assert!(auth.verify("alice", &audio, None).unwrap().matched);
    }

    #[test]
    fn test_concurrent_enrolls_persist() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let auth = auth.clone();
                std::thread::spawn(move || {
                    let audio = tone_wav(200.0 + 50.0 * i as f32, 16000, 4000);
                    auth.enroll(&format!("user{}", i), &audio).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(auth.list().unwrap().len(), 8);
        for i in 0..8 {
            assert!(auth.is_enrolled(&format!("user{}", i)).unwrap());
        }
    }

    struct RecordingOracle {
        seen: Mutex<Vec<(u32, usize)>>,
    }

    impl EmbeddingOracle for RecordingOracle {
        fn embed(&self, waveform: &CanonicalWaveform) -> Result<VoiceEmbedding> {
            self.seen
                .lock()
                .unwrap()
                .push((waveform.sample_rate(), waveform.len()));
            Ok(VoiceEmbedding::new(vec![1.0, 0.5]).unwrap())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    #[test]
    fn test_waveform_reaches_oracle_at_its_rate() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(RecordingOracle {
            seen: Mutex::new(Vec::new()),
        });
        let auth = service_with(dir.path(), LazyOracle::ready(recorder.clone()));

        auth.enroll("alice", &tone_wav(300.0, 8000, 8000)).unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(16000, 16000)]);
    }

    #[test]
    fn test_dimension_mismatch_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        let audio = tone_wav(220.0, 16000, 8000);

        service_with(dir.path(), signature(64))
            .enroll("alice", &audio)
            .unwrap();

        let err = service_with(dir.path(), signature(32))
            .verify("alice", &audio, None)
            .unwrap_err();
        assert!(matches!(err, VoxgateError::DimensionMismatch { live: 32, stored: 64 }));
        assert_eq!(err.class(), ErrorClass::Internal);
    }

    #[test]
    fn test_oracle_failure_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service_with(
            dir.path(),
            LazyOracle::new(|| Err(VoxgateError::OracleInit("no model".into()))),
        );

        let err = auth
            .enroll("alice", &tone_wav(220.0, 16000, 8000))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert!(!dir.path().join("embeddings.json").exists());
    }

    #[test]
    fn test_bad_input_classes() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());

        let err = auth.enroll("", &tone_wav(220.0, 16000, 8000)).unwrap_err();
        assert!(matches!(err, VoxgateError::InvalidInput(_)));

        let err = auth
            .verify("alice", &tone_wav(220.0, 16000, 8000), Some(f32::NAN))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::BadInput);

        let err = auth.enroll("alice", &AudioSample::new(Vec::new())).unwrap_err();
        assert!(matches!(err, VoxgateError::UnsupportedAudio(_)));

        // Too short for the signature oracle
        let err = auth.enroll("alice", &tone_wav(220.0, 16000, 100)).unwrap_err();
        assert!(matches!(err, VoxgateError::Embedding(_)));
        assert!(auth.list().unwrap().is_empty());
    }

    #[test]
    fn test_absurd_header_rate_is_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());

        let mut bytes = wav_bytes(&tone(220.0, 16000, 16000), 1, 16000);
        crate::audio::decode::tests::patch_wav_rate(&mut bytes, 4_294_967_291);

        let err = auth
            .enroll("mallory", &AudioSample::new(bytes).with_format_hint("wav"))
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::BadInput);
        assert!(auth.list().unwrap().is_empty());
    }

    #[test]
    fn test_path_like_hint_still_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());
        let audio = AudioSample::new(wav_bytes(&tone(220.0, 16000, 16000), 1, 16000))
            .with_format_hint("../../tmp/x");

        assert_eq!(auth.enroll("alice", &audio).unwrap(), Enrolled { enrolled: true });
    }

    #[test]
    fn test_remove_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());
        let audio = tone_wav(220.0, 16000, 8000);

        assert_eq!(auth.health(), Health { ok: true });
        auth.enroll("alice", &audio).unwrap();

        assert_eq!(auth.remove("alice").unwrap(), Removed { removed: true });
        assert_eq!(auth.remove("alice").unwrap(), Removed { removed: false });
        assert!(matches!(
            auth.verify("alice", &audio, None),
            Err(VoxgateError::NotEnrolled(_))
        ));
    }

    #[test]
    fn test_from_config_uses_paths() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::under(dir.path());
        let auth = VoiceAuth::from_config(&paths, &AppConfig::default()).unwrap();

        assert!(paths.tmp_audio_dir().is_dir());
        auth.enroll("alice", &tone_wav(220.0, 16000, 8000)).unwrap();
        assert!(paths.snapshot_file().exists());
    }

    #[test]
    fn test_result_json_shapes() {
        assert_eq!(
            serde_json::to_value(Enrolled { enrolled: true }).unwrap(),
            serde_json::json!({"enrolled": true})
        );
        assert_eq!(
            serde_json::to_value(Health { ok: true }).unwrap(),
            serde_json::json!({"ok": true})
        );
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let auth = service(dir.path());
        let audio = tone_wav(440.0, 16000, 16000);

        auth.enroll_async("bob".to_string(), audio.clone()).await.unwrap();
        let result = auth
            .verify_async("bob".to_string(), audio, None)
            .await
            .unwrap();
        assert!(result.matched);

        let removed = auth.remove_async("bob".to_string()).await.unwrap();
        assert!(removed.removed);
    }
}
