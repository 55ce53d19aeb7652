use super::decode;
use super::transcode::Transcoder;
use super::{AudioSample, CanonicalWaveform};
use crate::error::{Result, VoxgateError};

/// Turns uploaded bytes into a canonical mono waveform
///
/// Direct decode is tried first; the external transcoder is only spawned
/// when no built-in decoder recognizes the input.
#[derive(Debug, Clone)]
pub struct AudioIngestor {
    transcoder: Transcoder,
}

impl AudioIngestor {
    pub fn new(transcoder: Transcoder) -> Self {
        Self { transcoder }
    }

    pub fn normalize(&self, sample: &AudioSample) -> Result<CanonicalWaveform> {
        if sample.is_empty() {
            return Err(VoxgateError::UnsupportedAudio("empty audio input".to_string()));
        }

        let hint = sample.format_hint.as_deref();

        let direct_err = match decode::decode_direct(&sample.bytes, hint) {
            Ok(waveform) => {
                log::debug!(
                    "Decoded {} bytes directly: {} samples @{}Hz",
                    sample.bytes.len(),
                    waveform.len(),
                    waveform.sample_rate()
                );
                return Ok(waveform);
            }
            Err(e) => e,
        };

        log::info!(
            "Direct decode failed ({:#}), falling back to transcoder",
            direct_err
        );

        let waveform = self.transcoder.transcode(&sample.bytes, hint)?;
        log::debug!(
            "Transcoded {} bytes: {} samples @{}Hz",
            sample.bytes.len(),
            waveform.len(),
            waveform.sample_rate()
        );
        Ok(waveform)
    }
}
