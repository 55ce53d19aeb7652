use rubato::{FftFixedIn, Resampler};

use super::{is_supported_rate, CanonicalWaveform};
use crate::error::{Result, VoxgateError};

/// Input block size fed to the FFT resampler
const CHUNK_SIZE: usize = 1024;

/// Upper bound on resampled output (30 minutes at 16 kHz)
pub const MAX_OUTPUT_SAMPLES: usize = 16_000 * 60 * 30;

/// Resample a whole waveform to `target_rate`
///
/// The resampler's output delay is trimmed off and the result has exactly
/// `ceil(len * target / source)` samples.
pub fn resample(waveform: &CanonicalWaveform, target_rate: u32) -> Result<CanonicalWaveform> {
    let source_rate = waveform.sample_rate();
    if source_rate == target_rate {
        return Ok(waveform.clone());
    }

    if !is_supported_rate(source_rate) || !is_supported_rate(target_rate) {
        return Err(VoxgateError::UnsupportedAudio(format!(
            "cannot resample {} Hz -> {} Hz",
            source_rate, target_rate
        )));
    }

    let expected =
        (waveform.len() as u64 * target_rate as u64).div_ceil(source_rate as u64);
    if expected > MAX_OUTPUT_SAMPLES as u64 {
        return Err(VoxgateError::UnsupportedAudio(format!(
            "audio too long: {} samples after resampling, limit {}",
            expected, MAX_OUTPUT_SAMPLES
        )));
    }
    let expected = expected as usize;

    let mut resampler =
        FftFixedIn::<f32>::new(source_rate as usize, target_rate as usize, CHUNK_SIZE, 2, 1)
            .map_err(|e| VoxgateError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let chunk = resampler.input_frames_next();

    let mut remaining = waveform.samples();
    let mut output = Vec::with_capacity(expected + delay + chunk);

    // Trailing zero blocks flush the delay line
    while output.len() < expected + delay {
        let take = chunk.min(remaining.len());
        let mut block = remaining[..take].to_vec();
        block.resize(chunk, 0.0);
        remaining = &remaining[take..];

        let resampled = resampler
            .process(&[block], None)
            .map_err(|e| VoxgateError::Resample(e.to_string()))?;
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay);
    output.truncate(expected);

    log::debug!(
        "Resampled {} -> {} Hz ({} -> {} samples)",
        source_rate,
        target_rate,
        waveform.len(),
        output.len()
    );

    CanonicalWaveform::new(output, target_rate)
        .ok_or_else(|| VoxgateError::Resample("resampler produced no samples".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::tone;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let wav = CanonicalWaveform::new(tone(440.0, 16000, 500), 16000).unwrap();
        assert_eq!(resample(&wav, 16000).unwrap(), wav);
    }

    #[test]
    fn test_upsample_length_and_level() {
        let wav = CanonicalWaveform::new(tone(300.0, 8000, 8000), 8000).unwrap();
        let out = resample(&wav, 16000).unwrap();

        assert_eq!(out.sample_rate(), 16000);
        assert_eq!(out.len(), 16000);

        // Skip edges where the filter ramps
        let body = &out.samples()[2000..14000];
        let ratio = rms(body) / rms(wav.samples());
        assert!((0.9..1.1).contains(&ratio), "rms ratio {}", ratio);
    }

    #[test]
    fn test_downsample_length() {
        let wav = CanonicalWaveform::new(tone(440.0, 44100, 44100), 44100).unwrap();
        let out = resample(&wav, 16000).unwrap();
        assert_eq!(out.len(), 16000);
    }

    #[test]
    fn test_output_length_capped() {
        let wav = CanonicalWaveform::new(vec![0.0; 2_000_000], 1_000).unwrap();
        let err = resample(&wav, 16000).unwrap_err();
        assert!(matches!(err, VoxgateError::UnsupportedAudio(_)));
    }

    #[test]
    fn test_unsupported_target_rate() {
        let wav = CanonicalWaveform::new(vec![0.1; 100], 8000).unwrap();
        assert!(matches!(
            resample(&wav, 4_294_967_291),
            Err(VoxgateError::UnsupportedAudio(_))
        ));
    }

    #[test]
    fn test_short_input() {
        let wav = CanonicalWaveform::new(vec![0.25; 3], 8000).unwrap();
        let out = resample(&wav, 16000).unwrap();
        assert_eq!(out.len(), 6);
    }
}
