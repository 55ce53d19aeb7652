//! Direct decoding of self-describing PCM containers
//!
//! WAV goes through `hound`; anything else symphonia can probe (FLAC,
//! OGG/Vorbis, ...) goes through symphonia. Both paths keep the source
//! sample rate and fold channels down to mono.

use anyhow::{anyhow, Context, Result};
use std::io::{self, Cursor};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{is_supported_rate, CanonicalWaveform, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// Decode bytes without any external tooling
pub fn decode_direct(bytes: &[u8], hint: Option<&str>) -> Result<CanonicalWaveform> {
    let wav_err = match decode_wav(bytes) {
        Ok(waveform) => return Ok(waveform),
        Err(e) => e,
    };
    log::debug!("hound could not decode input: {:#}", wav_err);

    decode_with_probe(bytes, hint)
        .map_err(|e| anyhow!("not a WAV file ({:#}); probe failed ({:#})", wav_err, e))
}

/// Decode a RIFF/WAVE buffer
pub fn decode_wav(bytes: &[u8]) -> Result<CanonicalWaveform> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).context("Invalid WAV header")?;
    let spec = reader.spec();
    check_rate(spec.sample_rate)?;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("Failed to read integer samples")?
        }
    };

    log::debug!(
        "Decoded WAV: {} Hz, {} channels, {} bits, {} samples",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        interleaved.len()
    );

    CanonicalWaveform::from_interleaved(&interleaved, spec.channels as usize, spec.sample_rate)
        .context("WAV contains no audio samples")
}

/// Decode any container/codec pair symphonia recognizes
pub fn decode_with_probe(bytes: &[u8], hint: Option<&str>) -> Result<CanonicalWaveform> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(extension) = hint {
        probe_hint.with_extension(extension);
    }

    let mut format = symphonia::default::get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized container")?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e).context("Failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("Decoder failed"),
        }
    }

    let sample_rate = sample_rate.context("Stream has no sample rate")?;
    check_rate(sample_rate)?;
    let channels = channels.unwrap_or(1);

    log::debug!(
        "Decoded via probe: {} Hz, {} channels, {} samples",
        sample_rate,
        channels,
        interleaved.len()
    );

    CanonicalWaveform::from_interleaved(&interleaved, channels, sample_rate)
        .context("Stream contains no audio samples")
}

fn check_rate(sample_rate: u32) -> Result<()> {
    if !is_supported_rate(sample_rate) {
        return Err(anyhow!(
            "unsupported sample rate {} Hz (accepted {}..={})",
            sample_rate,
            MIN_SAMPLE_RATE,
            MAX_SAMPLE_RATE
        ));
    }
    Ok(())
}
