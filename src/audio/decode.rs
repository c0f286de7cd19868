//! # Audio Decoding
//!
//! Loads an uploaded file into a mono [`AudioBuffer`] at its native sample rate.
//!
//! The container and codec are probed from the file contents, with the file extension
//! passed along as a hint. Multi-channel audio is mixed down by averaging the channels
//! of each frame. No resampling happens here.

use super::AudioBuffer;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode an audio file into mono `f32` samples.
///
/// ## Errors:
/// - the file cannot be opened
/// - the format is not recognised or has no decodable audio track
/// - the stream declares no sample rate
/// - the stream decodes to zero samples
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let src = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unsupported or corrupt audio file")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No supported audio track found"))?;

    let track_id = track.id;
    let declared_rate = track.codec_params.sample_rate;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("No decoder available for audio codec")?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = declared_rate;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream
            Err(Error::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => bail!("Audio stream changed mid-file; cannot decode"),
            Err(e) => return Err(anyhow!(e).context("Failed to read audio packet")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);

                let channels = spec.channels.count().max(1);
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);

                if channels == 1 {
                    samples.extend_from_slice(sample_buf.samples());
                } else {
                    // Interleaved frames -> average to mono
                    samples.extend(
                        sample_buf
                            .samples()
                            .chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                    );
                }
            }
            // A damaged packet is skipped; the rest of the stream may still be usable
            Err(Error::DecodeError(msg)) => {
                tracing::warn!(path = %path.display(), error = %msg, "Skipping undecodable packet");
            }
            Err(e) => return Err(anyhow!(e).context("Failed to decode audio")),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("Audio stream has no sample rate"))?;
    if samples.is_empty() {
        bail!("Audio file contains no samples");
    }

    tracing::debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "Decoded audio"
    );

    Ok(AudioBuffer::new(samples, sample_rate))
}
