//! # Anonymization Pipeline
//!
//! The fixed transform chain that makes a voice hard to recognise while keeping the
//! words intelligible.
//!
//! ## Steps (always in this order, each on the whole buffer):
//! 1. **Decode** the upload to mono `f32` at its native sample rate
//! 2. **Pitch shift** up by 4 semitones
//! 3. **Time stretch** by a rate of 0.95 (slightly slower)
//! 4. **Noise masking**: add white Gaussian noise (σ = 0.002), fresh per run
//! 5. **Peak normalize** so the loudest sample is exactly ±1.0
//! 6. **Encode** as 16-bit PCM WAV at the original sample rate
//!
//! ## Key Rust Concepts:
//! - **Generic over `Rng`**: the noise source is a parameter, so tests can pass a
//!   seeded `StdRng` and get reproducible output while the service uses fresh entropy
//! - **`?` with anyhow::Context**: every failure carries a readable chain that ends up
//!   in the HTTP error body

use super::buffer::{add_gaussian_noise, peak_normalize};
use super::{decode, effects, encode, AudioBuffer};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::time::Instant;

/// Parameters of the anonymization chain.
///
/// The service always runs with [`AnonymizeParams::default`]; the struct exists so the
/// individual steps can be exercised in isolation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizeParams {
    /// Pitch shift in semitones (positive = higher)
    pub pitch_steps: f32,
    /// Time stretch rate (< 1.0 = slower, longer output)
    pub stretch_rate: f64,
    /// Standard deviation of the additive Gaussian noise
    pub noise_std: f32,
}

impl Default for AnonymizeParams {
    fn default() -> Self {
        Self {
            pitch_steps: 4.0,
            stretch_rate: 0.95,
            noise_std: 0.002,
        }
    }
}

/// Summary of one file-level pipeline run, used for logging.
#[derive(Debug, Clone)]
pub struct AnonymizeReport {
    pub input_samples: usize,
    pub output_samples: usize,
    pub sample_rate: u32,
    pub output_peak: f32,
    pub elapsed_ms: u64,
}

/// Run the transform chain on an in-memory buffer.
///
/// ## Returns:
/// A new buffer at the same sample rate, `round(len / stretch_rate)` samples long,
/// whose peak absolute value is 1.0.
///
/// ## Errors:
/// - empty input
/// - invalid parameters (non-positive stretch rate, negative noise σ)
/// - a signal that is still exactly zero after noise is added (cannot be normalized)
pub fn anonymize<R: Rng + ?Sized>(
    audio: &AudioBuffer,
    params: &AnonymizeParams,
    rng: &mut R,
) -> Result<AudioBuffer> {
    if audio.is_empty() {
        anyhow::bail!("Audio contains no samples");
    }

    let shifted = effects::pitch_shift(&audio.samples, params.pitch_steps)
        .context("Pitch shift failed")?;

    let mut stretched = effects::time_stretch(&shifted, params.stretch_rate)
        .context("Time stretch failed")?;

    add_gaussian_noise(&mut stretched, params.noise_std, rng)
        .context("Noise masking failed")?;

    peak_normalize(&mut stretched).context("Normalization failed")?;

    Ok(AudioBuffer::new(stretched, audio.sample_rate))
}

/// Decode `input`, anonymize it with fresh noise, and write a WAV file to `output`.
///
/// The input file is only read. Exactly one file, `output`, is written, and only once
/// every transform step has succeeded.
pub fn anonymize_file(input: &Path, output: &Path) -> Result<AnonymizeReport> {
    let mut rng = StdRng::from_entropy();
    anonymize_file_with_rng(input, output, &AnonymizeParams::default(), &mut rng)
}

/// [`anonymize_file`] with explicit parameters and noise source.
pub fn anonymize_file_with_rng<R: Rng + ?Sized>(
    input: &Path,
    output: &Path,
    params: &AnonymizeParams,
    rng: &mut R,
) -> Result<AnonymizeReport> {
    let started = Instant::now();

    let audio = decode::decode_file(input).context("Failed to decode audio")?;
    let anonymized = anonymize(&audio, params, rng)?;
    encode::write_wav(output, &anonymized).context("Failed to write anonymized audio")?;

    let report = AnonymizeReport {
        input_samples: audio.len(),
        output_samples: anonymized.len(),
        sample_rate: anonymized.sample_rate,
        output_peak: anonymized.peak(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        input_samples = report.input_samples,
        output_samples = report.output_samples,
        sample_rate = report.sample_rate,
        input_secs = audio.duration_secs(),
        output_secs = anonymized.duration_secs(),
        elapsed_ms = report.elapsed_ms,
        "Audio anonymized"
    );

    Ok(report)
}

#[cfg(test)]
#[allow(deprecated)] // `wav` is only used to build and inspect fixtures
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::fs::File;

    fn voice_like(len: usize, sample_rate: u32) -> AudioBuffer {
        // Fundamental plus two harmonics, roughly speech-shaped
        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.4 * (2.0 * PI * 180.0 * t).sin()
                    + 0.2 * (2.0 * PI * 360.0 * t).sin()
                    + 0.1 * (2.0 * PI * 540.0 * t).sin()
            })
            .collect();
        AudioBuffer::new(samples, sample_rate)
    }

    fn read_wav(path: &Path) -> (wav::Header, Vec<i16>) {
        let mut file = File::open(path).unwrap();
        let (header, data) = wav::read(&mut file).unwrap();
        match data {
            wav::BitDepth::Sixteen(samples) => (header, samples),
            other => panic!("unexpected bit depth: {:?}", other),
        }
    }

    #[test]
    fn test_default_params() {
        let params = AnonymizeParams::default();
        assert_eq!(params.pitch_steps, 4.0);
        assert_eq!(params.stretch_rate, 0.95);
        assert_eq!(params.noise_std, 0.002);
    }

    #[test]
    fn test_anonymize_normalizes_and_keeps_rate() {
        let audio = voice_like(16000, 16000);
        let mut rng = StdRng::seed_from_u64(42);

        let out = anonymize(&audio, &AnonymizeParams::default(), &mut rng).unwrap();

        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.len(), (16000.0f64 / 0.95).round() as usize);
        assert!((out.peak() - 1.0).abs() < 1e-6);
        assert!(out.samples.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_noise_differs_between_runs_but_length_does_not() {
        let audio = voice_like(8000, 16000);
        let params = AnonymizeParams::default();

        let a = anonymize(&audio, &params, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = anonymize(&audio, &params, &mut StdRng::seed_from_u64(2)).unwrap();

        assert_eq!(a.len(), b.len());
        assert_ne!(a.samples, b.samples);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let audio = voice_like(4000, 8000);
        let params = AnonymizeParams::default();

        let a = anonymize(&audio, &params, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = anonymize(&audio, &params, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn test_silence_without_noise_is_an_error() {
        let audio = AudioBuffer::new(vec![0.0; 4000], 16000);
        let params = AnonymizeParams {
            noise_std: 0.0,
            ..AnonymizeParams::default()
        };

        let err = anonymize(&audio, &params, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(format!("{:#}", err).contains("silent"));
    }

    #[test]
    fn test_silence_with_noise_still_normalizes() {
        let audio = AudioBuffer::new(vec![0.0; 4000], 16000);
        let out = anonymize(&audio, &AnonymizeParams::default(), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!((out.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_audio_is_an_error() {
        let audio = AudioBuffer::new(Vec::new(), 16000);
        assert!(anonymize(&audio, &AnonymizeParams::default(), &mut StdRng::seed_from_u64(0))
            .is_err());
    }

    #[test]
    fn test_anonymize_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.wav");
        let output = dir.path().join("output.wav");
        encode::write_wav(&input, &voice_like(11025, 22050)).unwrap();
        let original_bytes = std::fs::read(&input).unwrap();

        let report = anonymize_file(&input, &output).unwrap();

        let (header, samples) = read_wav(&output);
        assert_eq!(header.sampling_rate, 22050);
        assert_eq!(header.channel_count, 1);
        assert_eq!(samples.len(), report.output_samples);
        assert_eq!(report.input_samples, 11025);
        // Full scale after normalization, never beyond
        assert_eq!(samples.iter().map(|s| s.unsigned_abs()).max(), Some(i16::MAX as u16));
        assert!(report.output_peak <= 1.0);

        // The input is read, never modified
        assert_eq!(std::fs::read(&input).unwrap(), original_bytes);
    }

    #[test]
    fn test_anonymize_file_stereo_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("stereo.wav");
        let output = dir.path().join("out.wav");

        let mono = voice_like(4410, 44100);
        let interleaved: Vec<i16> = mono
            .samples
            .iter()
            .flat_map(|&s| {
                let v = (s * 0.9 * i16::MAX as f32) as i16;
                [v, v / 2]
            })
            .collect();
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, 2, 44100, 16);
        wav::write(header, &wav::BitDepth::Sixteen(interleaved), &mut File::create(&input).unwrap())
            .unwrap();

        let report = anonymize_file(&input, &output).unwrap();
        let (header, samples) = read_wav(&output);

        assert_eq!(header.sampling_rate, 44100);
        assert_eq!(header.channel_count, 1);
        assert_eq!(report.input_samples, 4410);
        assert_eq!(samples.len(), (4410.0f64 / 0.95).round() as usize);
    }

    #[test]
    fn test_corrupt_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.wav");
        let output = dir.path().join("out.wav");
        std::fs::write(&input, b"RIFF....WAVEjunk").unwrap();

        let err = anonymize_file(&input, &output).unwrap_err();
        assert!(err.to_string().contains("Failed to decode audio"));
        assert!(!output.exists());
    }
}
