//! # Audio Buffer
//!
//! The in-memory representation that flows between pipeline steps, plus the two
//! sample-wise operations that finish the chain: additive noise and peak normalization.

use anyhow::{bail, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Mono audio samples with their sample rate.
///
/// ## Invariants:
/// - Samples are mono; decoders mix multi-channel input down before building a buffer
/// - `sample_rate` is the native rate of the source file and is never changed by the
///   pipeline (pitch shift resamples internally but restores the original rate)
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Audio samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Largest absolute sample value (0.0 for an empty buffer).
    pub fn peak(&self) -> f32 {
        peak_amplitude(&self.samples)
    }
}

/// Largest absolute value in `samples`.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Add white Gaussian noise with mean 0 and the given standard deviation.
///
/// One independent draw per sample. The generator is passed in so callers decide
/// whether the noise is reproducible (seeded) or not (entropy-seeded).
pub fn add_gaussian_noise<R: Rng + ?Sized>(
    samples: &mut [f32],
    std_dev: f32,
    rng: &mut R,
) -> Result<()> {
    let normal = Normal::new(0.0f32, std_dev)
        .map_err(|e| anyhow::anyhow!("Invalid noise standard deviation {}: {}", std_dev, e))?;

    for sample in samples.iter_mut() {
        *sample += normal.sample(rng);
    }

    Ok(())
}

/// Divide every sample by the peak absolute amplitude so the new peak is exactly 1.0.
///
/// ## Errors:
/// A buffer whose peak is zero (silence, or empty) cannot be normalized; that is
/// reported rather than producing NaNs. A non-finite peak means an earlier step
/// blew up and is reported too.
pub fn peak_normalize(samples: &mut [f32]) -> Result<()> {
    if samples.is_empty() {
        bail!("Cannot normalize an empty signal");
    }

    let peak = peak_amplitude(samples);
    if !peak.is_finite() {
        bail!("Cannot normalize signal: peak amplitude is not finite");
    }
    if peak == 0.0 {
        bail!("Cannot normalize silent signal: peak amplitude is zero");
    }

    for sample in samples.iter_mut() {
        *sample /= peak;
    }

    Ok(())
}
