//! # Voice Effects
//!
//! Duration and pitch manipulation on whole mono buffers.
//!
//! ## Building Blocks:
//! - **time_stretch**: phase vocoder over the STFT; changes duration, keeps pitch
//! - **resample**: band-limited sinc interpolation (rubato); changes both
//! - **pitch_shift**: stretch by `2^(-n/12)` then resample back, which moves the pitch
//!   by `n` semitones and restores the original duration
//!
//! Each function takes and returns plain sample slices/vectors so the pipeline can
//! chain them without caring about sample rates: none of these steps changes the rate
//! the result is meant to be played at.

use super::stft::{Spectrogram, Stft, HOP_LENGTH, N_FFT};
use anyhow::{bail, Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::num_complex::Complex;
use std::f32::consts::TAU;

/// Change the duration of `samples` by `1 / rate` without changing pitch.
///
/// `rate > 1` speeds up (shorter output), `rate < 1` slows down. The output has
/// `round(len / rate)` samples.
pub fn time_stretch(samples: &[f32], rate: f64) -> Result<Vec<f32>> {
    if !rate.is_finite() || rate <= 0.0 {
        bail!("Time stretch rate must be a positive number, got {}", rate);
    }
    if samples.is_empty() {
        bail!("Cannot time-stretch an empty signal");
    }

    let stft = Stft::new(N_FFT, HOP_LENGTH)?;
    let spectrogram = stft.forward(samples);
    let stretched = phase_vocoder(&spectrogram, rate, stft.hop_length(), stft.n_fft());

    let target_len = (samples.len() as f64 / rate).round() as usize;
    stft.inverse(&stretched, target_len)
        .context("Failed to reconstruct time-stretched signal")
}

/// Shift the pitch of `samples` by `n_steps` semitones, keeping the length.
pub fn pitch_shift(samples: &[f32], n_steps: f32) -> Result<Vec<f32>> {
    if !n_steps.is_finite() {
        bail!("Pitch shift steps must be finite, got {}", n_steps);
    }

    let rate = 2f64.powf(-(n_steps as f64) / 12.0);
    let stretched = time_stretch(samples, rate)?;

    // Playing the stretched signal back `1 / rate` times faster is the same as
    // resampling it by `rate` at a fixed playback rate
    let shifted = resample(&stretched, rate)?;
    Ok(fix_length(shifted, samples.len()))
}

/// Resample by `ratio` (output rate / input rate).
///
/// The resampler's group delay is removed, so output sample `i` lines up with input
/// time `i / ratio`. The result has `ceil(len * ratio)` samples.
pub fn resample(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    if !ratio.is_finite() || ratio <= 0.0 {
        bail!("Resample ratio must be a positive number, got {}", ratio);
    }
    if samples.is_empty() {
        bail!("Cannot resample an empty signal");
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;

    // rubato works on one Vec per channel
    let waves_in = vec![samples.to_vec()];
    let mut output = resampler
        .process(&waves_in, None)
        .context("Resampling failed")?
        .remove(0);

    // Flush the filter tail until the delayed signal is fully out
    while output.len() < delay + target_len {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .context("Resampling failed while flushing")?
            .remove(0);
        if tail.is_empty() {
            break;
        }
        output.extend_from_slice(&tail);
    }

    let aligned: Vec<f32> = output.into_iter().skip(delay).collect();
    Ok(fix_length(aligned, target_len))
}

/// Truncate or zero-pad `samples` to exactly `len`.
pub fn fix_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}

/// Re-time STFT frames by `rate` while keeping each bin's phase coherent.
///
/// Output frame `t` is read at fractional input position `t * rate`. Magnitudes are
/// linearly interpolated between the two neighbouring input frames; phase advances by
/// the bin's expected advance per hop plus the measured (wrapped) deviation.
fn phase_vocoder(frames: &Spectrogram, rate: f64, hop_length: usize, n_fft: usize) -> Spectrogram {
    let n_bins = n_fft / 2 + 1;
    let n_in = frames.len();
    let n_out = (n_in as f64 / rate).ceil() as usize;
    let zero = vec![Complex::new(0.0f32, 0.0); n_bins];

    // Expected phase advance per hop for each bin, reduced mod 2π so f32 keeps precision
    let phi_advance: Vec<f32> = (0..n_bins)
        .map(|k| {
            let advance = std::f64::consts::PI * hop_length as f64 * k as f64 / (n_bins - 1) as f64;
            advance.rem_euclid(std::f64::consts::TAU) as f32
        })
        .collect();

    let mut phase_acc: Vec<f32> = frame_at(frames, &zero, 0).iter().map(|c| c.arg()).collect();
    let mut out = Vec::with_capacity(n_out);

    for t in 0..n_out {
        let step = t as f64 * rate;
        let idx = step.floor() as usize;
        let alpha = (step - step.floor()) as f32;
        let current = frame_at(frames, &zero, idx);
        let next = frame_at(frames, &zero, idx + 1);

        let mut frame = Vec::with_capacity(n_bins);
        for k in 0..n_bins {
            let magnitude = (1.0 - alpha) * current[k].norm() + alpha * next[k].norm();
            frame.push(Complex::from_polar(magnitude, phase_acc[k]));

            let mut delta = next[k].arg() - current[k].arg() - phi_advance[k];
            delta -= TAU * (delta / TAU).round();
            phase_acc[k] = (phase_acc[k] + phi_advance[k] + delta).rem_euclid(TAU);
        }
        out.push(frame);
    }

    out
}

/// Frame `idx`, or silence past the end.
fn frame_at<'a>(frames: &'a Spectrogram, zero: &'a [Complex<f32>], idx: usize) -> &'a [Complex<f32>] {
    frames.get(idx).map(Vec::as_slice).unwrap_or(zero)
}
