//! # Short-Time Fourier Transform
//!
//! Forward and inverse STFT used by the phase vocoder.
//!
//! ## Framing:
//! - Periodic Hann window of `n_fft` samples
//! - Frames are centered: the signal is zero-padded by `n_fft / 2` on both sides, so
//!   frame `t` is centered on sample `t * hop_length`
//! - Only the non-negative frequency bins (`n_fft / 2 + 1`) are stored
//!
//! The inverse uses windowed overlap-add divided by the summed squared window, which
//! reconstructs the input exactly for any hop that keeps the window sum non-zero.

use anyhow::{bail, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// FFT size used by the anonymizer (≈93 ms at 22.05 kHz).
pub const N_FFT: usize = 2048;

/// Hop between frames (75% overlap).
pub const HOP_LENGTH: usize = N_FFT / 4;

/// STFT frames, indexed `[frame][bin]`.
pub type Spectrogram = Vec<Vec<Complex<f32>>>;

/// Planned forward/inverse FFTs plus the analysis window.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        if n_fft < 2 || n_fft % 2 != 0 {
            bail!("FFT size must be an even number >= 2, got {}", n_fft);
        }
        if hop_length == 0 || hop_length > n_fft {
            bail!("Hop length must be in 1..={}, got {}", n_fft, hop_length);
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Centered STFT of `signal`. Always yields at least one frame.
    pub fn forward(&self, signal: &[f32]) -> Spectrogram {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let n_bins = self.n_bins();
        let mut frames = Vec::with_capacity(n_frames);
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.n_fft];

        for t in 0..n_frames {
            let start = t * self.hop_length;
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.forward.process(&mut buf);
            frames.push(buf[..n_bins].to_vec());
        }

        frames
    }

    /// Inverse of [`Stft::forward`], trimmed or zero-padded to exactly `length` samples.
    pub fn inverse(&self, frames: &Spectrogram, length: usize) -> Result<Vec<f32>> {
        if frames.is_empty() {
            return Ok(vec![0.0; length]);
        }

        let n_bins = self.n_bins();
        let half = self.n_fft / 2;
        let expected_len = self.n_fft + self.hop_length * (frames.len() - 1);
        let mut signal = vec![0.0f32; expected_len];
        let mut window_sum = vec![0.0f32; expected_len];
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (t, frame) in frames.iter().enumerate() {
            if frame.len() != n_bins {
                bail!("Frame {} has {} bins, expected {}", t, frame.len(), n_bins);
            }

            // Rebuild the full Hermitian spectrum of a real signal
            buf[..n_bins].copy_from_slice(frame);
            buf[0].im = 0.0;
            buf[half].im = 0.0;
            for k in 1..half {
                buf[self.n_fft - k] = frame[k].conj();
            }
            self.inverse.process(&mut buf);

            let start = t * self.hop_length;
            for (i, value) in buf.iter().enumerate() {
                let w = self.window[i];
                signal[start + i] += value.re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, &w) in signal.iter_mut().zip(&window_sum) {
            if w > f32::MIN_POSITIVE {
                *sample /= w;
            }
        }

        // Drop the centering pad
        let mut out: Vec<f32> = signal.into_iter().skip(half).take(length).collect();
        out.resize(length, 0.0);
        Ok(out)
    }
}

/// Periodic Hann window (the DFT-even variant used for spectral analysis).
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / size as f32).cos())
        .collect()
}
