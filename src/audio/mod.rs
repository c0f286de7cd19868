//! # Audio Processing Module
//!
//! Everything needed to turn an uploaded recording into an anonymized WAV file.
//!
//! ## Key Components:
//! - **AudioBuffer**: mono `f32` samples plus their sample rate
//! - **Decoder**: probes and decodes WAV/FLAC/MP3/OGG/AAC uploads with Symphonia
//! - **Encoder**: writes 16-bit PCM WAV output
//! - **STFT / effects**: phase-vocoder time stretch, pitch shift, resampling
//! - **Pipeline**: the fixed anonymization chain (pitch → stretch → noise → normalize)
//!
//! ## Processing Model:
//! Every step works on the whole in-memory buffer. There is no chunking or streaming;
//! uploads are short voice reports, so holding them fully in memory is fine.

pub mod buffer;       // AudioBuffer type, noise and normalization
pub mod decode;       // File → AudioBuffer
pub mod effects;      // Time stretch, pitch shift, resampling
pub mod encode;       // AudioBuffer → WAV file
pub mod pipeline;     // The anonymization chain
pub mod stft;         // Short-time Fourier transform and its inverse

pub use buffer::AudioBuffer;
pub use pipeline::anonymize_file;
