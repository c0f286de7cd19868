//! WAV output.

use super::AudioBuffer;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write a mono buffer as a 16-bit PCM WAV file.
///
/// Samples are clamped to [-1.0, 1.0] before quantisation so a full-scale peak maps
/// to `i16::MAX` rather than wrapping.
#[allow(deprecated)] // the `wav` crate is flagged unmaintained upstream
pub fn write_wav<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let path = path.as_ref();
    if audio.is_empty() {
        bail!("Refusing to write an empty WAV file");
    }

    let pcm: Vec<i16> = audio
        .samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
        .collect();

    let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, audio.sample_rate, 16);
    let file = File::create(path)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    wav::write(header, &wav::BitDepth::Sixteen(pcm), &mut writer)
        .with_context(|| format!("Failed to write WAV file: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush WAV file: {}", path.display()))?;

    Ok(())
}
