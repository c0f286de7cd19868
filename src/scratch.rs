//! # Scratch Files
//!
//! Every `/anonymize` request gets its own pair of files in the scratch directory:
//!
//! - `input_<uuid><ext>`: the raw upload, deleted when the request finishes
//! - `output_<uuid>.wav`: the anonymized result, left for the OS temp reaper
//!
//! ## Key Rust Concepts:
//! - **Drop trait**: `ScratchPair` deletes its input file in `drop`, so cleanup runs
//!   on every exit path of the handler (success, `?` early return, or panic unwind)
//!   without any explicit `finally` logic
//! - **Uuid v4**: random 122-bit identifiers make the file names unique across
//!   concurrent requests without any locking

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension used when the uploaded filename has none (or an unusable one).
const DEFAULT_EXTENSION: &str = "wav";

/// The directory that holds per-request scratch files.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory (and parents) if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create scratch directory: {}", self.root.display())
        })
    }

    /// Reserve a fresh input/output pair for an upload called `original_filename`.
    ///
    /// No files are created here; the handler writes the input and the pipeline writes
    /// the output.
    pub fn allocate(&self, original_filename: &str) -> ScratchPair {
        let id = Uuid::new_v4();
        let ext = upload_extension(original_filename);

        ScratchPair {
            id,
            input: self.root.join(format!("input_{}.{}", id, ext)),
            output: self.root.join(format!("output_{}.wav", id)),
        }
    }
}

/// One request's input/output scratch files.
///
/// Dropping the pair removes the input file if it exists. The output file is never
/// removed here: it is handed to the response and its lifetime belongs to the scratch
/// directory's owner.
#[derive(Debug)]
pub struct ScratchPair {
    pub id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Drop for ScratchPair {
    fn drop(&mut self) {
        if !self.input.exists() {
            return;
        }

        match std::fs::remove_file(&self.input) {
            Ok(()) => debug!(request_id = %self.id, path = %self.input.display(), "Removed scratch input"),
            // Best effort: a failed cleanup must never change the response
            Err(e) => warn!(
                request_id = %self.id,
                path = %self.input.display(),
                error = %e,
                "Failed to remove scratch input"
            ),
        }
    }
}

/// Extension of the uploaded filename, without the dot.
///
/// Only short alphanumeric extensions are kept; anything else falls back to `wav`
/// so a hostile filename cannot smuggle odd characters into the scratch path.
fn upload_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension("report.mp3"), "mp3");
        assert_eq!(upload_extension("Report.FLAC"), "flac");
        assert_eq!(upload_extension("archive.tar.ogg"), "ogg");
        assert_eq!(upload_extension("no_extension"), "wav");
        assert_eq!(upload_extension(".hidden"), "wav");
        assert_eq!(upload_extension("weird.w$v"), "wav");
        assert_eq!(upload_extension("../../etc/passwd"), "wav");
    }

    #[test]
    fn test_allocate_unique_pairs() {
        let scratch = ScratchDir::new("/tmp/scratch");
        let a = scratch.allocate("voice.m4a");
        let b = scratch.allocate("voice.m4a");

        assert_ne!(a.id, b.id);
        assert_ne!(a.input, b.input);
        assert_ne!(a.output, b.output);
        assert_eq!(a.input, PathBuf::from(format!("/tmp/scratch/input_{}.m4a", a.id)));
        assert_eq!(a.output, PathBuf::from(format!("/tmp/scratch/output_{}.wav", a.id)));
    }

    #[test]
    fn test_drop_removes_input_only() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let pair = scratch.allocate("clip.wav");
        std::fs::write(&pair.input, b"upload").unwrap();
        std::fs::write(&pair.output, b"result").unwrap();
        let (input, output) = (pair.input.clone(), pair.output.clone());

        drop(pair);

        assert!(!input.exists());
        assert!(output.exists());
    }

    #[test]
    fn test_drop_without_input_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let pair = ScratchDir::new(dir.path()).allocate("clip.wav");
        drop(pair);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ensure_exists_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path().join("a").join("b"));
        scratch.ensure_exists().unwrap();
        assert!(scratch.path().is_dir());
    }
}
