//! Soundfile type providers.
//!
//! A codec owns header detection, header read/write/update, the filename
//! extension policy, and the endianness policy for its format. Codecs sit
//! in an ordered registry; on open the first codec whose `is_header`
//! matches wins, and the first registered codec is the default for writing.

pub mod wave;

use crate::soundfile::SoundfileInfo;
use reeltime_core::error::Result;
use std::fs::File;
use std::sync::Arc;

pub use wave::WaveCodec;

/// Contract every soundfile type provider implements.
pub trait SoundfileCodec: Send + Sync {
    /// Short name used in `-<typename>` flags.
    fn name(&self) -> &str;

    /// Bytes of header this codec needs to recognize a file.
    fn min_header_size(&self) -> usize;

    /// Does `buf` begin with this codec's header?
    fn is_header(&self, buf: &[u8]) -> bool;

    /// Parse the header, filling channels, sample rate, sample width,
    /// endianness, header size and byte limit. The file is positioned at
    /// the start.
    fn read_header(&self, file: &mut File, info: &mut SoundfileInfo) -> Result<()>;

    /// Write a header for `nframes` frames of `info`-shaped audio; returns
    /// the header size.
    fn write_header(&self, file: &mut File, info: &SoundfileInfo, nframes: u64) -> Result<u64>;

    /// Patch the header of a finished file with the real frame count.
    fn update_header(&self, file: &mut File, info: &SoundfileInfo, frames_written: u64)
        -> Result<()>;

    /// Does `name` already carry one of this codec's extensions?
    fn has_extension(&self, name: &str) -> bool;

    /// `name` with this codec's default extension appended.
    fn add_extension(&self, name: &str) -> String;

    /// Resolve a requested endianness (`None` = don't care) against what
    /// the format allows; returns the endianness actually used.
    fn endianness(&self, requested: Option<bool>, bytes_per_sample: usize) -> bool;
}

/// Ordered collection of codecs with first-match detection.
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn SoundfileCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Registry with the built-in types; WAV first, making it the default.
    pub fn with_default_types() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WaveCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn SoundfileCodec>) {
        self.codecs.push(codec);
    }

    /// First codec recognizing `header`.
    pub fn detect(&self, header: &[u8]) -> Option<Arc<dyn SoundfileCodec>> {
        self.codecs
            .iter()
            .find(|codec| codec.is_header(header))
            .cloned()
    }

    /// Codec by flag name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn SoundfileCodec>> {
        self.codecs
            .iter()
            .find(|codec| codec.name() == name)
            .cloned()
    }

    /// Codec whose extension matches `filename`.
    pub fn by_extension(&self, filename: &str) -> Option<Arc<dyn SoundfileCodec>> {
        self.codecs
            .iter()
            .find(|codec| codec.has_extension(filename))
            .cloned()
    }

    /// The default (first-registered) codec.
    pub fn default_codec(&self) -> Option<Arc<dyn SoundfileCodec>> {
        self.codecs.first().cloned()
    }

    /// Largest `min_header_size` across the registered codecs.
    pub fn min_header_size(&self) -> usize {
        self.codecs
            .iter()
            .map(|codec| codec.min_header_size())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_default_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_wave_first() {
        let registry = CodecRegistry::with_default_types();
        assert_eq!(registry.default_codec().unwrap().name(), "wave");
        assert!(registry.min_header_size() > 0);
    }

    #[test]
    fn test_find_by_name_and_extension() {
        let registry = CodecRegistry::with_default_types();
        assert!(registry.find("wave").is_some());
        assert!(registry.find("aiff").is_none());
        assert!(registry.by_extension("take1.wav").is_some());
        assert!(registry.by_extension("take1.aif").is_none());
    }

    #[test]
    fn test_detect_first_match() {
        let registry = CodecRegistry::with_default_types();
        let mut header = vec![0u8; 44];
        header[0..4].copy_from_slice(b"RIFF");
        header[8..12].copy_from_slice(b"WAVE");
        assert!(registry.detect(&header).is_some());
        assert!(registry.detect(b"not a header").is_none());
    }
}
