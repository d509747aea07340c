//! Soundfile descriptors and the open path.

use crate::codec::{CodecRegistry, SoundfileCodec};
use reeltime_core::error::{Error, Result};
use reeltime_core::host::FileOpener;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on channels per stream.
pub const MAX_CHANNELS: usize = 64;

/// Sample widths the PCM transfer layer understands, in bytes.
pub fn valid_bytes_per_sample(bytes: usize) -> bool {
    matches!(bytes, 2 | 3 | 4 | 8)
}

/// Format and geometry of an open soundfile.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundfileInfo {
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub sample_rate: f64,
    pub big_endian: bool,
    /// Offset of the first sample byte.
    pub header_size: u64,
    /// Usable sample bytes: file size minus header minus skipped onset.
    pub byte_limit: u64,
}

impl SoundfileInfo {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.bytes_per_sample
    }
}

impl Default for SoundfileInfo {
    fn default() -> Self {
        Self {
            channels: 1,
            bytes_per_sample: 2,
            sample_rate: 0.0,
            big_endian: false,
            header_size: 0,
            byte_limit: 0,
        }
    }
}

/// Parameters of a playback `open`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenSpec {
    pub filename: String,
    /// Codec forced by a `-<typename>` flag.
    pub codec: Option<String>,
    /// Sample frames to skip past the header.
    pub onset_frames: u64,
    /// `Some(n)` skips header detection and treats the first `n` bytes as
    /// header; `None` auto-detects.
    pub header_size: Option<u64>,
    /// Format fields used when detection is skipped.
    pub channels: usize,
    pub bytes_per_sample: usize,
    pub big_endian: bool,
}

/// An open file plus everything the transfer layer needs to know about it.
pub struct Soundfile {
    pub file: File,
    pub path: PathBuf,
    pub info: SoundfileInfo,
    pub codec: Option<Arc<dyn SoundfileCodec>>,
}

/// Open a soundfile through the host search path and fill in its format.
///
/// With `header_size` overridden the header is not inspected: the caller's
/// channel count, sample width and endianness are taken as given and the
/// byte limit derives from the file size. Otherwise the registered codecs
/// are asked in order; the first whose `is_header` matches reads the
/// header. Either way the onset frames are subtracted from the byte limit
/// and the descriptor is left positioned at the first usable byte.
pub fn open_soundfile(
    opener: &dyn FileOpener,
    codecs: &CodecRegistry,
    spec: &OpenSpec,
) -> Result<Soundfile> {
    let (mut file, path) = opener.open(&spec.filename)?;

    let mut info = SoundfileInfo::default();
    let mut codec = None;

    if let Some(header_size) = spec.header_size {
        // Header detection overridden: geometry comes from the caller.
        if !valid_bytes_per_sample(spec.bytes_per_sample) {
            return Err(Error::UnsupportedSampleFormat);
        }
        let file_len = file.metadata()?.len();
        info.channels = spec.channels.clamp(1, MAX_CHANNELS);
        info.bytes_per_sample = spec.bytes_per_sample;
        info.big_endian = spec.big_endian;
        info.header_size = header_size;
        info.byte_limit = file_len.saturating_sub(header_size);
    } else {
        let mut header = vec![0u8; codecs.min_header_size()];
        let bytes_read = file.read(&mut header)?;
        let chosen = match &spec.codec {
            Some(name) => codecs.find(name).ok_or(Error::UnknownHeader)?,
            None => codecs
                .detect(&header[..bytes_read])
                .ok_or(Error::UnknownHeader)?,
        };
        if spec.codec.is_some() && !chosen.is_header(&header[..bytes_read]) {
            return Err(Error::UnknownHeader);
        }
        file.seek(SeekFrom::Start(0))?;
        chosen.read_header(&mut file, &mut info)?;
        codec = Some(chosen);
    }

    let bytes_per_frame = info.bytes_per_frame() as u64;
    let skip = spec.onset_frames * bytes_per_frame;
    file.seek(SeekFrom::Start(info.header_size + skip))?;
    info.byte_limit = info.byte_limit.saturating_sub(skip);

    Ok(Soundfile {
        file,
        path,
        info,
        codec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_frame() {
        let info = SoundfileInfo {
            channels: 2,
            bytes_per_sample: 3,
            ..Default::default()
        };
        assert_eq!(info.bytes_per_frame(), 6);
    }

    #[test]
    fn test_valid_widths() {
        assert!(valid_bytes_per_sample(2));
        assert!(valid_bytes_per_sample(3));
        assert!(valid_bytes_per_sample(4));
        assert!(valid_bytes_per_sample(8));
        assert!(!valid_bytes_per_sample(1));
        assert!(!valid_bytes_per_sample(5));
    }
}
