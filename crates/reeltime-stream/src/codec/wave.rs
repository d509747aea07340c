//! WAV (RIFF/WAVE) type provider.
//!
//! Little-endian only. LPCM at 16 or 24 bits and IEEE float at 32 or 64
//! bits; float files get a `fact` chunk. Unknown chunks between `fmt ` and
//! `data` are skipped.

use super::SoundfileCodec;
use crate::soundfile::SoundfileInfo;
use reeltime_core::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Header bytes for a PCM file: RIFF(12) + fmt(8+16) + data(8).
const PCM_HEADER_SIZE: u64 = 44;
/// Float files carry an 18-byte fmt and a fact chunk: 12 + 26 + 12 + 8.
const FLOAT_HEADER_SIZE: u64 = 58;
/// Offset of the fact chunk's frame count within a float header.
const FACT_FRAMES_OFFSET: u64 = 46;

pub struct WaveCodec;

impl WaveCodec {
    fn is_float(info: &SoundfileInfo) -> bool {
        info.bytes_per_sample >= 4
    }

    fn header_size_for(info: &SoundfileInfo) -> u64 {
        if Self::is_float(info) {
            FLOAT_HEADER_SIZE
        } else {
            PCM_HEADER_SIZE
        }
    }
}

fn read_exact_or_malformed(file: &mut File, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf).map_err(|_| Error::MalformedHeader)
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

impl SoundfileCodec for WaveCodec {
    fn name(&self) -> &str {
        "wave"
    }

    fn min_header_size(&self) -> usize {
        PCM_HEADER_SIZE as usize
    }

    fn is_header(&self, buf: &[u8]) -> bool {
        buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
    }

    fn read_header(&self, file: &mut File, info: &mut SoundfileInfo) -> Result<()> {
        let file_len = file.metadata()?.len();

        let mut riff = [0u8; 12];
        read_exact_or_malformed(file, &mut riff)?;
        if !self.is_header(&riff) {
            return Err(Error::UnknownHeader);
        }

        let mut position: u64 = 12;
        let mut format_seen = false;
        loop {
            let mut chunk = [0u8; 8];
            read_exact_or_malformed(file, &mut chunk)?;
            let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let size = u32_at(&chunk, 4) as u64;
            position += 8;

            match &id {
                b"fmt " => {
                    if size < 16 {
                        return Err(Error::MalformedHeader);
                    }
                    let body_len = (size as usize).min(40);
                    let mut body = vec![0u8; body_len];
                    read_exact_or_malformed(file, &mut body)?;

                    let mut format = u16_at(&body, 0);
                    if format == FORMAT_EXTENSIBLE {
                        // The real format code is the first word of the
                        // subformat GUID.
                        if body_len < 26 {
                            return Err(Error::MalformedHeader);
                        }
                        format = u16_at(&body, 24);
                    }
                    let channels = u16_at(&body, 2) as usize;
                    let sample_rate = u32_at(&body, 4) as f64;
                    let bits = u16_at(&body, 14) as usize;
                    if channels == 0 {
                        return Err(Error::MalformedHeader);
                    }
                    let bytes_per_sample = bits / 8;
                    match (format, bytes_per_sample) {
                        (FORMAT_PCM, 2) | (FORMAT_PCM, 3) => {}
                        (FORMAT_FLOAT, 4) | (FORMAT_FLOAT, 8) => {}
                        _ => return Err(Error::UnsupportedSampleFormat),
                    }

                    info.channels = channels;
                    info.bytes_per_sample = bytes_per_sample;
                    info.sample_rate = sample_rate;
                    info.big_endian = false;
                    format_seen = true;

                    let consumed = body_len as u64;
                    let skip = size - consumed + (size & 1);
                    if skip > 0 {
                        file.seek(SeekFrom::Current(skip as i64))?;
                    }
                    position += size + (size & 1);
                }
                b"data" => {
                    if !format_seen {
                        return Err(Error::MalformedHeader);
                    }
                    info.header_size = position;
                    info.byte_limit = size.min(file_len.saturating_sub(position));
                    return Ok(());
                }
                _ => {
                    let skip = size + (size & 1);
                    file.seek(SeekFrom::Current(skip as i64))?;
                    position += skip;
                }
            }

            if position >= file_len {
                return Err(Error::MalformedHeader);
            }
        }
    }

    fn write_header(&self, file: &mut File, info: &SoundfileInfo, nframes: u64) -> Result<u64> {
        let float = Self::is_float(info);
        let header_size = Self::header_size_for(info);
        let bytes_per_frame = info.bytes_per_frame() as u64;
        let data_bytes = nframes * bytes_per_frame;

        let mut header = Vec::with_capacity(header_size as usize);
        header.extend_from_slice(b"RIFF");
        let riff_size = (header_size - 8 + data_bytes).min(u32::MAX as u64) as u32;
        header.extend_from_slice(&riff_size.to_le_bytes());
        header.extend_from_slice(b"WAVE");

        header.extend_from_slice(b"fmt ");
        let fmt_size: u32 = if float { 18 } else { 16 };
        header.extend_from_slice(&fmt_size.to_le_bytes());
        let format = if float { FORMAT_FLOAT } else { FORMAT_PCM };
        header.extend_from_slice(&format.to_le_bytes());
        header.extend_from_slice(&(info.channels as u16).to_le_bytes());
        let rate = info.sample_rate as u32;
        header.extend_from_slice(&rate.to_le_bytes());
        let byte_rate = rate.saturating_mul(bytes_per_frame as u32);
        header.extend_from_slice(&byte_rate.to_le_bytes());
        header.extend_from_slice(&(bytes_per_frame as u16).to_le_bytes());
        header.extend_from_slice(&((info.bytes_per_sample * 8) as u16).to_le_bytes());
        if float {
            header.extend_from_slice(&0u16.to_le_bytes()); // cbSize
            header.extend_from_slice(b"fact");
            header.extend_from_slice(&4u32.to_le_bytes());
            header.extend_from_slice(&(nframes.min(u32::MAX as u64) as u32).to_le_bytes());
        }

        header.extend_from_slice(b"data");
        header.extend_from_slice(&(data_bytes.min(u32::MAX as u64) as u32).to_le_bytes());
        debug_assert_eq!(header.len() as u64, header_size);

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        Ok(header_size)
    }

    fn update_header(
        &self,
        file: &mut File,
        info: &SoundfileInfo,
        frames_written: u64,
    ) -> Result<()> {
        let header_size = Self::header_size_for(info);
        let data_bytes = frames_written * info.bytes_per_frame() as u64;

        file.seek(SeekFrom::Start(4))?;
        let riff_size = (header_size - 8 + data_bytes).min(u32::MAX as u64) as u32;
        file.write_all(&riff_size.to_le_bytes())?;

        if Self::is_float(info) {
            file.seek(SeekFrom::Start(FACT_FRAMES_OFFSET))?;
            file.write_all(&(frames_written.min(u32::MAX as u64) as u32).to_le_bytes())?;
        }

        file.seek(SeekFrom::Start(header_size - 4))?;
        file.write_all(&(data_bytes.min(u32::MAX as u64) as u32).to_le_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn has_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".wav") || lower.ends_with(".wave")
    }

    fn add_extension(&self, name: &str) -> String {
        format!("{name}.wav")
    }

    /// WAV sample data is little-endian regardless of what was asked for.
    fn endianness(&self, _requested: Option<bool>, _bytes_per_sample: usize) -> bool {
        false
    }
}
