//! Shared fixtures for the integration tests: a hand-driven frame clock,
//! a collecting event sink, temp-dir soundfile fixtures, and block-level
//! drivers that keep the asynchronous workers deterministic.

#![allow(dead_code)]

use reeltime::{
    CollectingSink, Engine, FrameClock, FrameTimeCode, ReaderState, SearchPathOpener, StreamEvent,
    StreamReader, StreamWriter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct TestHost {
    pub engine: Engine,
    pub clock: Arc<FrameClock>,
    pub sink: Arc<CollectingSink>,
    pub dir: PathBuf,
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("reeltime_it_{}_{}", std::process::id(), name))
}

pub fn setup_temp_dir(name: &str) -> PathBuf {
    let dir = temp_dir(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn cleanup_temp_dir(name: &str) {
    let _ = std::fs::remove_dir_all(temp_dir(name));
}

/// Engine wired to a manual clock, a collecting sink, and a temp search
/// path named after the test.
pub fn test_host(name: &str) -> TestHost {
    let dir = setup_temp_dir(name);
    let clock = Arc::new(FrameClock::new());
    let sink = Arc::new(CollectingSink::new());
    let engine = Engine::builder()
        .clock(clock.clone())
        .files(Arc::new(SearchPathOpener::new(vec![dir.clone()])))
        .events(sink.clone())
        .sample_rate(44_100.0)
        .build();
    TestHost {
        engine,
        clock,
        sink,
        dir,
    }
}

pub fn ftc(frames: i64) -> FrameTimeCode {
    FrameTimeCode::from_frames(frames)
}

/// Mono 16-bit WAV whose sample `n` decodes to exactly `n / 32768`.
pub fn write_ramp_wav(dir: &PathBuf, name: &str, frames: usize) -> PathBuf {
    assert!(frames < 32_768);
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for n in 0..frames {
        writer.write_sample(n as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// The float a ramp-file frame decodes to.
pub fn ramp_value(frame: i64) -> f32 {
    frame as f32 / 32_768.0
}

pub fn wait_until(mut condition: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Run one playback block at the current clock without advancing it.
pub fn process_block(reader: &StreamReader, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; frames];
    let mut slices = [out.as_mut_slice()];
    reader.process(&mut slices);
    out
}

/// Process until the worker has opened the file and the length has been
/// reported (Startup -> Startup2).
pub fn run_until_armed(reader: &StreamReader, frames: usize) {
    assert!(
        wait_until(
            || {
                let _ = process_block(reader, frames);
                !matches!(reader.state(), ReaderState::Startup)
            },
            5_000,
        ),
        "reader never finished opening"
    );
}

/// Start playback and prime it with one silent block at the current
/// clock, giving the worker a chance to resync before time advances.
pub fn begin_playback(reader: &StreamReader, at: Option<FrameTimeCode>, frames: usize) {
    reader.start(at).unwrap();
    let _ = process_block(reader, frames);
}

/// One sample-accurate playback block: waits for the FIFO to cover it,
/// processes, then advances the clock past it.
pub fn stream_block(
    reader: &StreamReader,
    clock: &FrameClock,
    frames: usize,
    bytes_per_frame: usize,
) -> Vec<f32> {
    assert!(
        wait_until(
            || {
                if reader.buffered_bytes() >= frames * bytes_per_frame
                    || reader.is_eof()
                    || reader.state() != ReaderState::Stream
                {
                    return true;
                }
                // A silent block at the same clock keeps the worker fed.
                let _ = process_block(reader, frames);
                false
            },
            5_000,
        ),
        "playback FIFO never filled"
    );
    let out = process_block(reader, frames);
    clock.advance(frames as u64);
    out
}

/// One capture block at the current clock, then advance past it.
pub fn feed_block(writer: &StreamWriter, clock: &FrameClock, values: &[f32]) {
    let slices = [values];
    writer.process(&slices);
    clock.advance(values.len() as u64);
}

/// Capture input whose sample at global frame `t` decodes to exactly
/// `t % 32768` in a 16-bit file.
pub fn timeline_block(start: u64, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|offset| ramp_value(((start + offset as u64) % 32_768) as i64))
        .collect()
}

/// Drain the sink, returning only the events matching `keep`.
pub fn take_events(sink: &CollectingSink) -> Vec<StreamEvent> {
    sink.take()
}

pub fn read_wav_i16(path: &PathBuf) -> Vec<i16> {
    let mut reader = hound::WavReader::open(path).unwrap();
    reader.samples::<i16>().map(|sample| sample.unwrap()).collect()
}

pub fn assert_silent(samples: &[f32]) {
    assert!(
        samples.iter().all(|sample| *sample == 0.0),
        "expected silence, got {:?}...",
        &samples[..samples.len().min(8)]
    );
}
