//! Capabilities the host grants the engine at construction.
//!
//! The streaming core never calls host services directly. Everything it
//! needs from the surrounding audio host -- the logical clock, file
//! resolution, outlet emission, graph rebuilds -- arrives as a trait object
//! in [`HostCaps`].

use crate::timecode::FrameTimeCode;
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque instant on the host's logical clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalTime(pub f64);

/// The host's block-rate logical clock.
pub trait LogicalClock: Send + Sync {
    /// Current logical instant.
    fn now(&self) -> LogicalTime;

    /// Frames elapsed since `since`. Negative when `since` lies in the
    /// future.
    fn frames_since(&self, since: LogicalTime) -> f64;
}

/// Reference clock that counts frames directly.
///
/// Hosts that already run a sample counter can advance this once per block;
/// the integration tests drive it by hand.
#[derive(Debug, Default)]
pub struct FrameClock {
    frames: AtomicU64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one block of `frames`.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn set(&self, frames: u64) {
        self.frames.store(frames, Ordering::Relaxed);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl LogicalClock for FrameClock {
    fn now(&self) -> LogicalTime {
        LogicalTime(self.frames.load(Ordering::Relaxed) as f64)
    }

    fn frames_since(&self, since: LogicalTime) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 - since.0
    }
}

/// Resolves stream file names to open descriptors.
pub trait FileOpener: Send + Sync {
    /// Open an existing file for reading, searching the host path.
    fn open(&self, name: &str) -> io::Result<(File, PathBuf)>;

    /// Create (truncate) a file for writing.
    fn create(&self, name: &str) -> io::Result<(File, PathBuf)>;
}

/// Opener backed by an ordered list of search directories.
///
/// Absolute names bypass the search path. Relative names are tried against
/// each directory in order on open; created files land in the first
/// directory.
#[derive(Debug, Clone)]
pub struct SearchPathOpener {
    dirs: Vec<PathBuf>,
}

impl SearchPathOpener {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Search path containing only the current working directory.
    pub fn current_dir() -> Self {
        Self {
            dirs: vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))],
        }
    }

    pub fn push_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dirs.push(dir.into());
    }
}

impl FileOpener for SearchPathOpener {
    fn open(&self, name: &str) -> io::Result<(File, PathBuf)> {
        let path = Path::new(name);
        if path.is_absolute() {
            return File::open(path).map(|f| (f, path.to_path_buf()));
        }
        for dir in &self.dirs {
            let candidate = dir.join(path);
            if let Ok(file) = File::open(&candidate) {
                return Ok((file, candidate));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{name}: not found on search path"),
        ))
    }

    fn create(&self, name: &str) -> io::Result<(File, PathBuf)> {
        let path = Path::new(name);
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match self.dirs.first() {
                Some(dir) => dir.join(path),
                None => path.to_path_buf(),
            }
        };
        File::create(&target).map(|f| (f, target))
    }
}

/// Values a stream publishes on its outlets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent {
    /// Playback finished or was stopped.
    Done,
    /// Total usable frames in the opened file, reported once.
    TotalFrames(FrameTimeCode),
    /// The global frame at which capture actually started.
    StartTime(FrameTimeCode),
    /// Final recorded length, reported after the file closes.
    RecordedFrames(FrameTimeCode),
}

/// Receives outlet values.
///
/// Streams queue events under their own lock during a block and dispatch
/// them after the block's processing is done, so a sink never runs inside
/// the realtime section.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StreamEvent) {}
}

/// Sink that retains events for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything received so far.
    pub fn take(&self) -> Vec<StreamEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}

/// Lets the anchor registry request a signal-graph rebuild when an anchor
/// that is wired into the graph goes away.
pub trait GraphControl: Send + Sync {
    fn request_rebuild(&self);
}

/// Host without a rebuildable graph.
#[derive(Debug, Default)]
pub struct NoGraph;

impl GraphControl for NoGraph {
    fn request_rebuild(&self) {}
}

/// The complete capability set handed to every stream object.
#[derive(Clone)]
pub struct HostCaps {
    pub clock: Arc<dyn LogicalClock>,
    pub files: Arc<dyn FileOpener>,
    pub events: Arc<dyn EventSink>,
    pub graph: Arc<dyn GraphControl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clock_counts() {
        let clock = FrameClock::new();
        let origin = clock.now();
        clock.advance(64);
        clock.advance(64);
        assert_eq!(clock.frames_since(origin), 128.0);
        let later = clock.now();
        assert_eq!(clock.frames_since(later), 0.0);
    }

    #[test]
    fn test_frames_since_future_is_negative() {
        let clock = FrameClock::new();
        clock.set(100);
        let future = LogicalTime(250.0);
        assert_eq!(clock.frames_since(future), -150.0);
    }

    #[test]
    fn test_collecting_sink_drains() {
        let sink = CollectingSink::new();
        sink.emit(StreamEvent::Done);
        sink.emit(StreamEvent::TotalFrames(FrameTimeCode::from_frames(10)));
        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_search_path_opener_misses() {
        let opener = SearchPathOpener::new(vec![std::env::temp_dir()]);
        assert!(opener.open("definitely-not-a-real-file-48kHz.wav").is_err());
    }
}
