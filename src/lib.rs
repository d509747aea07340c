//! # Reeltime - sample-accurate soundfile streaming
//!
//! Streaming read and write of audio sample files on top of a realtime
//! audio-processing host. For each active stream a foreground realtime
//! callback consumes (playback) or produces (capture) fixed-size audio
//! blocks, while a background worker does the blocking disk I/O through a
//! bounded ring FIFO. Starts and stops land on exact global sample times,
//! loops cover arbitrary sub-ranges of a file with silence past EOF, and
//! capture can trigger on a signal threshold with pre-roll.
//!
//! ## Architecture
//!
//! An umbrella over two crates:
//! - **reeltime-core** - the time model: exact frame time codes, named
//!   time anchors, loop-cycle quantization, and the host capability
//!   traits (clock, file opener, event sink, graph control).
//! - **reeltime-stream** - the engines: soundfile codecs (WAV built in),
//!   PCM transfer, the byte FIFO with its worker protocol, and the
//!   playback and capture stream objects.
//!
//! ## Quick start
//!
//! ```ignore
//! use reeltime::{Engine, OpenSpec};
//!
//! let engine = Engine::builder()
//!     .clock(host_clock)
//!     .files(host_search_path)
//!     .events(host_outlets)
//!     .build();
//!
//! let anchor = engine.anchor("groove");
//! let reader = engine.reader(2);
//! reader.set_anchor(Some("groove"))?;
//! reader.open(OpenSpec { filename: "drums.wav".into(), ..Default::default() });
//! reader.start(None)?;
//!
//! // per audio block:
//! reader.process(&mut channel_slices);
//! ```

/// Re-export of reeltime-core for direct access.
pub use reeltime_core as core;

/// Re-export of reeltime-stream for direct access.
pub use reeltime_stream as stream;

// Time model
pub use reeltime_core::{
    AnchorRegistry, CollectingSink, CycleCalculator, Error, EventSink, FileOpener, FrameClock,
    FrameTimeCode, FtcAdd, FtcCompare, FtcMult, GraphControl, HostCaps, LogicalClock, LogicalTime,
    NoGraph, NullSink, Result, SearchPathOpener, StreamEvent, TimeAnchor, EPOCH_BASE,
};

// Streaming engines
pub use reeltime_stream::{
    Atom, CaptureOpenSpec, CaptureStart, CodecRegistry, LoopLength, OpenSpec, ReaderCommand,
    ReaderState, RingFifo, SoundfileCodec, SoundfileInfo, StopMode, StreamReader, StreamWriter,
    WaveCodec, WriterCommand, WriterState,
};

mod builder;
mod engine;

pub use builder::EngineBuilder;
pub use engine::Engine;
