//! Sample-accurate streaming soundfile playback and capture.
//!
//! Each stream object pairs a realtime block callback with a background
//! disk worker, coupled through a bounded byte FIFO under one mutex and
//! two condition variables. Playback and capture schedule their start and
//! end against a global frame clock, loop over arbitrary sub-ranges of a
//! file with silence past EOF, and can begin on a signal threshold with
//! pre-roll.
//!
//! # Example
//!
//! ```ignore
//! use reeltime_stream::{StreamReader, OpenSpec};
//!
//! let reader = StreamReader::new(2, 0, caps, anchors, codecs);
//! reader.open(OpenSpec { filename: "drums.wav".into(), ..Default::default() });
//! reader.start(None)?;
//! // per audio block:
//! reader.process(&mut outputs);
//! ```

pub mod codec;
pub mod fifo;
pub mod message;
pub mod pcm;
pub mod reader;
pub mod shared;
pub mod soundfile;
pub mod writer;

pub use codec::{CodecRegistry, SoundfileCodec, WaveCodec};
pub use fifo::RingFifo;
pub use message::{
    ftc_from_atoms, parse_reader, parse_writer, Atom, ReaderCommand, WriterCommand,
};
pub use reader::{EndTime, LoopLength, ReaderState, StartTime, StopMode, StreamReader};
pub use shared::{Request, StreamCell, MAX_BLOCK_FRAMES, READ_SIZE, WRITE_SIZE};
pub use soundfile::{open_soundfile, OpenSpec, Soundfile, SoundfileInfo, MAX_CHANNELS};
pub use writer::{CaptureOpenSpec, CaptureStart, StreamWriter, WriterState};
