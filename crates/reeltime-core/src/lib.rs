//! Shared sample-time model for the reeltime streaming engine.
//!
//! Provides the exact frame-count representation, named time anchors,
//! loop-cycle quantization, and the capability traits through which the
//! streaming engines talk to their audio host.

pub mod anchor;
pub mod combinators;
pub mod cycles;
pub mod error;
pub mod host;
pub mod timecode;

pub use anchor::{AnchorRegistry, TimeAnchor};
pub use combinators::{FtcAdd, FtcCompare, FtcMult};
pub use cycles::{
    loop_position_from_clock_time, loop_start_from_clock_time, loops_containing_duration,
    CycleCalculator,
};
pub use error::{Error, Result};
pub use host::{
    CollectingSink, EventSink, FileOpener, FrameClock, GraphControl, HostCaps, LogicalClock,
    LogicalTime, NoGraph, NullSink, SearchPathOpener, StreamEvent,
};
pub use timecode::{FrameTimeCode, EPOCH_BASE};
