//! Engine wiring: registries plus stream and utility constructors.

use crate::builder::EngineBuilder;
use reeltime_core::anchor::{AnchorRegistry, TimeAnchor};
use reeltime_core::combinators::{FtcAdd, FtcCompare, FtcMult};
use reeltime_core::cycles::CycleCalculator;
use reeltime_core::host::HostCaps;
use reeltime_core::timecode::FrameTimeCode;
use reeltime_stream::codec::CodecRegistry;
use reeltime_stream::reader::StreamReader;
use reeltime_stream::writer::StreamWriter;
use std::sync::Arc;

/// The attach point between a host and this library.
///
/// Owns the codec registry (WAV registered first, making it the default
/// write format) and the process-wide anchor registry, and constructs the
/// stream objects and time utilities against the host capability set.
pub struct Engine {
    caps: HostCaps,
    codecs: Arc<CodecRegistry>,
    anchors: Arc<AnchorRegistry>,
    sample_rate: f64,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn with_caps(caps: HostCaps, sample_rate: f64) -> Self {
        let codecs = Arc::new(CodecRegistry::with_default_types());
        tracing::debug!(sample_rate, "engine up, built-in soundfile types registered");
        let anchors = Arc::new(AnchorRegistry::new(
            Arc::clone(&caps.clock),
            Arc::clone(&caps.graph),
        ));
        Self {
            caps,
            codecs,
            anchors,
            sample_rate,
        }
    }

    /// Streaming playback object with the default FIFO size.
    pub fn reader(&self, channels: usize) -> StreamReader {
        self.reader_with_buffer(channels, 0)
    }

    /// Streaming playback object with an explicit FIFO allocation.
    pub fn reader_with_buffer(&self, channels: usize, buffer_bytes: usize) -> StreamReader {
        StreamReader::new(
            channels,
            buffer_bytes,
            self.caps.clone(),
            Arc::clone(&self.anchors),
            Arc::clone(&self.codecs),
        )
    }

    /// Streaming capture object with the default FIFO size.
    pub fn writer(&self, channels: usize) -> StreamWriter {
        self.writer_with_buffer(channels, 0)
    }

    /// Streaming capture object with an explicit FIFO allocation.
    pub fn writer_with_buffer(&self, channels: usize, buffer_bytes: usize) -> StreamWriter {
        StreamWriter::new(
            channels,
            buffer_bytes,
            self.sample_rate,
            self.caps.clone(),
            Arc::clone(&self.anchors),
            Arc::clone(&self.codecs),
        )
    }

    /// Create (or rebind) a named time anchor.
    pub fn anchor(&self, name: &str) -> Arc<TimeAnchor> {
        self.anchors.create(name)
    }

    /// Unbind a named anchor, triggering a graph rebuild if it was wired
    /// into the signal graph.
    pub fn destroy_anchor(&self, name: &str) {
        self.anchors.destroy(name);
    }

    /// Loop-cycle calculator bound to a named anchor.
    pub fn cycles(&self, anchor_name: &str) -> CycleCalculator {
        CycleCalculator::new(Arc::clone(&self.anchors), anchor_name)
    }

    /// Time-code adder with an initial operand.
    pub fn ftc_add(&self, operand: FrameTimeCode) -> FtcAdd {
        FtcAdd::new(operand)
    }

    /// Time-code scaler with an initial factor.
    pub fn ftc_mult(&self, scalar: f64) -> FtcMult {
        FtcMult::new(scalar)
    }

    /// Time-code comparator with an initial right operand.
    pub fn ftc_compare(&self, right: FrameTimeCode) -> FtcCompare {
        FtcCompare::new(right)
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn anchors(&self) -> &Arc<AnchorRegistry> {
        &self.anchors
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
