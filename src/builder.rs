//! Engine builder: collects host capabilities before wiring.

use crate::engine::Engine;
use reeltime_core::host::{
    EventSink, FileOpener, FrameClock, GraphControl, HostCaps, LogicalClock, NoGraph, NullSink,
    SearchPathOpener,
};
use std::sync::Arc;

/// Builds an [`Engine`] from host capabilities.
///
/// Every capability has a standalone default -- a frame-counting clock, a
/// working-directory search path, a discarding event sink, and no graph
/// control -- so an engine can come up without a host for tools and
/// tests. Real hosts supply their own.
pub struct EngineBuilder {
    clock: Option<Arc<dyn LogicalClock>>,
    files: Option<Arc<dyn FileOpener>>,
    events: Option<Arc<dyn EventSink>>,
    graph: Option<Arc<dyn GraphControl>>,
    sample_rate: f64,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            clock: None,
            files: None,
            events: None,
            graph: None,
            sample_rate: 44_100.0,
        }
    }

    /// The host's logical clock.
    pub fn clock(mut self, clock: Arc<dyn LogicalClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The host's search-path file opener.
    pub fn files(mut self, files: Arc<dyn FileOpener>) -> Self {
        self.files = Some(files);
        self
    }

    /// Where streams deliver their outlet values.
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Hook for graph rebuilds on anchor destruction.
    pub fn graph(mut self, graph: Arc<dyn GraphControl>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Default sample rate for capture files without a `-rate` flag.
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn build(self) -> Engine {
        let caps = HostCaps {
            clock: self.clock.unwrap_or_else(|| Arc::new(FrameClock::new())),
            files: self
                .files
                .unwrap_or_else(|| Arc::new(SearchPathOpener::current_dir())),
            events: self.events.unwrap_or_else(|| Arc::new(NullSink)),
            graph: self.graph.unwrap_or_else(|| Arc::new(NoGraph)),
        };
        Engine::with_caps(caps, self.sample_rate)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
