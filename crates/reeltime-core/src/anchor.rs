//! Named time anchors: shared origin instants that let independent streams
//! agree on what frame zero means.

use crate::host::{GraphControl, LogicalClock, LogicalTime};
use crate::timecode::FrameTimeCode;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named origin on the host's logical clock.
///
/// The start instant is captured lazily: the first call that needs it pins
/// T=0 to "now", so downstream objects begin counting from the moment they
/// are actually used. `mark` re-pins it explicitly.
pub struct TimeAnchor {
    name: String,
    clock: Arc<dyn LogicalClock>,
    start: Mutex<Option<LogicalTime>>,
    used_in_graph: AtomicBool,
}

impl TimeAnchor {
    fn new(name: impl Into<String>, clock: Arc<dyn LogicalClock>) -> Self {
        Self {
            name: name.into(),
            clock,
            start: Mutex::new(None),
            used_in_graph: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pin the origin to the current logical time.
    pub fn mark(&self) {
        *self.start.lock() = Some(self.clock.now());
    }

    fn start_time(&self) -> LogicalTime {
        let mut start = self.start.lock();
        *start.get_or_insert_with(|| self.clock.now())
    }

    /// Whole frames elapsed since the origin, rounded up and clamped at
    /// zero. Pins the origin on first use.
    pub fn elapsed_frames(&self) -> u64 {
        let since = self.clock.frames_since(self.start_time()).ceil();
        if since < 0.0 {
            0
        } else {
            since as u64
        }
    }

    /// Elapsed frames as a time code, for the anchor's list outlet.
    pub fn elapsed(&self) -> FrameTimeCode {
        FrameTimeCode::from_frames(self.elapsed_frames() as i64)
    }

    /// Record that a stream in the signal graph references this anchor.
    pub fn mark_used_in_graph(&self) {
        self.used_in_graph.store(true, Ordering::Relaxed);
    }

    pub fn used_in_graph(&self) -> bool {
        self.used_in_graph.load(Ordering::Relaxed)
    }
}

/// Process-wide name -> anchor binding table.
///
/// Streams resolve anchors by name and keep an `Arc` back-reference, so an
/// anchor stays resolvable for its referrers even after its name is
/// unbound. Destroying an anchor that is wired into the signal graph asks
/// the host to rebuild it.
pub struct AnchorRegistry {
    anchors: DashMap<String, Arc<TimeAnchor>>,
    clock: Arc<dyn LogicalClock>,
    graph: Arc<dyn GraphControl>,
}

impl AnchorRegistry {
    pub fn new(clock: Arc<dyn LogicalClock>, graph: Arc<dyn GraphControl>) -> Self {
        Self {
            anchors: DashMap::new(),
            clock,
            graph,
        }
    }

    /// Create an anchor and bind it to `name`, replacing any previous
    /// binding.
    pub fn create(&self, name: &str) -> Arc<TimeAnchor> {
        let anchor = Arc::new(TimeAnchor::new(name, Arc::clone(&self.clock)));
        self.anchors.insert(name.to_string(), Arc::clone(&anchor));
        anchor
    }

    pub fn find(&self, name: &str) -> Option<Arc<TimeAnchor>> {
        self.anchors.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Unbind `name`. Requests a graph rebuild if the anchor was used in
    /// the signal graph.
    pub fn destroy(&self, name: &str) {
        if let Some((_, anchor)) = self.anchors.remove(name) {
            if anchor.used_in_graph() {
                tracing::debug!(anchor = name, "rebuilding graph after anchor removal");
                self.graph.request_rebuild();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}
