//! Loop-cycle quantization: given a shared anchor, a loop length and an
//! offset, find the global frame where the k-th next cycle begins.

use crate::anchor::AnchorRegistry;
use crate::error::{Error, Result};
use crate::timecode::FrameTimeCode;
use std::sync::Arc;

/// Start frame of the `offset_loops`-th next cycle boundary after `clock`.
///
/// A clock sitting exactly on a boundary yields that boundary itself for
/// `offset_loops == 0`, not the next one. `safety` is a constant number of
/// frames added to every result for callers that need scheduling headroom.
pub fn loop_start_from_clock_time(
    clock: i64,
    offset: FrameTimeCode,
    loop_length: FrameTimeCode,
    offset_loops: i64,
    safety: i64,
) -> Result<FrameTimeCode> {
    let offset_frames = offset.to_frames();
    let loop_frames = loop_length.to_frames();
    let local_clock = clock - offset_frames;
    if loop_frames < 0 {
        return Err(Error::InvalidArgument(
            "loop length must be >= 0 frames".into(),
        ));
    }
    if loop_frames == 0 {
        return Ok(FrameTimeCode::from_frames(local_clock + safety));
    }
    let remainder = local_clock.rem_euclid(loop_frames);
    if remainder == 0 {
        return Ok(FrameTimeCode::from_frames(
            local_clock + offset_loops * loop_frames + safety,
        ));
    }
    Ok(FrameTimeCode::from_frames(
        local_clock + loop_frames + offset_frames - remainder + offset_loops * loop_frames + safety,
    ))
}

/// Position within the current cycle for `clock`.
pub fn loop_position_from_clock_time(
    clock: i64,
    loop_length: FrameTimeCode,
) -> Result<FrameTimeCode> {
    let loop_frames = loop_length.to_frames();
    if loop_frames <= 0 {
        return Err(Error::InvalidArgument(
            "loop length must be > 0 frames".into(),
        ));
    }
    Ok(FrameTimeCode::from_frames(clock.rem_euclid(loop_frames)))
}

/// How many loops of `loop_length` fit in `duration`, fractional.
pub fn loops_containing_duration(
    duration: FrameTimeCode,
    loop_length: FrameTimeCode,
) -> Result<f64> {
    let duration_frames = duration.to_frames();
    if duration_frames < 0 {
        return Err(Error::InvalidArgument("duration must be >= 0 frames".into()));
    }
    let loop_frames = loop_length.to_frames();
    if loop_frames <= 0 {
        return Err(Error::InvalidArgument(
            "loop length must be > 0 frames".into(),
        ));
    }
    Ok(duration_frames as f64 / loop_frames as f64)
}

/// Cycle-boundary calculator bound to a named anchor.
pub struct CycleCalculator {
    anchors: Arc<AnchorRegistry>,
    anchor_name: String,
    loop_length: FrameTimeCode,
    offset: FrameTimeCode,
    safety: i64,
}

impl CycleCalculator {
    pub fn new(anchors: Arc<AnchorRegistry>, anchor_name: impl Into<String>) -> Self {
        Self {
            anchors,
            anchor_name: anchor_name.into(),
            loop_length: FrameTimeCode::ZERO,
            offset: FrameTimeCode::ZERO,
            safety: 0,
        }
    }

    pub fn set_loop_length(&mut self, loop_length: FrameTimeCode) {
        self.loop_length = loop_length;
    }

    pub fn set_offset(&mut self, offset: FrameTimeCode) {
        self.offset = offset;
    }

    pub fn set_safety(&mut self, safety: i64) {
        self.safety = safety;
    }

    fn anchor_clock(&self) -> Result<i64> {
        let anchor = self
            .anchors
            .find(&self.anchor_name)
            .ok_or_else(|| Error::NoSuchAnchor(self.anchor_name.clone()))?;
        Ok(anchor.elapsed_frames() as i64)
    }

    /// Boundary `offset_loops` cycles away from the anchor's "now".
    pub fn start_after(&self, offset_loops: i64) -> Result<FrameTimeCode> {
        let now = self.anchor_clock()?;
        self.start_after_at(offset_loops, now)
    }

    /// Same, against an explicit clock value instead of the anchor.
    pub fn start_after_at(&self, offset_loops: i64, now: i64) -> Result<FrameTimeCode> {
        loop_start_from_clock_time(now, self.offset, self.loop_length, offset_loops, self.safety)
    }

    /// The next boundary; what a bang asks for.
    pub fn next_start(&self) -> Result<FrameTimeCode> {
        self.start_after(0)
    }

    /// Fractional loop count covering `duration`.
    pub fn count(&self, duration: FrameTimeCode) -> Result<f64> {
        loops_containing_duration(duration, self.loop_length)
    }
}
