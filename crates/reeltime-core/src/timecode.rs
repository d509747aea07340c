//! Frame time codes: exact signed 64-bit frame counts split across three
//! small floats so they survive hosts whose message atoms are floats.

use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Largest integer a 32-bit float can count to without gaps. Frame counts are
/// split into `epoch * EPOCH_BASE + frames` so each part stays below it.
pub const EPOCH_BASE: i64 = 1 << 24;

/// An exact frame count carried as `(sign, epoch, frames)`.
///
/// The canonical zero is `(+1, 0, 0)`; `(-1, 0, 0)` compares equal to it.
/// Every value produced by arithmetic here is normalized so that
/// `0 <= frames < EPOCH_BASE`.
#[derive(Debug, Clone, Copy)]
pub struct FrameTimeCode {
    sign: f64,
    epoch: f64,
    frames: f64,
}

impl FrameTimeCode {
    /// Zero frames, canonical form.
    pub const ZERO: FrameTimeCode = FrameTimeCode {
        sign: 1.0,
        epoch: 0.0,
        frames: 0.0,
    };

    /// Split a frame count into the three-part representation.
    pub fn from_frames(frames: i64) -> Self {
        let magnitude = frames.unsigned_abs();
        Self {
            sign: if frames < 0 { -1.0 } else { 1.0 },
            epoch: (magnitude / EPOCH_BASE as u64) as f64,
            frames: (magnitude % EPOCH_BASE as u64) as f64,
        }
    }

    /// Reassemble the exact frame count, clamped into the `i64` range for
    /// hostile wire values.
    pub fn to_frames(self) -> i64 {
        let magnitude =
            (self.epoch as i128) * (EPOCH_BASE as i128) + self.frames as i128;
        let signed = if self.sign < 0.0 { -magnitude } else { magnitude };
        signed.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Sum of two time codes, saturating at the ends of the `i64` range.
    pub fn add(self, other: FrameTimeCode) -> FrameTimeCode {
        Self::from_frames(self.to_frames().saturating_add(other.to_frames()))
    }

    /// Scale by a float, truncating toward negative infinity.
    ///
    /// Results outside the representable range saturate at plus or minus
    /// `2^63 - 1`. Callers wanting round-to-nearest must adjust the scalar.
    pub fn mul_scalar(self, scalar: f64) -> FrameTimeCode {
        let product = (self.to_frames() as f64 * scalar).floor();
        let frames = if product >= i64::MAX as f64 {
            i64::MAX
        } else if product <= -(i64::MAX as f64) {
            -i64::MAX
        } else {
            product as i64
        };
        Self::from_frames(frames)
    }

    /// Total order agreeing with [`FrameTimeCode::to_frames`].
    pub fn compare(self, other: FrameTimeCode) -> Ordering {
        self.to_frames().cmp(&other.to_frames())
    }

    /// Parse the wire form: exactly three floats `[sign, epoch, frames]`
    /// with `sign` either `+1` or `-1`.
    pub fn parse(atoms: &[f64]) -> Result<Self> {
        if atoms.len() != 3 {
            return Err(Error::InvalidArgument(
                "a frame time code must be three floats: 1|-1, epoch, frames".into(),
            ));
        }
        if atoms[0] != 1.0 && atoms[0] != -1.0 {
            return Err(Error::InvalidArgument(
                "frame time code sign must be 1 or -1".into(),
            ));
        }
        Ok(Self {
            sign: atoms[0],
            epoch: atoms[1],
            frames: atoms[2],
        })
    }

    /// Wire form `[sign, epoch, frames]`.
    pub fn to_list(self) -> [f64; 3] {
        [self.sign, self.epoch, self.frames]
    }

    pub fn sign(&self) -> f64 {
        self.sign
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    pub fn frames(&self) -> f64 {
        self.frames
    }
}

impl Default for FrameTimeCode {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for FrameTimeCode {
    fn from(frames: i64) -> Self {
        Self::from_frames(frames)
    }
}

impl PartialEq for FrameTimeCode {
    fn eq(&self, other: &Self) -> bool {
        self.to_frames() == other.to_frames()
    }
}

impl Eq for FrameTimeCode {}

impl PartialOrd for FrameTimeCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(*other))
    }
}

impl Ord for FrameTimeCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(*other)
    }
}
