//! Small stateful combinators over frame time codes.
//!
//! Each keeps its right-hand operand and its last result, so a host can
//! set the operand independently and re-emit the last value on a bang.

use crate::timecode::FrameTimeCode;
use std::cmp::Ordering;

/// Adds a stored operand to each incoming time code.
#[derive(Debug, Default)]
pub struct FtcAdd {
    operand: FrameTimeCode,
    last: FrameTimeCode,
}

impl FtcAdd {
    pub fn new(operand: FrameTimeCode) -> Self {
        Self {
            operand,
            last: FrameTimeCode::ZERO,
        }
    }

    pub fn set_operand(&mut self, operand: FrameTimeCode) {
        self.operand = operand;
    }

    pub fn apply(&mut self, input: FrameTimeCode) -> FrameTimeCode {
        self.last = input.add(self.operand);
        self.last
    }

    pub fn last(&self) -> FrameTimeCode {
        self.last
    }
}

/// Scales each incoming time code by a stored float, flooring the result.
#[derive(Debug)]
pub struct FtcMult {
    scalar: f64,
    last: FrameTimeCode,
}

impl FtcMult {
    pub fn new(scalar: f64) -> Self {
        Self {
            scalar,
            last: FrameTimeCode::ZERO,
        }
    }

    pub fn set_scalar(&mut self, scalar: f64) {
        self.scalar = scalar;
    }

    pub fn apply(&mut self, input: FrameTimeCode) -> FrameTimeCode {
        self.last = input.mul_scalar(self.scalar);
        self.last
    }

    pub fn last(&self) -> FrameTimeCode {
        self.last
    }
}

impl Default for FtcMult {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Compares each incoming time code against a stored right operand,
/// yielding -1, 0 or +1.
#[derive(Debug, Default)]
pub struct FtcCompare {
    right: FrameTimeCode,
    last: f64,
}

impl FtcCompare {
    pub fn new(right: FrameTimeCode) -> Self {
        Self { right, last: 0.0 }
    }

    pub fn set_right(&mut self, right: FrameTimeCode) {
        self.right = right;
    }

    pub fn apply(&mut self, input: FrameTimeCode) -> f64 {
        self.last = match input.compare(self.right) {
            Ordering::Less => -1.0,
            Ordering::Equal => 0.0,
            Ordering::Greater => 1.0,
        };
        self.last
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ftc(n: i64) -> FrameTimeCode {
        FrameTimeCode::from_frames(n)
    }

    #[test]
    fn test_add_keeps_last_result() {
        let mut add = FtcAdd::new(ftc(100));
        assert_eq!(add.apply(ftc(23)).to_frames(), 123);
        assert_eq!(add.last().to_frames(), 123);
        add.set_operand(ftc(-23));
        assert_eq!(add.apply(ftc(23)).to_frames(), 0);
    }

    #[test]
    fn test_mult_floors() {
        let mut mult = FtcMult::new(0.5);
        assert_eq!(mult.apply(ftc(7)).to_frames(), 3);
        mult.set_scalar(2.0);
        assert_eq!(mult.apply(ftc(7)).to_frames(), 14);
        assert_eq!(mult.last().to_frames(), 14);
    }

    #[test]
    fn test_compare_sign() {
        let mut cmp = FtcCompare::new(ftc(10));
        assert_eq!(cmp.apply(ftc(5)), -1.0);
        assert_eq!(cmp.apply(ftc(10)), 0.0);
        assert_eq!(cmp.apply(ftc(15)), 1.0);
        assert_eq!(cmp.last(), 1.0);
    }
}
