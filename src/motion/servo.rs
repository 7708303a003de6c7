// src/motion/servo.rs - Logical servo angles and soft limits
use serde::{Deserialize, Serialize};

/// Logical angles run 0-360; the actuator takes 0-180.
pub const LOGICAL_MAX: i32 = 360;
pub const NATIVE_MAX: i32 = 180;

/// Inclusive angle window enforced before the servo is commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub low: i32,
    pub high: i32,
}

impl SoftLimits {
    pub fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    /// Both bounds inside the logical range and not inverted.
    pub fn is_valid(&self) -> bool {
        0 <= self.low && self.low <= self.high && self.high <= LOGICAL_MAX
    }

    pub fn contains(&self, angle: i32) -> bool {
        (0..=LOGICAL_MAX).contains(&angle) && (self.low..=self.high).contains(&angle)
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self::new(0, LOGICAL_MAX)
    }
}

/// Linear remap of a logical angle onto the native range, integer arithmetic.
pub fn to_native(logical: i32) -> u16 {
    let logical = logical.clamp(0, LOGICAL_MAX);
    (logical * NATIVE_MAX / LOGICAL_MAX) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_halves_the_angle() {
        assert_eq!(to_native(0), 0);
        assert_eq!(to_native(90), 45);
        assert_eq!(to_native(91), 45);
        assert_eq!(to_native(360), 180);
    }

    #[test]
    fn limits_are_inclusive_and_bounded_by_logical_range() {
        let limits = SoftLimits::new(170, 345);
        assert!(limits.contains(170));
        assert!(limits.contains(345));
        assert!(!limits.contains(169));
        assert!(!limits.contains(500));
        assert!(!SoftLimits::default().contains(-1));
        assert!(!SoftLimits::default().contains(361));
    }
}
