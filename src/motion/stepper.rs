// src/motion/stepper.rs - Constant-feedrate step pulse generation
use crate::hardware::{Clock, HardwareError, OutputPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Positive only for strictly positive step counts; zero counts as negative.
    pub fn of(steps: i32) -> Self {
        if steps > 0 { Direction::Positive } else { Direction::Negative }
    }
}

/// Half of one step period in microseconds for `feedrate` steps per second.
pub fn half_period_us(feedrate: u32) -> u64 {
    1_000_000 / (2 * u64::from(feedrate.max(1)))
}

/// One stepper driver: a pulse line and a direction line.
pub struct StepperAxis {
    name: String,
    pulse: Box<dyn OutputPin>,
    direction: Box<dyn OutputPin>,
}

impl StepperAxis {
    pub fn new(
        name: impl Into<String>,
        pulse: Box<dyn OutputPin>,
        direction: Box<dyn OutputPin>,
    ) -> Self {
        Self {
            name: name.into(),
            pulse,
            direction,
        }
    }

    /// Emit `abs(steps)` pulses at `feedrate`, direction taken from the sign of `steps`.
    ///
    /// Busy-waits for the whole train and cannot be interrupted. Returns the pulse count.
    pub fn pulse_train(
        &mut self,
        steps: i32,
        feedrate: u32,
        clock: &dyn Clock,
    ) -> Result<u32, HardwareError> {
        let direction = Direction::of(steps);
        self.direction.set_level(direction == Direction::Positive)?;

        let count = steps.unsigned_abs();
        let half_period = half_period_us(feedrate);
        tracing::debug!(
            "{} axis: {} steps {:?} at {} steps/s ({} us half-period)",
            self.name, count, direction, feedrate, half_period
        );
        for _ in 0..count {
            self.pulse.set_high()?;
            clock.delay_us(half_period);
            self.pulse.set_low()?;
            clock.delay_us(half_period);
        }
        Ok(count)
    }

    /// Drive both lines low.
    pub fn release(&mut self) -> Result<(), HardwareError> {
        self.pulse.set_low()?;
        self.direction.set_low()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_period_matches_feedrate() {
        assert_eq!(half_period_us(1000), 500);
        assert_eq!(half_period_us(1500), 333);
        assert_eq!(half_period_us(1), 500_000);
    }

    #[test]
    fn zero_steps_count_as_negative() {
        assert_eq!(Direction::of(5), Direction::Positive);
        assert_eq!(Direction::of(0), Direction::Negative);
        assert_eq!(Direction::of(-5), Direction::Negative);
    }
}
