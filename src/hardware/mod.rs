// src/hardware/mod.rs - Actuator abstractions and the board they hang off
pub mod sim;

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::motion::stepper::StepperAxis;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    #[error("Pin {pin} failed: {reason}")]
    Pin { pin: String, reason: String },
    #[error("Servo failed: {0}")]
    Servo(String),
    #[error("Status light failed: {0}")]
    Light(String),
}

/// A single digital output line.
pub trait OutputPin: Send {
    fn set_high(&mut self) -> Result<(), HardwareError>;
    fn set_low(&mut self) -> Result<(), HardwareError>;

    fn set_level(&mut self, high: bool) -> Result<(), HardwareError> {
        if high { self.set_high() } else { self.set_low() }
    }
}

/// Hobby servo taking its native 0-180 degree range.
pub trait ServoDriver: Send {
    fn write_angle(&mut self, degrees: u16) -> Result<(), HardwareError>;
}

/// Single-pixel status light.
pub trait StatusLight: Send {
    fn show(&mut self, color: Color) -> Result<(), HardwareError>;
}

/// Monotonic time source with busy-wait delays.
pub trait Clock: Send + Sync {
    /// Time since the clock started.
    fn now(&self) -> Duration;
    /// Block for `micros` microseconds without yielding.
    fn delay_us(&self, micros: u64);

    fn delay_ms(&self, millis: u64) {
        self.delay_us(millis.saturating_mul(1000));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Off,
    Red,
    Green,
}

impl Color {
    pub fn rgb(self) -> u32 {
        match self {
            Color::Off => 0x000000,
            Color::Red => 0xFF0000,
            Color::Green => 0x00FF00,
        }
    }
}

/// Wall-clock time with spin-wait delays, matching stepper driver timing.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay_us(&self, micros: u64) {
        let start = Instant::now();
        let target = Duration::from_micros(micros);
        while start.elapsed() < target {
            std::hint::spin_loop();
        }
    }
}

/// Everything the dispatcher drives: two stepper axes, the servo and the clock.
pub struct Board {
    pub x: StepperAxis,
    pub z: StepperAxis,
    pub servo: Box<dyn ServoDriver>,
    pub clock: Arc<dyn Clock>,
}

impl Board {
    pub fn new(
        x: StepperAxis,
        z: StepperAxis,
        servo: Box<dyn ServoDriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { x, z, servo, clock }
    }

    /// Drive every line low and home the servo to logical 0.
    pub fn initialize(&mut self) -> Result<(), HardwareError> {
        tracing::info!("Initializing hardware");
        self.x.release()?;
        self.z.release()?;
        self.servo.write_angle(0)?;
        Ok(())
    }
}
