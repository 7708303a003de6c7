// src/motion/mod.rs - Open-loop actuator control: stepper pulse trains and servo mapping
pub mod servo;
pub mod stepper;

pub use servo::SoftLimits;
pub use stepper::{Direction, StepperAxis, half_period_us};
