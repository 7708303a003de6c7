// src/hardware/sim.rs - Simulated actuators for hosts without GPIO
//!
//! Every simulated part records what it was told to do behind an `Arc`'d trace, so the
//! host can log it and tests can assert on it. [`SimClock`] keeps virtual time: delays
//! advance it instantly instead of spinning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{Board, Clock, Color, HardwareError, OutputPin, ServoDriver, StatusLight};
use crate::motion::stepper::StepperAxis;

/// Virtual clock. `delay_us` advances time by exactly the requested amount.
#[derive(Debug, Default)]
pub struct SimClock {
    micros: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }

    fn delay_us(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct PinTrace {
    high: AtomicBool,
    rising_edges: AtomicU64,
    faulted: AtomicBool,
}

impl PinTrace {
    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    pub fn rising_edges(&self) -> u64 {
        self.rising_edges.load(Ordering::SeqCst)
    }

    /// Make every following write fail.
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
    }
}

pub struct SimPin {
    name: String,
    trace: Arc<PinTrace>,
}

impl SimPin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trace: Arc::new(PinTrace::default()),
        }
    }

    pub fn trace(&self) -> Arc<PinTrace> {
        self.trace.clone()
    }

    fn write(&mut self, high: bool) -> Result<(), HardwareError> {
        if self.trace.faulted.load(Ordering::SeqCst) {
            return Err(HardwareError::Pin {
                pin: self.name.clone(),
                reason: "simulated fault".to_string(),
            });
        }
        let was_high = self.trace.high.swap(high, Ordering::SeqCst);
        if high && !was_high {
            self.trace.rising_edges.fetch_add(1, Ordering::SeqCst);
        }
        tracing::trace!("pin {} -> {}", self.name, if high { "HIGH" } else { "LOW" });
        Ok(())
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) -> Result<(), HardwareError> {
        self.write(true)
    }

    fn set_low(&mut self) -> Result<(), HardwareError> {
        self.write(false)
    }
}

#[derive(Debug, Default)]
pub struct ServoTrace {
    angles: Mutex<Vec<u16>>,
}

impl ServoTrace {
    /// Every native angle written, oldest first.
    pub fn angles(&self) -> Vec<u16> {
        self.angles.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<u16> {
        self.angles().last().copied()
    }
}

#[derive(Default)]
pub struct SimServo {
    trace: Arc<ServoTrace>,
}

impl SimServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> Arc<ServoTrace> {
        self.trace.clone()
    }
}

impl ServoDriver for SimServo {
    fn write_angle(&mut self, degrees: u16) -> Result<(), HardwareError> {
        tracing::debug!("servo -> {} deg", degrees);
        self.trace
            .angles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(degrees);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LightTrace {
    colors: Mutex<Vec<Color>>,
}

impl LightTrace {
    /// Every color shown, oldest first.
    pub fn history(&self) -> Vec<Color> {
        self.colors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current(&self) -> Option<Color> {
        self.history().last().copied()
    }
}

#[derive(Default)]
pub struct SimLight {
    trace: Arc<LightTrace>,
}

impl SimLight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> Arc<LightTrace> {
        self.trace.clone()
    }
}

impl StatusLight for SimLight {
    fn show(&mut self, color: Color) -> Result<(), HardwareError> {
        tracing::trace!("status light -> #{:06X}", color.rgb());
        self.trace
            .colors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(color);
        Ok(())
    }
}

/// Handles onto every simulated part of a [`Board`].
#[derive(Clone)]
pub struct SimProbes {
    pub x_pulse: Arc<PinTrace>,
    pub x_dir: Arc<PinTrace>,
    pub z_pulse: Arc<PinTrace>,
    pub z_dir: Arc<PinTrace>,
    pub servo: Arc<ServoTrace>,
    pub light: Arc<LightTrace>,
}

/// Build a fully simulated board plus status light.
pub fn sim_rig(clock: Arc<dyn Clock>) -> (Board, SimLight, SimProbes) {
    let x_pulse = SimPin::new("x_pulse");
    let x_dir = SimPin::new("x_dir");
    let z_pulse = SimPin::new("z_pulse");
    let z_dir = SimPin::new("z_dir");
    let servo = SimServo::new();
    let light = SimLight::new();

    let probes = SimProbes {
        x_pulse: x_pulse.trace(),
        x_dir: x_dir.trace(),
        z_pulse: z_pulse.trace(),
        z_dir: z_dir.trace(),
        servo: servo.trace(),
        light: light.trace(),
    };
    let board = Board::new(
        StepperAxis::new("X", Box::new(x_pulse), Box::new(x_dir)),
        StepperAxis::new("Z", Box::new(z_pulse), Box::new(z_dir)),
        Box::new(servo),
        clock,
    );
    (board, light, probes)
}
