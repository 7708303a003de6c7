// src/status.rs - Status light state machine
//!
//! `Ready` shows the ok color, `Processing` the busy color for the length of one command.
//! `Blinking` alternates busy/off and is polled once per loop tick instead of sleeping, so
//! input keeps being read while it runs.

use std::time::Duration;

use crate::config::IndicatorConfig;
use crate::hardware::{Color, StatusLight};

pub const READY_COLOR: Color = Color::Green;
pub const BUSY_COLOR: Color = Color::Red;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Ready,
    Processing,
    /// `count` toggles done so far; `since` is when the current phase began.
    Blinking { count: u32, since: Duration },
}

impl IndicatorState {
    pub fn label(&self) -> &'static str {
        match self {
            IndicatorState::Ready => "ready",
            IndicatorState::Processing => "processing",
            IndicatorState::Blinking { .. } => "blinking",
        }
    }
}

pub struct StatusIndicator {
    state: IndicatorState,
    light: Box<dyn StatusLight>,
    interval: Duration,
    max_toggles: u32,
}

impl StatusIndicator {
    pub fn new(light: Box<dyn StatusLight>, config: &IndicatorConfig) -> Self {
        Self {
            state: IndicatorState::Ready,
            light,
            interval: Duration::from_millis(u64::from(config.blink_interval_ms)),
            max_toggles: config.blink_toggles,
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    pub fn is_blinking(&self) -> bool {
        matches!(self.state, IndicatorState::Blinking { .. })
    }

    /// Force the ready color regardless of the current state.
    pub fn ready(&mut self) {
        self.state = IndicatorState::Ready;
        self.show(READY_COLOR);
    }

    pub fn ensure_ready(&mut self) {
        if self.state != IndicatorState::Ready {
            self.ready();
        }
    }

    pub fn processing(&mut self) {
        if self.state != IndicatorState::Processing {
            self.state = IndicatorState::Processing;
            self.show(BUSY_COLOR);
        }
    }

    /// Close out one command. Stays busy while more work is queued.
    pub fn finish_command(&mut self, queue_empty: bool) {
        if queue_empty {
            self.ready();
        }
    }

    /// Begin a fresh blink sequence, lit first.
    pub fn start_blinking(&mut self, now: Duration) {
        if self.max_toggles == 0 {
            return;
        }
        self.state = IndicatorState::Blinking { count: 0, since: now };
        self.show(BUSY_COLOR);
    }

    /// Advance a running blink sequence. Ends in `Ready` after the configured toggle count.
    pub fn advance(&mut self, now: Duration) {
        let IndicatorState::Blinking { count, since } = self.state else {
            return;
        };
        if now.saturating_sub(since) < self.interval {
            return;
        }
        let count = count + 1;
        if count >= self.max_toggles {
            self.ready();
            return;
        }
        self.state = IndicatorState::Blinking { count, since: now };
        // Even toggle counts are lit, odd ones dark.
        self.show(if count % 2 == 0 { BUSY_COLOR } else { Color::Off });
    }

    fn show(&mut self, color: Color) {
        if let Err(e) = self.light.show(color) {
            tracing::warn!("Status light update failed: {}", e);
        }
    }
}
