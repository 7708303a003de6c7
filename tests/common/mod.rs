// Shared fixtures for the integration tests: a machine on a simulated board.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use wirebend_rs::hardware::Clock;
use wirebend_rs::hardware::sim::{SimClock, SimProbes, sim_rig};
use wirebend_rs::{CommandError, Config, IndicatorState, Machine, Outcome};

pub struct Rig {
    pub machine: Machine,
    pub clock: Arc<SimClock>,
    pub probes: SimProbes,
}

/// Defaults with blinking disabled so commands dispatch on the first tick.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.indicator.blink_toggles = 0;
    config
}

pub fn rig(config: &Config) -> Rig {
    let clock = Arc::new(SimClock::new());
    let (board, light, probes) = sim_rig(clock.clone() as Arc<dyn Clock>);
    let machine = Machine::new(config, board, Box::new(light));
    Rig {
        machine,
        clock,
        probes,
    }
}

impl Rig {
    /// Tick until the queue is empty and the light is back to ready, stepping virtual
    /// time between ticks. Returns every dispatch result in order.
    pub fn run_until_idle(&mut self) -> Vec<Result<Outcome, CommandError>> {
        let mut results = Vec::new();
        for _ in 0..100_000 {
            if let Some(result) = self.machine.tick() {
                results.push(result);
            }
            if self.machine.queue().is_empty()
                && self.machine.indicator_state() == IndicatorState::Ready
            {
                return results;
            }
            self.clock.advance(Duration::from_millis(10));
        }
        panic!("machine never went idle");
    }
}
