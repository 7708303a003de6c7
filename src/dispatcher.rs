// src/dispatcher.rs - Executes one command token against the board and machine state
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::command::{Command, CommandError, CommandQueue, CommandToken};
use crate::config::MachineConfig;
use crate::hardware::Board;
use crate::motion::servo::{self, SoftLimits};
use crate::status::StatusIndicator;

/// Polling slice while a `D` hold drains input.
const HOLD_POLL_US: u64 = 1000;

/// Per-axis stepper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Steps per second, always > 0.
    pub feedrate: u32,
}

/// Machine-wide tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameters {
    /// Pause before every stepper move.
    pub settle_delay_ms: u32,
    /// Step count used by the load-wire action.
    pub load_offset: i32,
    /// Hold after every servo write.
    pub servo_settle_ms: u32,
    pub soft_limits: SoftLimits,
}

/// Mutable configuration owned by the execution loop and lent to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineState {
    pub x: AxisConfig,
    pub z: AxisConfig,
    pub globals: GlobalParameters,
}

impl MachineState {
    pub fn from_config(config: &MachineConfig) -> Self {
        Self {
            x: AxisConfig { feedrate: config.x_feedrate.max(1) },
            z: AxisConfig { feedrate: config.z_feedrate.max(1) },
            globals: GlobalParameters {
                settle_delay_ms: config.settle_delay_ms,
                load_offset: config.load_offset,
                servo_settle_ms: config.servo_settle_ms,
                soft_limits: SoftLimits::new(config.servo_min_angle, config.servo_max_angle),
            },
        }
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::from_config(&MachineConfig::default())
    }
}

/// Source of inbound command text that a `D` hold must swallow.
pub trait InputDrain {
    /// Throw away whatever input is waiting. Returns how many items were dropped.
    fn discard_pending(&mut self) -> usize;
}

/// Input drain for callers with no live transport.
pub struct NoInput;

impl InputDrain for NoInput {
    fn discard_pending(&mut self) -> usize {
        0
    }
}

/// Everything one dispatch may touch.
pub struct DispatchContext<'a> {
    pub state: &'a mut MachineState,
    pub queue: &'a mut CommandQueue,
    pub indicator: &'a mut StatusIndicator,
    pub board: &'a mut Board,
    pub input: &'a mut dyn InputDrain,
}

/// What a successfully executed command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ServoMoved { logical: i32, native: u16 },
    Stepped { axis: char, pulses: u32 },
    Held { millis: u32, discarded: usize },
    XFeedrate(u32),
    ZFeedrate(u32),
    LoadOffset(i32),
    SettleDelay(u32),
    Aborted { discarded: usize },
}

pub struct Dispatcher {
    abort_code: u8,
    step: u64,
}

impl Dispatcher {
    pub fn new(abort_code: u8) -> Self {
        Self {
            abort_code,
            step: 0,
        }
    }

    /// Commands dispatched since startup, rejected ones included.
    pub fn dispatched(&self) -> u64 {
        self.step
    }

    pub fn is_abort(&self, token: &CommandToken) -> bool {
        matches!(Command::decode(token, self.abort_code), Command::Abort)
    }

    /// Execute one token. Errors are logged here and leave the machine state untouched.
    ///
    /// Abort clears the queue and skips the busy color; every other command shows busy
    /// for its duration.
    pub fn dispatch(
        &mut self,
        token: &CommandToken,
        ctx: &mut DispatchContext<'_>,
    ) -> Result<Outcome, CommandError> {
        self.step += 1;
        let command = Command::decode(token, self.abort_code);
        if command != Command::Abort {
            ctx.indicator.processing();
        }
        let result = execute(command, token, ctx);
        match &result {
            Ok(Outcome::Aborted { discarded }) => tracing::warn!(
                "[step {}] Emergency stop: discarded {} queued commands",
                self.step, discarded
            ),
            Ok(outcome) => tracing::info!("[step {}] {} -> {:?}", self.step, token, outcome),
            Err(CommandError::Hardware(e)) => {
                tracing::error!("[step {}] {} failed: {}", self.step, token, e)
            }
            Err(e) => tracing::warn!("[step {}] {}", self.step, e),
        }
        ctx.indicator.finish_command(ctx.queue.is_empty());
        result
    }
}

fn execute(
    command: Command,
    token: &CommandToken,
    ctx: &mut DispatchContext<'_>,
) -> Result<Outcome, CommandError> {
    match command {
        Command::Servo(angle) => {
            let limits = ctx.state.globals.soft_limits;
            if !limits.contains(angle) {
                return Err(out_of_range(
                    'S',
                    angle,
                    format!("servo angle must be within [{}, {}]", limits.low, limits.high),
                ));
            }
            let native = servo::to_native(angle);
            ctx.board.servo.write_angle(native)?;
            ctx.board
                .clock
                .delay_ms(u64::from(ctx.state.globals.servo_settle_ms));
            Ok(Outcome::ServoMoved { logical: angle, native })
        }
        Command::MoveX(steps) => {
            ctx.board
                .clock
                .delay_ms(u64::from(ctx.state.globals.settle_delay_ms));
            let pulses = ctx
                .board
                .x
                .pulse_train(steps, ctx.state.x.feedrate, &*ctx.board.clock)?;
            Ok(Outcome::Stepped { axis: 'X', pulses })
        }
        Command::MoveZ(steps) => {
            ctx.board
                .clock
                .delay_ms(u64::from(ctx.state.globals.settle_delay_ms));
            let pulses = ctx
                .board
                .z
                .pulse_train(steps, ctx.state.z.feedrate, &*ctx.board.clock)?;
            Ok(Outcome::Stepped { axis: 'Z', pulses })
        }
        Command::Delay(millis) => {
            if millis <= 0 {
                return Err(out_of_range('D', millis, "delay must be a positive number"));
            }
            let millis = millis as u32;
            let discarded = hold(ctx, Duration::from_millis(u64::from(millis)));
            if discarded > 0 {
                tracing::info!("Ignored {} inputs during delay", discarded);
            }
            Ok(Outcome::Held { millis, discarded })
        }
        Command::SetXFeedrate(rate) => {
            if rate <= 0 {
                return Err(out_of_range('F', rate, "X feedrate must be a positive number"));
            }
            ctx.state.x.feedrate = rate as u32;
            tracing::info!("Feedrate for X-axis updated to {} steps per second", rate);
            Ok(Outcome::XFeedrate(rate as u32))
        }
        Command::SetZFeedrate(rate) => {
            if rate <= 0 {
                return Err(out_of_range('G', rate, "Z feedrate must be a positive number"));
            }
            ctx.state.z.feedrate = rate as u32;
            tracing::info!("Feedrate for Z-axis updated to {} steps per second", rate);
            Ok(Outcome::ZFeedrate(rate as u32))
        }
        Command::SetLoadOffset(offset) => {
            ctx.state.globals.load_offset = offset;
            Ok(Outcome::LoadOffset(offset))
        }
        Command::SetSettleDelay(millis) => {
            if millis < 0 {
                return Err(out_of_range('C', millis, "settle delay cannot be negative"));
            }
            ctx.state.globals.settle_delay_ms = millis as u32;
            Ok(Outcome::SettleDelay(millis as u32))
        }
        Command::Abort => Ok(Outcome::Aborted {
            discarded: ctx.queue.clear(),
        }),
        Command::Invalid(_) => Err(CommandError::InvalidOpcode(token.to_string())),
    }
}

/// Busy-hold for `duration`, discarding any input that shows up meanwhile.
fn hold(ctx: &mut DispatchContext<'_>, duration: Duration) -> usize {
    let clock = &*ctx.board.clock;
    let start = clock.now();
    let mut discarded = 0;
    loop {
        discarded += ctx.input.discard_pending();
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= duration {
            return discarded;
        }
        let remaining = (duration - elapsed).as_micros() as u64;
        clock.delay_us(remaining.min(HOLD_POLL_US));
    }
}

fn out_of_range(opcode: char, value: i32, reason: impl Into<String>) -> CommandError {
    CommandError::OutOfRange {
        opcode,
        value,
        reason: reason.into(),
    }
}
