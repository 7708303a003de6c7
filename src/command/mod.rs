//! Command tokens and opcode decoding.
//!
//! A token on the wire is `<opcode-char><optional signed decimal integer>`. The tokenizer only
//! splits and trims; deciding whether an operand is acceptable is left to the dispatcher.

pub mod queue;
pub mod tokenizer;

use std::fmt;
use thiserror::Error;

use crate::hardware::HardwareError;

pub use queue::{CommandQueue, QueueError};
pub use tokenizer::{StreamAssembler, tokenize};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid command '{0}': use S, Z, X, D, F, G, H or C followed by a value")]
    InvalidOpcode(String),
    #[error("{opcode}{value} rejected: {reason}")]
    OutOfRange {
        opcode: char,
        value: i32,
        reason: String,
    },
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
}

/// One trimmed, non-empty unit of a command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandToken {
    opcode: char,
    operand: String,
}

impl CommandToken {
    /// Build a token from already trimmed text. Empty text yields no token.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        let opcode = chars.next()?;
        Some(Self {
            opcode,
            operand: chars.as_str().to_string(),
        })
    }

    pub fn opcode(&self) -> char {
        self.opcode
    }

    /// Raw text following the opcode, unparsed.
    pub fn operand(&self) -> &str {
        &self.operand
    }

    /// Operand as an integer; see [`parse_operand`].
    pub fn value(&self) -> i32 {
        parse_operand(&self.operand)
    }
}

impl fmt::Display for CommandToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.opcode, self.operand)
    }
}

/// Parse the leading signed integer of `text`.
///
/// Leading whitespace is skipped and parsing stops at the first non-digit, so `"12abc"` is 12
/// and `"abc"` or `""` is 0. Values beyond the `i32` range saturate.
pub fn parse_operand(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut magnitude: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        magnitude = magnitude
            .saturating_mul(10)
            .saturating_add(i64::from(b - b'0'));
    }
    let signed = if negative { -magnitude } else { magnitude };
    signed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// A decoded token, one variant per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `S`: servo angle in logical degrees (0-360).
    Servo(i32),
    /// `Z`: signed Z step count.
    MoveZ(i32),
    /// `X`: signed X step count.
    MoveX(i32),
    /// `D`: blocking hold in milliseconds.
    Delay(i32),
    /// `F`: X feedrate in steps per second.
    SetXFeedrate(i32),
    /// `G`: Z feedrate in steps per second.
    SetZFeedrate(i32),
    /// `H`: saved load offset in steps.
    SetLoadOffset(i32),
    /// `C`: settle delay before stepper moves, milliseconds.
    SetSettleDelay(i32),
    /// Emergency stop control code.
    Abort,
    Invalid(char),
}

impl Command {
    pub fn decode(token: &CommandToken, abort_code: u8) -> Self {
        let value = token.value();
        match token.opcode() {
            c if c == char::from(abort_code) => Command::Abort,
            'S' => Command::Servo(value),
            'Z' => Command::MoveZ(value),
            'X' => Command::MoveX(value),
            'D' => Command::Delay(value),
            'F' => Command::SetXFeedrate(value),
            'G' => Command::SetZFeedrate(value),
            'H' => Command::SetLoadOffset(value),
            'C' => Command::SetSettleDelay(value),
            other => Command::Invalid(other),
        }
    }
}
