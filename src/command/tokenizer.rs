// src/command/tokenizer.rs - Buffer assembly for comma-delimited command text
//!
//! Both ingestion paths end here: [`tokenize`] takes a whole buffer (an HTTP parameter),
//! [`StreamAssembler`] takes bytes as they arrive from a serial line. For the same logical
//! input they produce the same tokens in the same order.
//!
//! A buffer may start with a `(<count>)` group, which replays the whole sequence `count` times.
//! A malformed or empty group counts as 1, and so does a count whose expansion would exceed
//! [`MAX_EXPANDED_TOKENS`].

use super::CommandToken;

/// Upper bound on the tokens one repeat group may expand to.
pub const MAX_EXPANDED_TOKENS: usize = 100_000;

/// Split a complete command buffer into tokens, expanding a leading repeat group.
pub fn tokenize(input: &str) -> Vec<CommandToken> {
    let (repeat, body) = split_repeat(input);
    let sequence: Vec<CommandToken> = body
        .split(',')
        .filter_map(|raw| CommandToken::from_raw(raw.trim()))
        .collect();
    if sequence.is_empty() || repeat == 1 {
        return sequence;
    }

    let repeat = if sequence.len().saturating_mul(repeat) > MAX_EXPANDED_TOKENS {
        tracing::warn!(
            "Repeat group ({}) x {} commands exceeds {} tokens, running once",
            repeat,
            sequence.len(),
            MAX_EXPANDED_TOKENS
        );
        1
    } else {
        repeat
    };
    let mut tokens = Vec::with_capacity(sequence.len() * repeat);
    for _ in 0..repeat {
        tokens.extend(sequence.iter().cloned());
    }
    tokens
}

/// Separate an optional `(<count>)` prefix from the command sequence.
///
/// Without a closing parenthesis the count is 1 and the sequence is everything after `(`.
pub fn split_repeat(input: &str) -> (usize, &str) {
    let trimmed = input.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let Some(rest) = trimmed.strip_prefix('(') else {
        return (1, input);
    };
    match rest.find(')') {
        Some(close) => (parse_repeat(&rest[..close]), &rest[close + 1..]),
        None => (1, rest),
    }
}

fn parse_repeat(group: &str) -> usize {
    match group.trim().parse::<u32>() {
        Ok(count) if count > 0 => count as usize,
        _ => {
            tracing::debug!("Malformed repeat group '({})', running once", group);
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    /// Only whitespace seen since the last flush.
    #[default]
    Undecided,
    /// Emit a token at every comma.
    Plain,
    /// Input opened with `(`; hold everything until flush.
    Grouped,
}

/// Byte-at-a-time assembler for streamed input.
///
/// The caller owns end-of-input: [`StreamAssembler::flush`] emits the trailing partial token.
/// [`StreamAssembler::feed`] treats `\n` and `\r` as end-of-input markers. The abort byte
/// ends the pending input and is emitted as its own token the moment it arrives.
#[derive(Debug)]
pub struct StreamAssembler {
    raw: Vec<u8>,
    mode: Mode,
    abort_code: u8,
}

impl StreamAssembler {
    pub fn new(abort_code: u8) -> Self {
        Self {
            raw: Vec::new(),
            mode: Mode::default(),
            abort_code,
        }
    }

    /// Feed a chunk from a line-oriented transport.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<CommandToken>) {
        for &byte in bytes {
            match byte {
                b'\n' | b'\r' => self.flush(out),
                _ => self.push(byte, out),
            }
        }
    }

    pub fn push(&mut self, byte: u8, out: &mut Vec<CommandToken>) {
        if byte == self.abort_code {
            self.flush(out);
            out.extend(CommandToken::from_raw(char::from(byte).encode_utf8(&mut [0; 4])));
            return;
        }
        if self.mode == Mode::Undecided && !byte.is_ascii_whitespace() {
            self.mode = if byte == b'(' { Mode::Grouped } else { Mode::Plain };
        }
        match self.mode {
            Mode::Plain if byte == b',' => self.emit(out),
            _ => self.raw.push(byte),
        }
    }

    /// End of the logical input: emit whatever is pending and reset.
    pub fn flush(&mut self, out: &mut Vec<CommandToken>) {
        match self.mode {
            Mode::Grouped => {
                out.extend(tokenize(&String::from_utf8_lossy(&self.raw)));
                self.raw.clear();
            }
            Mode::Plain | Mode::Undecided => self.emit(out),
        }
        self.mode = Mode::Undecided;
    }

    /// Bytes held but not yet emitted.
    pub fn pending(&self) -> usize {
        self.raw.len()
    }

    fn emit(&mut self, out: &mut Vec<CommandToken>) {
        let token = CommandToken::from_raw(String::from_utf8_lossy(&self.raw).trim());
        self.raw.clear();
        out.extend(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[CommandToken]) -> Vec<String> {
        tokens.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn split_repeat_handles_groups() {
        assert_eq!(split_repeat("(3)S90"), (3, "S90"));
        assert_eq!(split_repeat("  (2)X1"), (2, "X1"));
        assert_eq!(split_repeat("(x)X100"), (1, "X100"));
        assert_eq!(split_repeat("()X1"), (1, "X1"));
        assert_eq!(split_repeat("(0)X1"), (1, "X1"));
        assert_eq!(split_repeat("(4X1"), (1, "4X1"));
        assert_eq!(split_repeat("X1,(2)"), (1, "X1,(2)"));
    }

    #[test]
    fn stream_emits_at_commas_and_on_flush() {
        let mut assembler = StreamAssembler::new(0x03);
        let mut out = Vec::new();
        for &b in b"S90, Z10" {
            assembler.push(b, &mut out);
        }
        assert_eq!(texts(&out), ["S90"]);
        assert_eq!(assembler.pending(), 4);
        assembler.flush(&mut out);
        assert_eq!(texts(&out), ["S90", "Z10"]);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn stream_holds_grouped_input_until_flush() {
        let mut assembler = StreamAssembler::new(0x03);
        let mut out = Vec::new();
        for &b in b"(2)X1,X2" {
            assembler.push(b, &mut out);
        }
        assert!(out.is_empty());
        assembler.flush(&mut out);
        assert_eq!(texts(&out), ["X1", "X2", "X1", "X2"]);
    }

    #[test]
    fn feed_treats_newlines_as_end_of_input() {
        let mut assembler = StreamAssembler::new(0x03);
        let mut out = Vec::new();
        assembler.feed(b"(2)D5\r\nX1,", &mut out);
        assert_eq!(texts(&out), ["D5", "D5", "X1"]);
    }

    #[test]
    fn abort_byte_is_emitted_without_a_terminator() {
        let mut assembler = StreamAssembler::new(0x03);
        let mut out = Vec::new();
        assembler.feed(b"X1,X2", &mut out);
        assembler.feed(b"\x03", &mut out);
        assert_eq!(texts(&out), ["X1", "X2", "\u{3}"]);
        assert_eq!(assembler.pending(), 0);

        out.clear();
        assembler.feed(b"(2)Z1\x03", &mut out);
        assert_eq!(texts(&out), ["Z1", "Z1", "\u{3}"]);
    }

    #[test]
    fn oversized_repeat_runs_once() {
        assert_eq!(texts(&tokenize("(4294967295)X1")), ["X1"]);
        assert_eq!(texts(&tokenize("(50001)X1,Z1")), ["X1", "Z1"]);
        assert_eq!(tokenize("(50000)X1,Z1").len(), MAX_EXPANDED_TOKENS);
    }

    #[test]
    fn huge_repeat_of_nothing_is_empty() {
        assert!(tokenize("(4294967295)").is_empty());
        assert!(tokenize("(4294967295) , ,").is_empty());
    }
}
