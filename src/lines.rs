//! Line-terminator normalization.
//!
//! Child process output arrives as a raw byte stream; this module turns it
//! into discrete lines under one definition of "line break": LF, CR, CRLF
//! (one break), and the single-code-point separators NEL (U+0085), LS
//! (U+2028), and PS (U+2029).

use std::io::{ErrorKind, Read};

/// Accumulates characters into lines and hands each completed line
/// (terminator stripped) to the sink.
///
/// A CR closes the current line when the next character arrives, so that
/// CRLF counts as one break. A CR followed immediately by NEL, LS, or PS
/// emits two lines: the accumulated content and then an empty line, because
/// both characters close a line.
pub struct LineAccumulator<F: FnMut(String)> {
    sink: F,
    acc: String,
    pending_cr: bool,
}

impl<F: FnMut(String)> LineAccumulator<F> {
    pub fn new(sink: F) -> Self {
        Self {
            sink,
            acc: String::new(),
            pending_cr: false,
        }
    }

    pub fn push(&mut self, c: char) {
        if self.pending_cr {
            self.pending_cr = false;
            let line = std::mem::take(&mut self.acc);
            (self.sink)(line);
            match c {
                '\n' => {}
                '\r' => self.pending_cr = true,
                '\u{0085}' | '\u{2028}' | '\u{2029}' => (self.sink)(String::new()),
                _ => self.acc.push(c),
            }
        } else {
            match c {
                '\n' | '\u{0085}' | '\u{2028}' | '\u{2029}' => {
                    let line = std::mem::take(&mut self.acc);
                    (self.sink)(line);
                }
                '\r' => self.pending_cr = true,
                _ => self.acc.push(c),
            }
        }
    }

    /// Emits the pending partial line, if any. A bare CR at end of stream
    /// thus emits whatever was accumulated before it, and nothing when
    /// nothing was.
    pub fn flush(&mut self) {
        if !self.acc.is_empty() {
            let line = std::mem::take(&mut self.acc);
            (self.sink)(line);
        }
        self.pending_cr = false;
    }
}

/// Reads `reader` to end of stream, decoding UTF-8 incrementally and feeding
/// every character to the accumulator, then flushes it.
///
/// Multi-byte code points split across read chunks are reassembled; invalid
/// sequences decode to U+FFFD.
pub fn drain_reader<R: Read, F: FnMut(String)>(mut reader: R, acc: &mut LineAccumulator<F>) {
    let mut carry: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                carry.extend_from_slice(&chunk[..n]);
                feed_decoded(&mut carry, acc, false);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    feed_decoded(&mut carry, acc, true);
    acc.flush();
}

fn feed_decoded<F: FnMut(String)>(carry: &mut Vec<u8>, acc: &mut LineAccumulator<F>, eof: bool) {
    loop {
        match std::str::from_utf8(carry) {
            Ok(valid) => {
                for c in valid.chars() {
                    acc.push(c);
                }
                carry.clear();
                return;
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                for c in String::from_utf8_lossy(&carry[..valid_up_to]).chars() {
                    acc.push(c);
                }
                match err.error_len() {
                    Some(invalid) => {
                        acc.push(char::REPLACEMENT_CHARACTER);
                        carry.drain(..valid_up_to + invalid);
                    }
                    None => {
                        // Incomplete trailing sequence: keep it for the next
                        // chunk, unless the stream already ended.
                        if eof {
                            acc.push(char::REPLACEMENT_CHARACTER);
                            carry.clear();
                        } else {
                            carry.drain(..valid_up_to);
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Splits `text` into lines under the unified line-break definition.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    {
        let mut acc = LineAccumulator::new(|line| lines.push(line));
        for c in text.chars() {
            acc.push(c);
        }
        acc.flush();
    }
    lines
}
