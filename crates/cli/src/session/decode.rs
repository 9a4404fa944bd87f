// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental UTF-8 decoding of PTY output.

/// Decodes a byte stream chunk by chunk, holding back a multi-byte
/// sequence that is split across reads until the rest arrives.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, prefixed by any bytes held back from the previous
    /// call. Invalid sequences become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let keep = incomplete_tail(&input);
        let split = input.len() - keep;
        self.pending = input.split_off(split);
        String::from_utf8_lossy(&input).into_owned()
    }

    /// Flush held-back bytes, replacing them with U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Length of a trailing, truncated-but-valid UTF-8 prefix.
fn incomplete_tail(bytes: &[u8]) -> usize {
    // A sequence is at most 4 bytes, so only the last 3 can be incomplete.
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let need = match b {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        let have = bytes.len() - i;
        return if have < need { have } else { 0 };
    }
    0
}
