//! Progress stream parsing
//!
//! FFmpeg started with `-progress pipe:1` writes blocks of `key=value` lines to
//! stdout. Only `total_size` (bytes muxed so far) matters for health metrics;
//! every other key is ignored.

use tracing::trace;

/// Key carrying the running byte counter
pub const TOTAL_SIZE_KEY: &str = "total_size";

/// Upper bound for a carried-over partial line; longer garbage is dropped
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Split one chunk into `(key, value)` pairs.
///
/// Lines are separated by `\n` (a trailing `\r` is stripped). Lines without
/// `=` or that are not valid UTF-8 are skipped. A trailing line without a
/// newline is parsed as-is.
pub fn parse_chunk(buffer: &[u8]) -> impl Iterator<Item = (&str, &str)> {
    buffer
        .split(|b| *b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
}

/// Last `total_size` in the pairs; unparsable values count as zero
pub fn last_total_size<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Option<u64> {
    pairs
        .filter(|(key, _)| *key == TOTAL_SIZE_KEY)
        .map(|(_, value)| {
            value.parse::<u64>().unwrap_or_else(|_| {
                trace!("Malformed {} value '{}', using 0", TOTAL_SIZE_KEY, value);
                0
            })
        })
        .last()
}

/// Stateful wrapper that optionally carries an unterminated trailing line
/// into the next chunk so a value split across reads is not misparsed.
#[derive(Debug, Default)]
pub struct ProgressParser {
    buffer_partial_lines: bool,
    pending: Vec<u8>,
}

impl ProgressParser {
    pub fn new(buffer_partial_lines: bool) -> Self {
        Self {
            buffer_partial_lines,
            pending: Vec::new(),
        }
    }

    /// Feed one output chunk, returning the chunk's last `total_size` reading
    pub fn total_size(&mut self, chunk: &[u8]) -> Option<u64> {
        if !self.buffer_partial_lines {
            return last_total_size(parse_chunk(chunk));
        }

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(chunk);

        let complete_len = match data.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => 0,
        };
        let remainder = data.split_off(complete_len);
        if remainder.len() <= MAX_PENDING_BYTES {
            self.pending = remainder;
        } else {
            trace!("Dropping {} byte partial progress line", remainder.len());
        }

        last_total_size(parse_chunk(&data))
    }

    /// Bytes currently held back waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
