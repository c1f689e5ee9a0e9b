//! Reassembly of CRLF-terminated lines from arbitrarily split chunks

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Default cap on the length of an unterminated line
pub const DEFAULT_MAX_PENDING: usize = 8192;

/// Turns raw chunks into complete lines, carrying the unterminated tail
/// over to the next chunk.
///
/// Bytes are consumed one at a time, so the output never depends on how the
/// input was split. A line longer than the limit is dropped whole: once it
/// overflows, everything up to the next CRLF is skipped.
#[derive(Debug)]
pub struct LineAssembler {
    pending: Vec<u8>,
    max_pending: usize,
    discarding: bool,
    overflows: u64,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }

    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
            discarding: false,
            overflows: 0,
        }
    }

    /// Append `chunk` and return every line it completed, in order.
    ///
    /// Empty lines (back-to-back terminators) are returned as-is; filtering
    /// them is up to the caller.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == LF && self.pending.last() == Some(&CR) {
                self.pending.pop();
                if !std::mem::take(&mut self.discarding) {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                }
                self.pending.clear();
                continue;
            }

            if self.discarding {
                // Only a CR that may start the terminator is worth keeping
                self.pending.clear();
                if byte == CR {
                    self.pending.push(byte);
                }
                continue;
            }

            self.pending.push(byte);
            if self.line_len() > self.max_pending {
                self.overflows += 1;
                log::warn!(
                    "Discarding serial line longer than {} bytes",
                    self.max_pending
                );
                self.pending.clear();
                self.discarding = true;
                if byte == CR {
                    self.pending.push(CR);
                }
            }
        }

        lines
    }

    /// The unterminated remainder carried to the next chunk
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// How many overlong lines were dropped
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Length of the pending line, not counting a CR that may be half a terminator
    fn line_len(&self) -> usize {
        let trailing_cr = self.pending.last() == Some(&CR);
        self.pending.len() - usize::from(trailing_cr)
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}
