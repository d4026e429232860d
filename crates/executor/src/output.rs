/// Bytes inspected when classifying a stream as text or binary.
pub const SNIFF_WINDOW: usize = 4096;

/// Live-output notice handed to the caller's callback, throttled by the
/// executor. The final result always carries the complete output; these are
/// display hints only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Snapshot of the combined decoded output so far.
    Text(String),
    /// Emitted instead of text once the stream is classified binary.
    BinaryProgress { bytes: u64 },
}

#[derive(Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decodes a chunk, carrying an incomplete trailing code point over to
    /// the next call so sequences split across reads never corrupt output.
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the chunk boundary.
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            "\u{FFFD}".to_string()
        }
    }
}

/// Drops ANSI escape sequences (CSI and OSC) so color and cursor control
/// codes never reach the accumulated text.
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            // CSI: parameter and intermediate bytes, then one final byte.
            Some('[') => {
                chars.next();
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if ('\u{40}'..='\u{7e}').contains(&next) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ST.
            Some(']') => {
                chars.next();
                while let Some(next) = chars.next() {
                    if next == '\u{7}' {
                        break;
                    }
                    if next == '\u{1b}' {
                        if chars.peek() == Some(&'\\') {
                            chars.next();
                        }
                        break;
                    }
                }
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }
    out
}

fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let suspicious = sample
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20) || b == 0x7f)
        .count();
    suspicious * 100 > sample.len() * 30
}

/// Folds raw stdout/stderr chunks into a live combined view, final
/// per-stream strings, and a raw byte buffer. Binary classification is
/// one-way: once flagged, the run never reverts to text streaming.
pub struct OutputAggregator {
    stdout: String,
    stderr: String,
    combined: String,
    raw: Vec<u8>,
    binary: bool,
    sniffing: bool,
    stdout_carry: Utf8Carry,
    stderr_carry: Utf8Carry,
}

impl Default for OutputAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            combined: String::new(),
            raw: Vec::new(),
            binary: false,
            sniffing: true,
            stdout_carry: Utf8Carry::default(),
            stderr_carry: Utf8Carry::default(),
        }
    }

    /// Absorbs a chunk and returns the decoded text it contributed.
    pub fn push_stdout(&mut self, chunk: &[u8]) -> String {
        self.push(chunk, false)
    }

    pub fn push_stderr(&mut self, chunk: &[u8]) -> String {
        self.push(chunk, true)
    }

    fn push(&mut self, chunk: &[u8], is_stderr: bool) -> String {
        self.raw.extend_from_slice(chunk);

        if self.sniffing {
            let sample = &self.raw[..self.raw.len().min(SNIFF_WINDOW)];
            if looks_binary(sample) {
                tracing::debug!(sampled = sample.len(), "output classified as binary");
                self.binary = true;
                self.sniffing = false;
            } else if self.raw.len() >= SNIFF_WINDOW {
                // Window filled without a hit; the classification is settled.
                self.sniffing = false;
            }
        }

        let carry = if is_stderr {
            &mut self.stderr_carry
        } else {
            &mut self.stdout_carry
        };
        let decoded = strip_ansi(&carry.decode(chunk));
        if is_stderr {
            self.stderr.push_str(&decoded);
        } else {
            self.stdout.push_str(&decoded);
        }
        self.combined.push_str(&decoded);
        decoded
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn total_bytes(&self) -> u64 {
        self.raw.len() as u64
    }

    pub fn combined(&self) -> &str {
        &self.combined
    }

    /// The notice the throttled live stream should carry right now.
    pub fn live_event(&self) -> OutputEvent {
        if self.binary {
            OutputEvent::BinaryProgress {
                bytes: self.total_bytes(),
            }
        } else {
            OutputEvent::Text(self.combined.clone())
        }
    }

    /// Final per-stream text and the raw byte buffer.
    pub fn finish(mut self) -> (String, String, Vec<u8>) {
        let tail = self.stdout_carry.finish();
        self.stdout.push_str(&tail);
        let tail = self.stderr_carry.finish();
        self.stderr.push_str(&tail);
        (self.stdout, self.stderr, self.raw)
    }
}
