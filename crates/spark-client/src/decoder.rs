const FRAME_DELIMITER: &str = "\n\n";
const BYTE_ORDER_MARK: char = '\u{FEFF}';

/// One blank-line delimited record taken from the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub raw: String,
}

impl Frame {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Iterates the frame's lines with any trailing `\r` removed.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw.split('\n').map(|line| line.trim_end_matches('\r'))
    }
}

/// Incremental decoder that turns arbitrary body chunks into complete frames.
///
/// Chunk boundaries carry no meaning: a chunk may hold any number of frames
/// and a frame may span any number of chunks. Multi-byte characters split
/// across chunks are held back until the rest of the sequence arrives. A
/// byte order mark at the very start of the body is dropped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    text: Utf8Carry,
    buf: String,
    started: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw body bytes and returns every frame completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        let decoded = self.text.decode(chunk);
        if decoded.is_empty() {
            return Vec::new();
        }
        if !self.started {
            self.started = true;
            if let Some(rest) = decoded.strip_prefix(BYTE_ORDER_MARK) {
                return self.feed_str(rest);
            }
        }
        self.feed_str(&decoded)
    }

    /// Appends already-decoded text and returns every frame completed by it.
    ///
    /// The trailing segment after the last delimiter stays buffered.
    pub fn feed_str(&mut self, chunk: &str) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buf.push_str(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(idx) = self.buf[start..].find(FRAME_DELIMITER) {
            frames.push(Frame::new(&self.buf[start..start + idx]));
            start += idx + FRAME_DELIMITER.len();
        }
        self.buf.drain(..start);
        frames
    }

    /// Flushes the decoder at end of stream.
    ///
    /// Returns the buffered tail as a final frame when it is non-empty, so a
    /// last record without a trailing delimiter is not lost.
    pub fn finish(&mut self) -> Option<Frame> {
        let tail = self.text.flush();
        self.buf.push_str(&tail);
        if self.buf.is_empty() {
            return None;
        }
        Some(Frame::new(std::mem::take(&mut self.buf)))
    }

    /// Text received but not yet emitted as a frame.
    pub fn buffered(&self) -> &str {
        &self.buf
    }
}

/// Stateful UTF-8 decoding that keeps an incomplete trailing sequence
/// between calls. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
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
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}
