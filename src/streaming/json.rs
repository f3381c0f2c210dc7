//! Byte-level streaming reader for `{ ..., "key": [ elements ], ... }` documents.
//!
//! Chat exports are one large JSON object with small header fields and a
//! single huge array. [`JsonArrayReader`] walks that object without a full
//! parse: it captures the header fields that precede the array, then yields
//! the raw bytes of one array element at a time. Only the current element is
//! ever buffered.
//!
//! ```
//! use chatload::streaming::JsonArrayReader;
//!
//! let doc = br#"{"name": "Chat", "messages": [{"id": 1}, {"id": 2}]}"#;
//! let mut reader = JsonArrayReader::new(&doc[..], 1024);
//!
//! let header = reader.open_array("messages").unwrap();
//! assert_eq!(header["name"], "Chat");
//!
//! let mut count = 0;
//! while let Some(_value) = reader.next_value().unwrap() {
//!     count += 1;
//! }
//! assert_eq!(count, 2);
//! ```

use std::io::BufRead;

use serde_json::{Map, Value};
use tracing::debug;

use super::{StreamingError, StreamingResult};

/// Largest single header field that is captured.
pub const MAX_HEADER_FIELD: usize = 256 * 1024;

/// Largest total size of captured header fields.
pub const MAX_HEADER_TOTAL: usize = 1024 * 1024;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Elements { first: bool },
    AfterArray,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    Fail,
    Skip,
}

#[derive(Debug, Clone, Copy)]
struct Scanned {
    len: usize,
    captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    More,
    /// Value ended with this byte
    Done,
    /// Value ended before this byte
    Stop,
}

/// Tracks nesting and string state while skimming one value.
#[derive(Debug, Default)]
struct Scanner {
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    fn step(&mut self, b: u8) -> Step {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
                if self.depth == 0 {
                    return Step::Done;
                }
            }
            return Step::More;
        }
        match b {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                if self.depth == 0 {
                    return Step::Stop;
                }
                self.depth -= 1;
                if self.depth == 0 {
                    return Step::Done;
                }
            }
            b',' | b' ' | b'\t' | b'\n' | b'\r' if self.depth == 0 => return Step::Stop,
            _ => {}
        }
        Step::More
    }
}

/// Streaming reader over a JSON object holding one large array.
pub struct JsonArrayReader<R> {
    reader: R,
    offset: u64,
    max_record_size: usize,
    buf: Vec<u8>,
    state: State,
}

impl<R: BufRead> JsonArrayReader<R> {
    /// Creates a reader; elements larger than `max_record_size` bytes abort.
    pub fn new(reader: R, max_record_size: usize) -> Self {
        Self {
            reader,
            offset: 0,
            max_record_size,
            buf: Vec::new(),
            state: State::Header,
        }
    }

    /// Bytes consumed from the underlying reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.offset
    }

    /// Walks the top-level object up to the array stored under `key`.
    ///
    /// Returns the fields that precede it. Oversized or unparsable header
    /// fields are omitted rather than failing the read.
    ///
    /// # Errors
    ///
    /// Fails if the document is not an object, has no array under `key`, or
    /// is syntactically broken before the array starts.
    pub fn open_array(&mut self, key: &str) -> StreamingResult<Map<String, Value>> {
        if self.state != State::Header {
            return Err(StreamingError::InvalidFormat(
                "array already opened".into(),
            ));
        }
        self.skip_bom()?;
        self.expect(b'{', "expected '{' at start of document")?;

        let mut header = Map::new();
        let mut header_bytes = 0usize;
        let mut first = true;
        loop {
            match self.skip_whitespace()? {
                None => return Err(StreamingError::UnexpectedEof),
                Some(b'}') => {
                    return Err(StreamingError::InvalidFormat(format!(
                        "missing \"{key}\" array"
                    )));
                }
                Some(b',') if !first => {
                    self.advance(1);
                }
                Some(_) if first => {}
                Some(_) => return Err(StreamingError::syntax(self.offset, "expected ',' or '}'")),
            }
            first = false;

            let name = self.read_key()?;
            self.expect(b':', "expected ':' after object key")?;

            if name == key {
                return match self.skip_whitespace()? {
                    Some(b'[') => {
                        self.advance(1);
                        self.state = State::Elements { first: true };
                        Ok(header)
                    }
                    Some(_) => Err(StreamingError::InvalidFormat(format!(
                        "\"{key}\" is not an array"
                    ))),
                    None => Err(StreamingError::UnexpectedEof),
                };
            }

            self.capture_field(name, &mut header, &mut header_bytes)?;
        }
    }

    /// Returns the raw bytes of the next array element, or `None` at `]`.
    ///
    /// # Errors
    ///
    /// Fails on broken separators, truncated input, or an element larger than
    /// the configured maximum.
    pub fn next_element(&mut self) -> StreamingResult<Option<&[u8]>> {
        let first = match self.state {
            State::Elements { first } => first,
            State::Header => {
                return Err(StreamingError::InvalidFormat("array not opened".into()));
            }
            State::AfterArray | State::Closed => return Ok(None),
        };

        match self.skip_whitespace()? {
            None => return Err(StreamingError::UnexpectedEof),
            Some(b']') => {
                self.advance(1);
                self.state = State::AfterArray;
                return Ok(None);
            }
            Some(b',') if !first => {
                self.advance(1);
                match self.skip_whitespace()? {
                    None => return Err(StreamingError::UnexpectedEof),
                    Some(b']') => {
                        return Err(StreamingError::syntax(self.offset, "trailing comma in array"));
                    }
                    Some(_) => {}
                }
            }
            Some(_) if first => {}
            Some(_) => return Err(StreamingError::syntax(self.offset, "expected ',' or ']'")),
        }

        let max = self.max_record_size;
        self.scan_value(max, Overflow::Fail)?;
        self.state = State::Elements { first: false };
        Ok(Some(&self.buf))
    }

    /// Parses the next element into a [`Value`].
    ///
    /// # Errors
    ///
    /// As [`next_element`](Self::next_element), plus malformed element JSON.
    pub fn next_value(&mut self) -> StreamingResult<Option<Value>> {
        let offset = self.offset;
        match self.next_element()? {
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| StreamingError::syntax(offset, format!("malformed record: {e}"))),
            None => Ok(None),
        }
    }

    /// Consumes the rest of the document after the array.
    ///
    /// Returns the trailing fields under the same capture limits as the
    /// header and verifies the object is closed.
    ///
    /// # Errors
    ///
    /// Fails if elements remain unread or the document is not closed.
    pub fn finish(&mut self) -> StreamingResult<Map<String, Value>> {
        match self.state {
            State::AfterArray => {}
            State::Closed => return Ok(Map::new()),
            _ => {
                return Err(StreamingError::InvalidFormat(
                    "array not fully consumed".into(),
                ));
            }
        }

        let mut trailer = Map::new();
        let mut total = 0usize;
        loop {
            match self.skip_whitespace()? {
                None => return Err(StreamingError::UnexpectedEof),
                Some(b'}') => {
                    self.advance(1);
                    break;
                }
                Some(b',') => self.advance(1),
                Some(_) => return Err(StreamingError::syntax(self.offset, "expected ',' or '}'")),
            }
            let name = self.read_key()?;
            self.expect(b':', "expected ':' after object key")?;
            self.capture_field(name, &mut trailer, &mut total)?;
        }

        if self.skip_whitespace()?.is_some() {
            return Err(StreamingError::syntax(self.offset, "trailing data after document"));
        }
        self.state = State::Closed;
        Ok(trailer)
    }

    fn capture_field(
        &mut self,
        name: String,
        into: &mut Map<String, Value>,
        total: &mut usize,
    ) -> StreamingResult<()> {
        if self.skip_whitespace()?.is_none() {
            return Err(StreamingError::UnexpectedEof);
        }
        let scanned = self.scan_value(MAX_HEADER_FIELD, Overflow::Skip)?;
        if !scanned.captured || *total + scanned.len > MAX_HEADER_TOTAL {
            debug!(field = %name, bytes = scanned.len, "Skipping oversized header field");
            return Ok(());
        }
        match serde_json::from_slice::<Value>(&self.buf) {
            Ok(value) => {
                *total += scanned.len;
                into.insert(name, value);
            }
            Err(e) => debug!(field = %name, error = %e, "Header field not captured"),
        }
        Ok(())
    }

    fn read_key(&mut self) -> StreamingResult<String> {
        match self.skip_whitespace()? {
            Some(b'"') => {}
            Some(_) => return Err(StreamingError::syntax(self.offset, "expected object key")),
            None => return Err(StreamingError::UnexpectedEof),
        }
        let offset = self.offset;
        self.scan_value(MAX_HEADER_FIELD, Overflow::Fail)?;
        serde_json::from_slice(&self.buf)
            .map_err(|e| StreamingError::syntax(offset, format!("invalid object key: {e}")))
    }

    /// Skims one value into `self.buf`.
    fn scan_value(&mut self, limit: usize, overflow: Overflow) -> StreamingResult<Scanned> {
        self.buf.clear();
        let start = self.offset;
        let mut scanner = Scanner::default();
        let mut len = 0usize;
        let mut captured = true;

        loop {
            let chunk = self.reader.fill_buf()?;
            if chunk.is_empty() {
                return Err(StreamingError::UnexpectedEof);
            }

            let mut used = 0usize;
            let mut finished = false;
            for &b in chunk {
                match scanner.step(b) {
                    Step::More => used += 1,
                    Step::Done => {
                        used += 1;
                        finished = true;
                        break;
                    }
                    Step::Stop => {
                        finished = true;
                        break;
                    }
                }
            }

            len += used;
            if captured {
                if len > limit {
                    if overflow == Overflow::Fail {
                        return Err(StreamingError::BufferOverflow {
                            max_size: limit,
                            actual_size: len,
                        });
                    }
                    captured = false;
                    self.buf.clear();
                } else {
                    self.buf.extend_from_slice(&chunk[..used]);
                }
            }
            self.reader.consume(used);
            self.offset += used as u64;

            if finished {
                break;
            }
        }

        if len == 0 {
            return Err(StreamingError::syntax(start, "expected a value"));
        }
        Ok(Scanned { len, captured })
    }

    fn skip_whitespace(&mut self) -> StreamingResult<Option<u8>> {
        loop {
            let chunk = self.reader.fill_buf()?;
            if chunk.is_empty() {
                return Ok(None);
            }
            let ws = chunk.iter().take_while(|b| b.is_ascii_whitespace()).count();
            if ws < chunk.len() {
                let next = chunk[ws];
                self.advance(ws);
                return Ok(Some(next));
            }
            let all = chunk.len();
            self.advance(all);
        }
    }

    fn skip_bom(&mut self) -> StreamingResult<()> {
        if self.reader.fill_buf()?.starts_with(&UTF8_BOM) {
            self.advance(UTF8_BOM.len());
        }
        Ok(())
    }

    fn expect(&mut self, want: u8, message: &str) -> StreamingResult<()> {
        match self.skip_whitespace()? {
            Some(b) if b == want => {
                self.advance(1);
                Ok(())
            }
            Some(_) => Err(StreamingError::syntax(self.offset, message)),
            None => Err(StreamingError::UnexpectedEof),
        }
    }

    fn advance(&mut self, n: usize) {
        self.reader.consume(n);
        self.offset += n as u64;
    }
}
