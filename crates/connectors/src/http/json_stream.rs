//! Incremental decoding of a top-level JSON array of objects.
//!
//! Bytes are fed as they arrive; each element is deserialized as soon as its
//! closing brace is buffered. Only the current element is kept in memory.

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonStreamError {
    #[error("Expected '{expected}' at byte {offset}, found '{found}'")]
    UnexpectedToken {
        expected: &'static str,
        found: char,
        offset: u64,
    },

    #[error("Failed to deserialize array element: {0}")]
    Element(#[from] serde_json::Error),

    #[error("Stream ended before the JSON array was closed")]
    Incomplete,

    #[error("Unexpected data after the end of the JSON array at byte {0}")]
    TrailingData(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Waiting for `[`.
    Start,
    /// Between elements.
    Between,
    /// Inside an object that started at buffer offset 0.
    Element,
    /// After `]`.
    Done,
}

pub struct JsonArrayDecoder<T> {
    buf: BytesMut,
    /// Scan position inside `buf`.
    pos: usize,
    /// Bytes already dropped from the front of the stream, for error offsets.
    consumed: u64,
    state: ArrayState,
    depth: u32,
    in_string: bool,
    escaped: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonArrayDecoder<T> {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            pos: 0,
            consumed: 0,
            state: ArrayState::Start,
            depth: 0,
            in_string: false,
            escaped: false,
            _marker: PhantomData,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn is_done(&self) -> bool {
        self.state == ArrayState::Done
    }

    /// Returns the next complete element, or `None` if more input is needed
    /// or the array is closed.
    pub fn decode_next(&mut self) -> Result<Option<T>, JsonStreamError> {
        while self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            match self.state {
                ArrayState::Start => {
                    if !byte.is_ascii_whitespace() {
                        if byte != b'[' {
                            return Err(self.unexpected("[", byte));
                        }
                        self.state = ArrayState::Between;
                    }
                    self.skip_scanned();
                }
                ArrayState::Between => match byte {
                    b'{' => {
                        self.discard_scanned();
                        self.state = ArrayState::Element;
                        self.depth = 1;
                        self.pos = 1;
                    }
                    b']' => {
                        self.state = ArrayState::Done;
                        self.skip_scanned();
                    }
                    b',' => self.skip_scanned(),
                    b if b.is_ascii_whitespace() => self.skip_scanned(),
                    other => return Err(self.unexpected("{", other)),
                },
                ArrayState::Element => {
                    self.pos += 1;
                    if self.scan_element_byte(byte) {
                        let element = self.buf.split_to(self.pos);
                        self.consumed += self.pos as u64;
                        self.pos = 0;
                        self.state = ArrayState::Between;
                        return Ok(Some(serde_json::from_slice(&element)?));
                    }
                }
                ArrayState::Done => {
                    if !byte.is_ascii_whitespace() {
                        return Err(JsonStreamError::TrailingData(
                            self.consumed + self.pos as u64,
                        ));
                    }
                    self.skip_scanned();
                }
            }
        }
        Ok(None)
    }

    /// Validates that the array was closed once the input is exhausted.
    pub fn finish(&self) -> Result<(), JsonStreamError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(JsonStreamError::Incomplete)
        }
    }

    /// Tracks nesting inside an element; returns `true` when the element closes.
    fn scan_element_byte(&mut self, byte: u8) -> bool {
        if self.in_string {
            match byte {
                _ if self.escaped => self.escaped = false,
                b'\\' => self.escaped = true,
                b'"' => self.in_string = false,
                _ => {}
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth -= 1;
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }

    /// Drops the single byte at the front of the buffer outside of an element.
    fn skip_scanned(&mut self) {
        self.buf.advance(1);
        self.consumed += 1;
        self.pos = 0;
    }

    fn discard_scanned(&mut self) {
        if self.pos > 0 {
            self.buf.advance(self.pos);
            self.consumed += self.pos as u64;
            self.pos = 0;
        }
    }

    fn unexpected(&self, expected: &'static str, found: u8) -> JsonStreamError {
        JsonStreamError::UnexpectedToken {
            expected,
            found: found as char,
            offset: self.consumed + self.pos as u64,
        }
    }
}

impl<T: DeserializeOwned> Default for JsonArrayDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}
