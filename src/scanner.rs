//! Element scanner
//!
//! Emits, one at a time, the verbatim byte range of each top-level element
//! of the target array. The scanner never builds a DOM: its state is the
//! string/escape flags and a nesting depth, and the element bytes live in
//! the underlying [`StreamBuffer`] window until the next call.
//!
//! Between elements, whitespace and commas are skipped freely. Strict JSON
//! would reject a trailing comma before `]`; this scanner tolerates it, the
//! same way the tool always has. Callers that need strictness must validate
//! at a higher layer.

use std::io::Read;

use crate::buffer::StreamBuffer;
use crate::error::ExtractError;
use crate::locate::locate_array;

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}

/// Pull-based scanner over the elements of one JSON array
pub struct ElementScanner<R> {
    src: StreamBuffer<R>,
    /// Per-element size cap in bytes; 0 disables the check
    max_element_size: usize,
    /// Set once the closing `]` (or a tolerated EOF) has been seen
    done: bool,
}

impl<R: Read> ElementScanner<R> {
    pub fn new(reader: R, read_size: usize) -> Self {
        ElementScanner {
            src: StreamBuffer::new(reader, read_size),
            max_element_size: 0,
            done: false,
        }
    }

    /// Fail any element that accumulates more than `limit` bytes.
    pub fn with_max_element_size(mut self, limit: usize) -> Self {
        self.max_element_size = limit;
        self
    }

    /// Advance to just past the `[` that opens the array under `key`.
    /// An empty key selects the first top-level array.
    pub fn locate(&mut self, key: &str) -> Result<(), ExtractError> {
        locate_array(&mut self.src, key)
    }

    /// Total bytes read from the input so far.
    pub fn bytes_read(&self) -> u64 {
        self.src.bytes_read()
    }

    /// Next element as a verbatim byte slice, or `None` once the array is
    /// closed. The slice is only valid until the next call.
    ///
    /// End of input inside a string or structure, or between elements
    /// before the closing `]`, is a `TruncatedElement` error. A primitive
    /// cut off by end of input is emitted and ends the array.
    pub fn next_element(&mut self) -> Result<Option<&[u8]>, ExtractError> {
        if self.done {
            return Ok(None);
        }

        loop {
            match self.src.peek()? {
                None => {
                    self.done = true;
                    return Err(ExtractError::TruncatedElement);
                }
                Some(b) if is_ws(b) || b == b',' => self.src.bump(),
                Some(b']') => {
                    self.src.bump();
                    self.done = true;
                    return Ok(None);
                }
                Some(b'"') => return self.scan_string().map(Some),
                Some(b'{') | Some(b'[') => return self.scan_structure().map(Some),
                Some(_) => return self.scan_primitive().map(Some),
            }
        }
    }

    fn check_size(&self) -> Result<(), ExtractError> {
        if self.max_element_size != 0 && self.src.element_len() > self.max_element_size {
            return Err(ExtractError::ElementTooLarge {
                limit: self.max_element_size,
            });
        }
        Ok(())
    }

    /// A bare string element; ends at the unescaped closing quote.
    fn scan_string(&mut self) -> Result<&[u8], ExtractError> {
        self.src.mark_element();
        self.src.bump();
        let mut escape = false;
        loop {
            let b = match self.src.next()? {
                Some(b) => b,
                None => return Err(ExtractError::TruncatedElement),
            };
            self.check_size()?;
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                return Ok(self.src.take_element());
            }
        }
    }

    /// An object or array element; ends when the nesting depth returns to
    /// zero. Structural bytes inside string literals do not count.
    fn scan_structure(&mut self) -> Result<&[u8], ExtractError> {
        self.src.mark_element();
        self.src.bump();
        let mut depth: u32 = 1;
        let mut in_string = false;
        let mut escape = false;
        loop {
            let b = match self.src.next()? {
                Some(b) => b,
                None => return Err(ExtractError::TruncatedElement),
            };
            self.check_size()?;
            if in_string {
                if escape {
                    escape = false;
                } else if b == b'\\' {
                    escape = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.src.take_element());
                    }
                }
                _ => {}
            }
        }
    }

    /// A number, boolean or null; ends before the `,` or `]` that follows,
    /// which is left unconsumed. End of input ends the element and the
    /// array with it.
    fn scan_primitive(&mut self) -> Result<&[u8], ExtractError> {
        self.src.mark_element();
        loop {
            let b = self.src.peek()?;
            if let Some(b) = b {
                if b != b',' && b != b']' {
                    self.src.bump();
                    self.check_size()?;
                    continue;
                }
            } else {
                self.done = true;
            }
            let bytes = self.src.take_element();
            let mut end = bytes.len();
            while end > 0 && is_ws(bytes[end - 1]) {
                end -= 1;
            }
            return Ok(&bytes[..end]);
        }
    }
}
