//! Sliding byte window over the input stream
//!
//! The scanner works on one contiguous buffer. When the buffer runs dry it
//! is refilled with a single read; if an element is being accumulated at
//! that moment, the element's bytes are shifted to the front of the buffer
//! first so the element stays contiguous across the I/O boundary. An
//! element longer than the read size therefore grows the window instead of
//! being evicted.
//!
//! Callers must not hold a slice from [`StreamBuffer::element_bytes`]
//! across any call that can refill (`peek`, `next`).

use std::io::Read;

/// Buffered view over a byte stream with refill-on-demand
pub struct StreamBuffer<R> {
    reader: R,
    buf: Vec<u8>,
    /// Cursor into `buf`; bytes before it are consumed
    pos: usize,
    /// Start of the in-progress element, when one is being accumulated.
    /// Bytes in `buf[element_start..pos]` survive the next refill.
    element_start: Option<usize>,
    read_size: usize,
    bytes_read: u64,
    eof: bool,
}

impl<R: Read> StreamBuffer<R> {
    pub fn new(reader: R, read_size: usize) -> Self {
        StreamBuffer {
            reader,
            buf: Vec::with_capacity(read_size),
            pos: 0,
            element_start: None,
            read_size: read_size.max(1),
            bytes_read: 0,
            eof: false,
        }
    }

    /// Byte at the cursor, refilling if needed. `None` means end of input.
    pub fn peek(&mut self) -> std::io::Result<Option<u8>> {
        if self.pos == self.buf.len() && !self.refill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    /// Consume the byte at the cursor. Only valid after a successful `peek`.
    pub fn bump(&mut self) {
        debug_assert!(self.pos < self.buf.len());
        self.pos += 1;
    }

    /// Consume and return the next byte. `None` means end of input.
    pub fn next(&mut self) -> std::io::Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.bump();
        }
        Ok(byte)
    }

    /// Issue one read of up to the configured size. Returns false at end of
    /// input. Consumed bytes are discarded unless an element is in
    /// progress, in which case its suffix is preserved at offset 0.
    fn refill(&mut self) -> std::io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.element_start {
            Some(start) => {
                self.buf.copy_within(start.., 0);
                self.buf.truncate(self.buf.len() - start);
                self.pos -= start;
                self.element_start = Some(0);
            }
            None => {
                self.buf.clear();
                self.pos = 0;
            }
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + self.read_size, 0);
        let n = self.reader.read(&mut self.buf[old_len..])?;
        self.buf.truncate(old_len + n);
        self.bytes_read += n as u64;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    /// Begin accumulating an element at the cursor.
    pub fn mark_element(&mut self) {
        self.element_start = Some(self.pos);
    }

    /// Length of the element accumulated so far.
    pub fn element_len(&self) -> usize {
        self.element_start.map_or(0, |start| self.pos - start)
    }

    /// Stop accumulating and return the element's bytes. The slice is only
    /// valid until the next call that can refill.
    pub fn take_element(&mut self) -> &[u8] {
        let start = self.element_start.take().unwrap_or(self.pos);
        &self.buf[start..self.pos]
    }

    /// Total bytes read from the underlying stream.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
