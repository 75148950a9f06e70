//! Single-writer output: framing and size-based sharding
//!
//! Shard files are created lazily, on the first element routed to them, so
//! a run whose element count is an exact multiple of the split size never
//! leaves an empty trailing shard on disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExtractError;
use crate::types::{ChunkInfo, OutputMode};

/// Filename for shard `index` (1-based): `<prefix>_<5-digit>.{ndjson|json}`.
pub fn shard_path(prefix: &Path, index: u64, mode: OutputMode) -> PathBuf {
    let ext = match mode {
        OutputMode::Ndjson => "ndjson",
        OutputMode::JsonArray => "json",
    };
    PathBuf::from(format!("{}_{:05}.{}", prefix.display(), index, ext))
}

/// Write one record, optionally replacing LF/CR inside the element bytes
/// with a space so the record cannot span lines. A scanner-emitted JSON
/// string never contains a raw newline, but a pretty-printed structure
/// element can.
pub(crate) fn write_record<W: Write>(
    writer: &mut W,
    bytes: &[u8],
    flatten_newlines: bool,
    scratch: &mut Vec<u8>,
) -> std::io::Result<()> {
    if flatten_newlines && bytes.iter().any(|&b| b == b'\n' || b == b'\r') {
        scratch.clear();
        scratch.extend_from_slice(bytes);
        for b in scratch.iter_mut() {
            if *b == b'\n' || *b == b'\r' {
                *b = b' ';
            }
        }
        writer.write_all(scratch)
    } else {
        writer.write_all(bytes)
    }
}

/// Writes all elements to one sink, NDJSON or JSON-array framed
pub struct SingleWriter<W: Write> {
    writer: W,
    mode: OutputMode,
    flatten_newlines: bool,
    records: u64,
    scratch: Vec<u8>,
}

impl<W: Write> SingleWriter<W> {
    pub fn new(writer: W, mode: OutputMode, flatten_newlines: bool) -> Self {
        SingleWriter {
            writer,
            mode,
            flatten_newlines: flatten_newlines && mode == OutputMode::Ndjson,
            records: 0,
            scratch: Vec::new(),
        }
    }

    pub fn write_element(&mut self, bytes: &[u8]) -> Result<(), ExtractError> {
        match self.mode {
            OutputMode::Ndjson => {
                write_record(&mut self.writer, bytes, self.flatten_newlines, &mut self.scratch)?;
                self.writer.write_all(b"\n")?;
            }
            OutputMode::JsonArray => {
                self.writer
                    .write_all(if self.records == 0 { b"[" } else { b"," })?;
                self.writer.write_all(bytes)?;
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Close the framing and flush. Returns the record count.
    pub fn finish(mut self) -> Result<u64, ExtractError> {
        if self.mode == OutputMode::JsonArray {
            self.writer
                .write_all(if self.records == 0 { b"[]" } else { b"]" })?;
        }
        self.writer.flush()?;
        Ok(self.records)
    }
}

/// Routes elements into `<prefix>_<5-digit>.{ndjson|json}` shard files of
/// at most `split` records each
pub struct ShardWriter {
    prefix: PathBuf,
    split: u64,
    mode: OutputMode,
    flatten_newlines: bool,
    chunk_index: u64,
    records_in_chunk: u64,
    writer: Option<BufWriter<File>>,
    current_path: PathBuf,
    produced: Vec<ChunkInfo>,
    records: u64,
    scratch: Vec<u8>,
}

impl ShardWriter {
    pub fn new(
        prefix: &Path,
        split: u64,
        mode: OutputMode,
        flatten_newlines: bool,
    ) -> Result<Self, ExtractError> {
        if let Some(parent) = prefix.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(ShardWriter {
            prefix: prefix.to_path_buf(),
            split,
            mode,
            flatten_newlines: flatten_newlines && mode == OutputMode::Ndjson,
            chunk_index: 1,
            records_in_chunk: 0,
            writer: None,
            current_path: PathBuf::new(),
            produced: Vec::new(),
            records: 0,
            scratch: Vec::new(),
        })
    }

    /// Records routed to the shard currently being filled.
    pub fn records_in_chunk(&self) -> u64 {
        self.records_in_chunk
    }

    pub fn write_element(&mut self, bytes: &[u8]) -> Result<(), ExtractError> {
        if self.writer.is_none() {
            self.open_chunk()?;
        }
        let writer = self.writer.as_mut().unwrap();
        match self.mode {
            OutputMode::Ndjson => {
                write_record(writer, bytes, self.flatten_newlines, &mut self.scratch)?;
                writer.write_all(b"\n")?;
            }
            OutputMode::JsonArray => {
                if self.records_in_chunk > 0 {
                    writer.write_all(b",")?;
                }
                writer.write_all(bytes)?;
            }
        }
        self.records_in_chunk += 1;
        self.records += 1;
        if self.records_in_chunk == self.split {
            self.close_chunk()?;
        }
        Ok(())
    }

    fn open_chunk(&mut self) -> Result<(), ExtractError> {
        let path = shard_path(&self.prefix, self.chunk_index, self.mode);
        tracing::debug!(chunk = self.chunk_index, path = %path.display(), "opening shard");
        let mut writer = BufWriter::new(File::create(&path)?);
        if self.mode == OutputMode::JsonArray {
            writer.write_all(b"[")?;
        }
        self.writer = Some(writer);
        self.current_path = path;
        Ok(())
    }

    fn close_chunk(&mut self) -> Result<(), ExtractError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        if self.records_in_chunk == 0 {
            // A shard that received nothing must not stay on disk.
            drop(writer);
            std::fs::remove_file(&self.current_path)?;
        } else {
            if self.mode == OutputMode::JsonArray {
                writer.write_all(b"]")?;
            }
            writer.flush()?;
            tracing::debug!(
                chunk = self.chunk_index,
                records = self.records_in_chunk,
                "shard closed"
            );
            self.produced.push(ChunkInfo {
                path: std::mem::take(&mut self.current_path),
                records: self.records_in_chunk,
            });
        }
        self.records_in_chunk = 0;
        self.chunk_index += 1;
        Ok(())
    }

    /// Close the open shard, if any. Returns total records and the shard
    /// list in index order.
    pub fn finish(mut self) -> Result<(u64, Vec<ChunkInfo>), ExtractError> {
        self.close_chunk()?;
        Ok((self.records, self.produced))
    }
}
