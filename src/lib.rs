//! # Decant - Streaming JSON Array Extraction
//!
//! A single-pass, bounded-memory extractor for a named JSON array embedded
//! inside an arbitrarily large document. Given a byte stream that somewhere
//! contains `"key": [ ... ]`, decant locates the array and emits each
//! top-level element byte-for-byte, as NDJSON lines or as JSON-array files,
//! optionally sharded by element count and optionally fanned out over a
//! pool of writer threads.
//!
//! Elements are never parsed into a DOM: the scanner tracks string
//! literals, escape sequences and nesting depth, and the bytes it emits are
//! exactly the bytes it read.
//!
//! ## Quick Start
//!
//! ```rust
//! use decant::ElementScanner;
//!
//! # fn main() -> Result<(), decant::ExtractError> {
//! let doc = br#"{"accounts":[{"id":1},{"id":2}]}"#;
//!
//! let mut scanner = ElementScanner::new(&doc[..], 4096);
//! scanner.locate("accounts")?;
//!
//! let mut elements = Vec::new();
//! while let Some(element) = scanner.next_element()? {
//!     elements.push(String::from_utf8_lossy(element).into_owned());
//! }
//! assert_eq!(elements, vec![r#"{"id":1}"#, r#"{"id":2}"#]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Whole runs
//!
//! [`extract`] drives a complete run from an [`ExtractConfig`]: it opens
//! the input, locates the array, routes every element to the configured
//! sinks and returns an [`ExtractSummary`]. With more than one worker (and
//! NDJSON output) the elements travel through a work queue to a writer
//! pool; order within a shard then depends on worker interleaving, so keep
//! `workers` at 1 when strict document order matters.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

pub mod buffer;
pub mod error;
pub mod locate;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod types;

pub use buffer::StreamBuffer;
pub use error::ExtractError;
pub use output::{ShardWriter, SingleWriter};
pub use progress::ProgressReporter;
pub use scanner::ElementScanner;
pub use types::{
    ChunkInfo, ExtractConfig, ExtractSummary, Input, OutputMode, DEFAULT_BUFFER_SIZE,
    DEFAULT_MAX_ELEMENT_SIZE,
};

fn open_scanner(config: &ExtractConfig) -> Result<ElementScanner<Box<dyn Read>>, ExtractError> {
    let reader: Box<dyn Read> = match &config.input {
        Input::Stdin => Box::new(io::stdin().lock()),
        Input::File(path) => {
            if !path.exists() {
                return Err(ExtractError::InputNotFound(path.clone()));
            }
            Box::new(File::open(path)?)
        }
    };
    Ok(ElementScanner::new(reader, config.buffer_size)
        .with_max_element_size(config.max_element_size))
}

/// Run a full extraction: locate the array, emit every element to the
/// configured output, and return the totals.
pub fn extract(config: &ExtractConfig) -> Result<ExtractSummary, ExtractError> {
    config.validate()?;
    let mut scanner = open_scanner(config)?;
    scanner.locate(&config.key)?;
    let mut progress = ProgressReporter::new(config.verbose);

    let (records, chunks) = if config.mode == OutputMode::Ndjson && config.effective_workers() > 1
    {
        output::run_parallel(&mut scanner, config, &mut progress)?
    } else if let (Some(split), Some(prefix)) = (config.split, config.split_prefix.as_deref()) {
        let mut writer = ShardWriter::new(prefix, split, config.mode, config.flatten_newlines)?;
        let mut records = 0u64;
        while let Some(element) = scanner.next_element()? {
            writer.write_element(element)?;
            records += 1;
            progress.tick(scanner.bytes_read(), records, writer.records_in_chunk());
        }
        writer.finish()?
    } else {
        let sink: Box<dyn Write> = match &config.output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Box::new(File::create(path)?)
            }
            None => Box::new(io::stdout().lock()),
        };
        let mut writer =
            SingleWriter::new(BufWriter::new(sink), config.mode, config.flatten_newlines);
        let mut records = 0u64;
        while let Some(element) = scanner.next_element()? {
            writer.write_element(element)?;
            records += 1;
            progress.tick(scanner.bytes_read(), records, records);
        }
        (writer.finish()?, Vec::new())
    };

    Ok(progress.finish(records, scanner.bytes_read(), chunks))
}

/// Locate the array and count its elements without writing anything.
pub fn count_elements(config: &ExtractConfig) -> Result<ExtractSummary, ExtractError> {
    let mut scanner = open_scanner(config)?;
    scanner.locate(&config.key)?;
    let mut progress = ProgressReporter::new(config.verbose);

    let mut records = 0u64;
    while scanner.next_element()?.is_some() {
        records += 1;
        progress.tick(scanner.bytes_read(), records, records);
    }
    Ok(progress.finish(records, scanner.bytes_read(), Vec::new()))
}
