use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ExtractError;

/// Default read-buffer size: 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Default per-element size cap: 10 MiB. A cap of 0 disables the check.
pub const DEFAULT_MAX_ELEMENT_SIZE: usize = 10 * 1024 * 1024;

/// Where the input bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Read from standard input
    Stdin,
    /// Read from a file
    File(PathBuf),
}

/// How extracted elements are framed on the way out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// One element per line, separated by LF
    Ndjson,
    /// A single JSON array: `[` elem `,` elem `]`
    JsonArray,
}

/// Configuration for one extraction run
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Input source
    pub input: Input,

    /// Single-file output path; `None` means stdout
    pub output: Option<PathBuf>,

    /// Array key to extract; empty means the first top-level array
    pub key: String,

    /// Output framing
    pub mode: OutputMode,

    /// Read-buffer size in bytes
    pub buffer_size: usize,

    /// Elements per shard; `None` means a single unsharded output
    pub split: Option<u64>,

    /// Shard filename prefix; required when `split` is set
    pub split_prefix: Option<PathBuf>,

    /// Writer threads; only meaningful in NDJSON mode. 1 keeps output in
    /// document order, 0 means one per available core.
    pub workers: usize,

    /// Replace LF/CR inside element bytes with a space so every output
    /// record stays on one line. Only honored in NDJSON mode.
    pub flatten_newlines: bool,

    /// Per-element size cap in bytes; 0 disables the check
    pub max_element_size: usize,

    /// Directory for parallel-mode temp files; `None` means the system
    /// temp directory
    pub temp_dir: Option<PathBuf>,

    /// Emit periodic progress lines to stderr
    pub verbose: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            input: Input::Stdin,
            output: None,
            key: String::from("accounts"),
            mode: OutputMode::Ndjson,
            buffer_size: DEFAULT_BUFFER_SIZE,
            split: None,
            split_prefix: None,
            workers: 1,
            flatten_newlines: true,
            max_element_size: DEFAULT_MAX_ELEMENT_SIZE,
            temp_dir: None,
            verbose: false,
        }
    }
}

impl ExtractConfig {
    /// Check option combinations that cannot be executed.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.buffer_size == 0 {
            return Err(ExtractError::BadConfig(
                "buffer size must be at least 1 byte".into(),
            ));
        }
        match (self.split, &self.split_prefix) {
            (Some(0), _) => {
                return Err(ExtractError::BadConfig(
                    "split size must be at least 1 element per shard".into(),
                ));
            }
            (Some(_), None) => {
                return Err(ExtractError::BadConfig(
                    "splitting requires a shard prefix".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(ExtractError::BadConfig(
                    "a shard prefix requires a split size".into(),
                ));
            }
            _ => {}
        }
        if self.split.is_some() && self.output.is_some() {
            return Err(ExtractError::BadConfig(
                "single-file output and sharding are mutually exclusive".into(),
            ));
        }
        if self.workers != 1 && self.mode != OutputMode::Ndjson {
            return Err(ExtractError::BadConfig(
                "parallel writers are only available for NDJSON output".into(),
            ));
        }
        Ok(())
    }

    /// Effective worker count: 0 resolves to the platform parallelism.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}

/// One produced shard file and how many records it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub path: PathBuf,
    pub records: u64,
}

/// Totals for a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSummary {
    /// Elements written (or counted)
    pub records: u64,

    /// Bytes consumed from the input stream
    pub bytes_read: u64,

    /// Wall-clock duration of the run in seconds
    pub elapsed_secs: f64,

    /// Produced shard files in index order; empty when unsharded
    pub chunks: Vec<ChunkInfo>,
}

impl ExtractSummary {
    pub fn records_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.records as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn mb_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.bytes_read as f64 / (1024.0 * 1024.0) / self.elapsed_secs
        } else {
            0.0
        }
    }
}
