//! Work-queue writer pool for NDJSON output
//!
//! One parser thread scans elements and assigns each a 1-based `seq`; a
//! bounded channel feeds a pool of writer threads. Every worker writes the
//! elements it dequeues to its own per-chunk temp file, so no file handle
//! is ever shared. After the workers join, a single-threaded merge
//! concatenates the temp files in worker-id order per ascending chunk index
//! into the final output.
//!
//! Elements land in the chunk `ceil(seq / split)`, so each shard holds
//! exactly the right records, but the order *within* a shard is the
//! concatenation of per-worker runs, not ascending `seq`. Callers that need
//! strict document order use a single worker.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError};

use crate::error::ExtractError;
use crate::output::router::{shard_path, write_record};
use crate::progress::ProgressReporter;
use crate::scanner::ElementScanner;
use crate::types::{ChunkInfo, ExtractConfig, OutputMode};

/// Queue depth between the parser and the writer pool.
const QUEUE_CAP: usize = 1024;

/// Open temp-file handles a worker keeps around before recycling the
/// least recently used one.
const MAX_OPEN_HANDLES: usize = 8;

enum Message {
    Element { seq: u64, bytes: Vec<u8> },
    Shutdown,
}

/// Basename used for temp files, so a path-shaped prefix never embeds
/// directory separators into a temp filename.
fn safe_prefix(config: &ExtractConfig) -> String {
    config
        .split_prefix
        .as_deref()
        .or(config.output.as_deref())
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("out"))
}

fn temp_path(dir: &Path, prefix: &str, chunk: u64, worker_id: usize) -> PathBuf {
    dir.join(format!("{}_{:05}_w{:02}.ndtmp", prefix, chunk, worker_id))
}

/// Per-worker temp-file handles with LRU recycling
struct WorkerFiles {
    dir: PathBuf,
    prefix: String,
    worker_id: usize,
    handles: HashMap<u64, BufWriter<File>>,
    lru: VecDeque<u64>,
    counts: HashMap<u64, u64>,
}

impl WorkerFiles {
    fn new(dir: PathBuf, prefix: String, worker_id: usize) -> Self {
        WorkerFiles {
            dir,
            prefix,
            worker_id,
            handles: HashMap::new(),
            lru: VecDeque::new(),
            counts: HashMap::new(),
        }
    }

    fn writer_for(&mut self, chunk: u64) -> io::Result<&mut BufWriter<File>> {
        if self.handles.contains_key(&chunk) {
            if let Some(idx) = self.lru.iter().position(|&c| c == chunk) {
                self.lru.remove(idx);
                self.lru.push_back(chunk);
            }
        } else {
            if self.handles.len() == MAX_OPEN_HANDLES {
                if let Some(oldest) = self.lru.pop_front() {
                    if let Some(mut writer) = self.handles.remove(&oldest) {
                        writer.flush()?;
                    }
                }
            }
            // Append mode: a recycled handle may be reopened for the same
            // chunk later.
            let path = temp_path(&self.dir, &self.prefix, chunk, self.worker_id);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.handles.insert(chunk, BufWriter::new(file));
            self.lru.push_back(chunk);
        }
        Ok(self.handles.get_mut(&chunk).unwrap())
    }

    fn flush_all(&mut self) -> io::Result<()> {
        for writer in self.handles.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<Message>,
    dir: PathBuf,
    prefix: String,
    split: Option<u64>,
    flatten_newlines: bool,
    abort: Arc<AtomicBool>,
) -> Result<HashMap<u64, u64>, String> {
    let mut files = WorkerFiles::new(dir, prefix, worker_id);
    let mut scratch = Vec::new();
    let mut failure: Option<String> = None;

    loop {
        match rx.recv() {
            Ok(Message::Element { seq, bytes }) => {
                // After a failure anywhere in the pool, keep draining so the
                // parser never blocks on a full queue.
                if failure.is_some() || abort.load(Ordering::Relaxed) {
                    continue;
                }
                let chunk = split.map_or(1, |s| (seq - 1) / s + 1);
                let result = files.writer_for(chunk).and_then(|writer| {
                    write_record(writer, &bytes, flatten_newlines, &mut scratch)?;
                    writer.write_all(b"\n")
                });
                match result {
                    Ok(()) => *files.counts.entry(chunk).or_insert(0) += 1,
                    Err(err) => {
                        abort.store(true, Ordering::Relaxed);
                        failure = Some(format!("worker {:02}: {}", worker_id, err));
                    }
                }
            }
            Ok(Message::Shutdown) | Err(_) => break,
        }
    }

    if failure.is_none() {
        if let Err(err) = files.flush_all() {
            abort.store(true, Ordering::Relaxed);
            failure = Some(format!("worker {:02}: {}", worker_id, err));
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(files.counts),
    }
}

/// Concatenate the per-worker temp files for one chunk, in worker-id order,
/// into `out`, unlinking each temp file as it is consumed.
fn merge_chunk(
    dir: &Path,
    prefix: &str,
    chunk: u64,
    workers: usize,
    out: &mut dyn Write,
) -> io::Result<()> {
    for worker_id in 1..=workers {
        let path = temp_path(dir, prefix, chunk, worker_id);
        if !path.exists() {
            continue;
        }
        let mut file = File::open(&path)?;
        io::copy(&mut file, out)?;
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// Run the scanner-to-workers pipeline and the final merge pass.
///
/// Returns total records and the produced shard list (empty when unsplit).
pub fn run_parallel<R: Read>(
    scanner: &mut ElementScanner<R>,
    config: &ExtractConfig,
    progress: &mut ProgressReporter,
) -> Result<(u64, Vec<ChunkInfo>), ExtractError> {
    let workers = config.effective_workers();
    let split = config.split;
    let flatten_newlines = config.flatten_newlines;

    let temp_root = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&temp_root)?;
    let temp_dir = tempfile::Builder::new()
        .prefix("decant-")
        .tempdir_in(&temp_root)?;
    let prefix = safe_prefix(config);
    tracing::debug!(workers, temp_dir = %temp_dir.path().display(), "writer pool starting");

    let abort = Arc::new(AtomicBool::new(false));
    let (tx, rx) = bounded::<Message>(QUEUE_CAP);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 1..=workers {
        let rx = rx.clone();
        let dir = temp_dir.path().to_path_buf();
        let prefix = prefix.clone();
        let abort = Arc::clone(&abort);
        let handle = thread::Builder::new()
            .name(format!("decant-writer-{:02}", worker_id))
            .spawn(move || {
                worker_loop(worker_id, rx, dir, prefix, split, flatten_newlines, abort)
            })
            .map_err(|err| {
                ExtractError::WorkerFailure(format!("failed to spawn worker: {}", err))
            })?;
        handles.push(handle);
    }
    drop(rx);

    let mut records = 0u64;
    let parse_result: Result<(), ExtractError> = (|| {
        loop {
            let bytes = match scanner.next_element()? {
                Some(element) => element.to_vec(),
                None => return Ok(()),
            };
            records += 1;
            let mut message = Message::Element { seq: records, bytes };
            loop {
                if abort.load(Ordering::Relaxed) {
                    return Ok(());
                }
                match tx.send_timeout(message, Duration::from_millis(100)) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(returned)) => message = returned,
                    Err(SendTimeoutError::Disconnected(_)) => return Ok(()),
                }
            }
            let chunk_records = split.map_or(records, |s| (records - 1) % s + 1);
            progress.tick(scanner.bytes_read(), records, chunk_records);
        }
    })();

    for _ in 0..workers {
        let _ = tx.send(Message::Shutdown);
    }
    drop(tx);

    let mut counts: HashMap<u64, u64> = HashMap::new();
    let mut worker_error: Option<String> = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(worker_counts)) => {
                for (chunk, n) in worker_counts {
                    *counts.entry(chunk).or_insert(0) += n;
                }
            }
            Ok(Err(err)) => {
                worker_error.get_or_insert(err);
            }
            Err(_) => {
                worker_error.get_or_insert_with(|| String::from("worker thread panicked"));
            }
        }
    }

    // Dropping `temp_dir` on any early return removes the leftover temp
    // files along with the directory.
    if let Some(err) = worker_error {
        return Err(ExtractError::WorkerFailure(err));
    }
    parse_result?;

    let max_chunk = counts.keys().copied().max().unwrap_or(0);
    let mut produced = Vec::new();
    match split {
        Some(_) => {
            let Some(shard_prefix) = config.split_prefix.as_deref() else {
                return Err(ExtractError::BadConfig(
                    "splitting requires a shard prefix".into(),
                ));
            };
            if let Some(parent) = shard_prefix.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            for chunk in 1..=max_chunk {
                let records_in_chunk = counts.get(&chunk).copied().unwrap_or(0);
                if records_in_chunk == 0 {
                    continue;
                }
                let path = shard_path(shard_prefix, chunk, OutputMode::Ndjson);
                let mut writer = BufWriter::new(File::create(&path)?);
                merge_chunk(temp_dir.path(), &prefix, chunk, workers, &mut writer)?;
                writer.flush()?;
                tracing::debug!(chunk, records = records_in_chunk, "shard merged");
                produced.push(ChunkInfo {
                    path,
                    records: records_in_chunk,
                });
            }
        }
        None => {
            let mut writer: Box<dyn Write> = match &config.output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent)?;
                        }
                    }
                    Box::new(BufWriter::new(File::create(path)?))
                }
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            merge_chunk(temp_dir.path(), &prefix, 1, workers, &mut writer)?;
            writer.flush()?;
        }
    }

    temp_dir.close()?;
    Ok((records, produced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scanner_for(doc: String, key: &str) -> ElementScanner<Cursor<Vec<u8>>> {
        let mut scanner = ElementScanner::new(Cursor::new(doc.into_bytes()), 4096);
        scanner.locate(key).unwrap();
        scanner
    }

    fn array_doc(n: u64) -> String {
        let elements: Vec<String> = (1..=n).map(|i| format!("{{\"id\":{}}}", i)).collect();
        format!("{{\"accounts\":[{}]}}", elements.join(","))
    }

    fn sorted_lines(path: &Path) -> Vec<String> {
        let mut lines: Vec<String> = std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        lines.sort();
        lines
    }

    #[test]
    fn test_single_worker_preserves_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("x");
        let config = ExtractConfig {
            split: Some(2),
            split_prefix: Some(prefix.clone()),
            workers: 1,
            temp_dir: Some(dir.path().to_path_buf()),
            ..ExtractConfig::default()
        };
        let mut scanner = scanner_for(array_doc(5), "accounts");
        let mut progress = ProgressReporter::new(false);
        let (records, chunks) = run_parallel(&mut scanner, &config, &mut progress).unwrap();

        assert_eq!(records, 5);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            std::fs::read_to_string(&chunks[0].path).unwrap(),
            "{\"id\":1}\n{\"id\":2}\n"
        );
        assert_eq!(
            std::fs::read_to_string(&chunks[2].path).unwrap(),
            "{\"id\":5}\n"
        );
    }

    #[test]
    fn test_chunk_membership_is_deterministic_across_workers() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("x");
        let config = ExtractConfig {
            split: Some(4),
            split_prefix: Some(prefix.clone()),
            workers: 3,
            temp_dir: Some(dir.path().to_path_buf()),
            ..ExtractConfig::default()
        };
        let mut scanner = scanner_for(array_doc(20), "accounts");
        let mut progress = ProgressReporter::new(false);
        let (records, chunks) = run_parallel(&mut scanner, &config, &mut progress).unwrap();

        assert_eq!(records, 20);
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.records, 4);
            // Chunk membership follows seq even though order within the
            // chunk depends on worker interleaving.
            let expected: Vec<String> = (i as u64 * 4 + 1..=i as u64 * 4 + 4)
                .map(|id| format!("{{\"id\":{}}}", id))
                .collect();
            let mut expected_sorted = expected.clone();
            expected_sorted.sort();
            assert_eq!(sorted_lines(&chunk.path), expected_sorted);
        }
    }

    #[test]
    fn test_unsplit_parallel_merges_into_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("all.ndjson");
        let config = ExtractConfig {
            output: Some(out.clone()),
            workers: 4,
            temp_dir: Some(dir.path().to_path_buf()),
            ..ExtractConfig::default()
        };
        let mut scanner = scanner_for(array_doc(50), "accounts");
        let mut progress = ProgressReporter::new(false);
        let (records, chunks) = run_parallel(&mut scanner, &config, &mut progress).unwrap();

        assert_eq!(records, 50);
        assert!(chunks.is_empty());
        let mut expected: Vec<String> = (1..=50).map(|id| format!("{{\"id\":{}}}", id)).collect();
        expected.sort();
        assert_eq!(sorted_lines(&out), expected);
    }

    #[test]
    fn test_temp_directory_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("all.ndjson");
        let config = ExtractConfig {
            output: Some(out),
            workers: 2,
            temp_dir: Some(dir.path().to_path_buf()),
            ..ExtractConfig::default()
        };
        let mut scanner = scanner_for(array_doc(10), "accounts");
        let mut progress = ProgressReporter::new(false);
        run_parallel(&mut scanner, &config, &mut progress).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("decant-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_scanner_error_propagates_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("all.ndjson");
        let config = ExtractConfig {
            output: Some(out),
            workers: 2,
            temp_dir: Some(dir.path().to_path_buf()),
            ..ExtractConfig::default()
        };
        let doc = String::from("{\"accounts\":[{\"id\":1},{\"trunc");
        let mut scanner = scanner_for(doc, "accounts");
        let mut progress = ProgressReporter::new(false);
        let err = run_parallel(&mut scanner, &config, &mut progress).unwrap_err();
        assert!(matches!(err, ExtractError::TruncatedElement));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("decant-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
