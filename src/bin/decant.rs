//! decant: Extract the elements of a JSON array to NDJSON or JSON shards
//!
//! Usage:
//!   # Extract "accounts" from a file to stdout, one element per line
//!   decant --in data.json
//!
//!   # Read from stdin, pick a different key, write a single file
//!   cat data.json | decant --in - --key users --out users.ndjson
//!
//!   # Shard into files of 100k elements each
//!   decant --in big.json --split-lines 100000 --split-prefix out/accounts
//!
//!   # Same, with four writer threads (order within a shard may vary)
//!   decant --in big.json --split-lines 100000 --split-prefix out/accounts --workers 4
//!
//!   # Just count the elements
//!   decant --in big.json --count-only

use anyhow::Result;
use clap::Parser;
use decant::{
    ExtractConfig, ExtractError, Input, OutputMode, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_ELEMENT_SIZE,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "decant")]
#[command(about = "Extract the elements of an embedded JSON array, streaming", long_about = None)]
struct Args {
    /// Input JSON file; use `-` for stdin
    #[arg(long = "in", short = 'i', value_name = "FILE")]
    input: String,

    /// Output file; use `-` or omit for stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    out: Option<String>,

    /// Array key to extract; an empty string selects the first top-level array
    #[arg(long, default_value = "accounts", value_name = "NAME")]
    key: String,

    /// Newline-delimited output, one element per line (the default)
    #[arg(long, overrides_with = "no_ndjson")]
    ndjson: bool,

    /// JSON-array output instead of NDJSON
    #[arg(long = "no-ndjson", overrides_with = "ndjson")]
    no_ndjson: bool,

    /// Elements per shard; 0 disables sharding
    #[arg(long = "split-lines", value_name = "N")]
    split_lines: Option<u64>,

    /// Shard filename prefix; required with --split-lines
    #[arg(long = "split-prefix", value_name = "PATH")]
    split_prefix: Option<PathBuf>,

    /// Read-buffer size in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, value_name = "BYTES")]
    buffer: usize,

    /// Writer threads (NDJSON only); 0 means one per core. More than one
    /// worker gives up strict document order within each shard.
    #[arg(long, default_value_t = 1, value_name = "K")]
    workers: usize,

    /// Directory for parallel-mode temp files
    #[arg(long, value_name = "DIR")]
    tmpdir: Option<PathBuf>,

    /// Per-element size cap in bytes; 0 disables the check
    #[arg(long = "max-element", default_value_t = DEFAULT_MAX_ELEMENT_SIZE, value_name = "BYTES")]
    max_element: usize,

    /// Count the elements and print the total instead of writing output
    #[arg(long = "count-only")]
    count_only: bool,

    /// Progress lines and a final summary on stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        let code = err
            .downcast_ref::<ExtractError>()
            .map(ExtractError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run(args: Args) -> Result<()> {
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("decant=debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let config = build_config(&args)?;

    if args.verbose {
        if config.buffer_size != DEFAULT_BUFFER_SIZE {
            eprintln!("[Config] Buffer size set to {} bytes", config.buffer_size);
        }
        if config.key != "accounts" {
            eprintln!("[Config] Extracting array under key \"{}\"", config.key);
        }
        if config.workers != 1 {
            eprintln!("[Config] Using {} writer threads", config.effective_workers());
        }
    }

    if args.count_only {
        let summary = decant::count_elements(&config)?;
        println!(
            "Total records under key \"{}\": {}",
            config.key, summary.records
        );
        return Ok(());
    }

    let summary = decant::extract(&config)?;
    eprintln!("Done. Wrote {} records.", summary.records);
    if args.verbose {
        eprintln!(
            "Elapsed {:.2}s, {:.0} records/s, {:.1} MiB/s",
            summary.elapsed_secs,
            summary.records_per_sec(),
            summary.mb_per_sec()
        );
        for chunk in &summary.chunks {
            eprintln!("  {} ({} records)", chunk.path.display(), chunk.records);
        }
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<ExtractConfig, ExtractError> {
    let input = match args.input.as_str() {
        "-" => Input::Stdin,
        path => Input::File(PathBuf::from(path)),
    };
    let output = match args.out.as_deref() {
        None | Some("-") => None,
        Some(path) => Some(PathBuf::from(path)),
    };
    let mode = if args.ndjson || !args.no_ndjson {
        OutputMode::Ndjson
    } else {
        OutputMode::JsonArray
    };
    let split = match args.split_lines {
        None | Some(0) => None,
        Some(n) => Some(n),
    };

    if args.out.as_deref() == Some("-") && split.is_some() {
        return Err(ExtractError::BadConfig(
            "sharded output cannot go to stdout".into(),
        ));
    }
    if args.count_only && (output.is_some() || split.is_some() || args.split_prefix.is_some()) {
        return Err(ExtractError::BadConfig(
            "count-only does not write output; drop --out and the split options".into(),
        ));
    }

    let config = ExtractConfig {
        input,
        output,
        key: args.key.clone(),
        mode,
        buffer_size: args.buffer,
        split,
        split_prefix: args.split_prefix.clone(),
        workers: args.workers,
        max_element_size: args.max_element,
        temp_dir: args.tmpdir.clone(),
        verbose: args.verbose,
        ..ExtractConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_and_stdout_markers() {
        let args = Args::parse_from(["decant", "--in", "-", "--out", "-"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.input, Input::Stdin);
        assert!(config.output.is_none());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["decant", "--in", "data.json"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.key, "accounts");
        assert_eq!(config.mode, OutputMode::Ndjson);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(config.split.is_none());
    }

    #[test]
    fn test_no_ndjson_selects_json_array() {
        let args = Args::parse_from(["decant", "--in", "x.json", "--no-ndjson"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.mode, OutputMode::JsonArray);
    }

    #[test]
    fn test_framing_flags_last_one_wins() {
        let args = Args::parse_from(["decant", "--in", "x.json", "--ndjson", "--no-ndjson"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.mode, OutputMode::JsonArray);

        let args = Args::parse_from(["decant", "--in", "x.json", "--no-ndjson", "--ndjson"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.mode, OutputMode::Ndjson);
    }

    #[test]
    fn test_zero_split_means_unsharded() {
        let args = Args::parse_from(["decant", "--in", "x.json", "--split-lines", "0"]);
        let config = build_config(&args).unwrap();
        assert!(config.split.is_none());
    }

    #[test]
    fn test_split_without_prefix_is_rejected() {
        let args = Args::parse_from(["decant", "--in", "x.json", "--split-lines", "10"]);
        let err = build_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_split_to_stdout_is_rejected() {
        let args = Args::parse_from([
            "decant", "--in", "x.json", "--out", "-", "--split-lines", "2", "--split-prefix", "p",
        ]);
        let err = build_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_count_only_conflicts_with_output() {
        let args = Args::parse_from(["decant", "--in", "x.json", "--count-only", "--out", "y"]);
        let err = build_config(&args).unwrap_err();
        assert!(matches!(err, ExtractError::BadConfig(_)));
    }

    #[test]
    fn test_workers_with_json_array_is_rejected() {
        let args =
            Args::parse_from(["decant", "--in", "x.json", "--no-ndjson", "--workers", "4"]);
        assert!(build_config(&args).is_err());
    }
}
