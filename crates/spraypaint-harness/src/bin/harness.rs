//! CLI entrypoint for the spraypaint harness.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde::Serialize;
use spraypaint_core::config::tracker_config;
use spraypaint_core::metrics::global_metrics;
use spraypaint_core::two_color::paint;
use spraypaint_core::{MemorySink, Owner, Verifier, crack_color, identify};
use spraypaint_harness::soak::default_workers;
use spraypaint_harness::structured_log::{
    ArtifactIndex, JsonlSink, LogEntry, Outcome, validate_log_file,
};
use spraypaint_harness::{Fault, LogEmitter, LogLevel, SoakConfig, StreamKind, run_soak};

/// Provenance painting and corruption forensics.
#[derive(Debug, Parser)]
#[command(name = "spraypaint-harness")]
#[command(about = "Paint, verify and identify owner-colored buffers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a buffer painted in an owner's colors.
    Paint {
        /// Owner identity in [0, 899).
        #[arg(long)]
        owner: u32,
        #[arg(long, default_value_t = 0)]
        buffer_id: usize,
        /// Buffer length in bytes.
        #[arg(long)]
        len: usize,
        /// Fault to apply after painting, e.g. `stomp:100:64:613:0`. Repeatable.
        #[arg(long)]
        inject: Vec<Fault>,
        /// Output path for the raw bytes.
        #[arg(long)]
        output: PathBuf,
    },
    /// Scan a buffer against an owner's paint.
    Verify {
        /// Raw buffer to scan.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        owner: u32,
        #[arg(long, default_value_t = 0)]
        buffer_id: usize,
        /// Identity colors are classified against (defaults to `--owner`).
        #[arg(long)]
        local: Option<u32>,
        /// Per-mismatch text limit (overrides SPRAYPAINT_SPEW_LIMIT).
        #[arg(long)]
        spew_limit: Option<u64>,
        /// Structured JSONL log path (if omitted, diagnostics go to stderr).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Recover the owner of a buffer from its leading bytes.
    Identify {
        #[arg(long)]
        input: PathBuf,
        /// Start scanning at this byte offset.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Classify color bytes relative to a local identity.
    Crack {
        #[arg(long)]
        local: u32,
        /// Bytes to classify (decimal).
        bytes: Vec<u8>,
    },
    /// Run rounds of workers through the paint/inherit/check lifecycle.
    Soak {
        /// Worker count (defaults to the available parallelism).
        #[arg(long)]
        workers: Option<u16>,
        /// Round limit (defaults to 3, or unlimited when `--run-time-secs` is set).
        #[arg(long)]
        rounds: Option<u64>,
        /// Wall-clock budget in seconds; no new round starts after it.
        #[arg(long)]
        run_time_secs: Option<u64>,
        #[arg(long, default_value_t = 64 * 1024)]
        buffer_size: usize,
        #[arg(long, default_value_t = 2)]
        mapped_buffers: usize,
        #[arg(long, default_value_t = 8192)]
        mapped_size: usize,
        /// Inject one fault per worker every N rounds (0 disables).
        #[arg(long, default_value_t = 0)]
        fault_every: u64,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0x5EED")]
        seed: String,
        /// Run identifier used in trace ids.
        #[arg(long, default_value = "soak")]
        run_id: String,
        /// Structured JSONL log path (if omitted, logs go to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index JSON path; requires `--log`.
        #[arg(long, requires = "log")]
        artifact_index: Option<PathBuf>,
    },
    /// Validate a structured JSONL log against the schema.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct IdentifyOutput {
    /// `None` when the evidence is too weak or ambiguous.
    identity: Option<u16>,
    length: Option<usize>,
    phase: Option<usize>,
}

fn parse_seed(raw: &str) -> Result<u64, String> {
    let cleaned = raw.replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|err| format!("invalid seed '{raw}': {err}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Paint {
            owner,
            buffer_id,
            len,
            inject,
            output,
        } => {
            let owner = Owner::new(owner)?;
            let mut buffer = vec![0u8; len];
            paint(owner, buffer_id, &mut buffer);
            for fault in &inject {
                let touched = fault.apply(&mut buffer);
                eprintln!("Injected {fault} ({touched} bytes)");
            }
            std::fs::write(&output, &buffer)?;
            eprintln!(
                "Painted {len} bytes for owner {owner} buffer {buffer_id} to {}",
                output.display()
            );
        }
        Command::Verify {
            input,
            owner,
            buffer_id,
            local,
            spew_limit,
            log,
        } => {
            let owner = Owner::new(owner)?;
            let local = local.map(Owner::new).transpose()?.unwrap_or(owner);
            let mut config = tracker_config();
            if let Some(limit) = spew_limit {
                config = config.with_spew_limit(limit);
            }
            let buffer = std::fs::read(&input)?;
            let before = global_metrics().snapshot();
            let verifier = Verifier::new(owner).with_local(local).with_config(config);
            let label = format!("Verify: {} Buffer: {buffer_id}", input.display());

            let report = match log {
                Some(path) => {
                    let mut emitter = LogEmitter::to_file(&path, "verify", StreamKind::Cli)?;
                    let mut sink = JsonlSink::new(&mut emitter, owner, buffer_id);
                    let report = verifier.scan(buffer_id, &buffer, &label, &mut sink);
                    sink.finish()?;
                    let outcome = if report.passed() {
                        Outcome::Pass
                    } else {
                        Outcome::Fail
                    };
                    emitter.emit_entry(
                        LogEntry::new("", LogLevel::Info, "verify_result")
                            .with_label(label.as_str())
                            .with_scan(owner, buffer_id)
                            .with_outcome(outcome)
                            .with_total_fails(report.total_fails)
                            .with_metrics(&global_metrics().snapshot().since(&before)),
                    )?;
                    emitter.flush()?;
                    report
                }
                None => {
                    let mut sink = MemorySink::new();
                    let report = verifier.scan(buffer_id, &buffer, &label, &mut sink);
                    for diagnostic in sink.diagnostics() {
                        eprintln!("{}", diagnostic.render());
                    }
                    report
                }
            };

            if report.passed() {
                eprintln!("{} bytes OK", buffer.len());
            } else {
                eprintln!(
                    "FAIL: {} bad bytes in {} ranges",
                    report.total_fails, report.range_count
                );
                if let Some(first) = report.first_indiscretion {
                    eprintln!(
                        "Culprit: owner {} at {} ({} bytes)",
                        first.identity, first.start, first.length
                    );
                }
                std::process::exit(1);
            }
        }
        Command::Identify { input, offset } => {
            let buffer = std::fs::read(&input)?;
            let record = identify(buffer.get(offset..).unwrap_or_default());
            let output = IdentifyOutput {
                identity: record.map(|r| r.identity.get()),
                length: record.map(|r| r.length),
                phase: record.map(|r| r.phase),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if record.is_none() {
                std::process::exit(2);
            }
        }
        Command::Crack { local, bytes } => {
            let local = Owner::new(local)?;
            for byte in bytes {
                println!("{}", crack_color(local, byte));
            }
        }
        Command::Soak {
            workers,
            rounds,
            run_time_secs,
            buffer_size,
            mapped_buffers,
            mapped_size,
            fault_every,
            seed,
            run_id,
            log,
            artifact_index,
        } => {
            let run_time = run_time_secs.map(Duration::from_secs);
            let workers = workers.unwrap_or_else(default_workers);
            let rounds = rounds.unwrap_or(if run_time.is_some() { 0 } else { 3 });
            let before = global_metrics().snapshot();
            let config = SoakConfig {
                workers,
                rounds,
                run_time,
                buffer_size,
                mapped_buffers,
                mapped_size,
                fault_every,
                seed: parse_seed(&seed)?,
                tracker: tracker_config(),
                ..SoakConfig::default()
            };
            let emitter = match &log {
                Some(path) => LogEmitter::to_file(path, &run_id, StreamKind::Soak)?,
                None => LogEmitter::to_stdout(&run_id, StreamKind::Soak),
            };
            eprintln!(
                "Soaking {workers} workers x {rounds} rounds, budget {run_time:?} (seed {seed}, fault every {fault_every})"
            );
            let emitter = Mutex::new(emitter);
            let summary = run_soak(&config, &emitter)?;

            let mut emitter = emitter.into_inner();
            let level = if summary.passed() {
                LogLevel::Info
            } else {
                LogLevel::Warn
            };
            emitter.emit_entry(
                LogEntry::new("", level, "soak_complete")
                    .with_details(serde_json::json!({
                        "rounds": summary.rounds.len(),
                        "scans": summary.total_scans(),
                        "failures": summary.total_failures(),
                        "indiscretions": summary.indiscretions(),
                    }))
                    .with_metrics(&global_metrics().snapshot().since(&before)),
            )?;
            emitter.flush()?;
            drop(emitter);

            if let (Some(log_path), Some(index_path)) = (&log, &artifact_index) {
                let mut index = ArtifactIndex::new(run_id.as_str());
                index.add_file(log_path, "log")?;
                std::fs::write(index_path, index.to_json()?)?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }

            eprintln!(
                "Soak complete: {} scans, {} failures, {} indiscretions",
                summary.total_scans(),
                summary.total_failures(),
                summary.indiscretions()
            );
            // Failures are expected when faults are injected deliberately.
            if !summary.passed() && fault_every == 0 {
                std::process::exit(1);
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            eprintln!("{lines} lines, {} errors", errors.len());
            if !errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn soak_limits_are_optional() {
        let cli = Cli::try_parse_from(["harness", "soak", "--run-time-secs", "5"]).unwrap();
        let Command::Soak {
            workers,
            rounds,
            run_time_secs,
            ..
        } = cli.command
        else {
            panic!("expected soak");
        };
        assert_eq!(workers, None);
        assert_eq!(rounds, None);
        assert_eq!(run_time_secs, Some(5));
    }

    #[test]
    fn seeds_parse_in_both_radixes() {
        assert_eq!(parse_seed("0x5EED"), Ok(0x5EED));
        assert_eq!(parse_seed("0xDEAD_BEEF"), Ok(0xDEAD_BEEF));
        assert_eq!(parse_seed("1234"), Ok(1234));
        assert!(parse_seed("nope").is_err());
    }

    #[test]
    fn inject_flags_parse_as_faults() {
        let cli = Cli::try_parse_from([
            "harness",
            "paint",
            "--owner",
            "3",
            "--len",
            "64",
            "--inject",
            "bitflip:4:1",
            "--inject",
            "stomp:8:40:613:2",
            "--output",
            "out.bin",
        ])
        .unwrap();
        let Command::Paint { inject, .. } = cli.command else {
            panic!("expected paint");
        };
        assert_eq!(inject.len(), 2);
        assert_eq!(inject[1].culprit(), Owner::new(613).ok());
    }
}
