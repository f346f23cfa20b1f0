//! Structured logging for scans and soak runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout, or a capture buffer.
//! - [`JsonlSink`]: relays core diagnostics into an emitter.
//! - [`ArtifactIndex`]: links logs to produced artifacts with SHA-256 integrity.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks for emitted logs.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spraypaint_core::metrics::MetricsSnapshot;
use spraypaint_core::{Diagnostic, DiagnosticKind, DiagnosticSink, Owner};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Scan or run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

/// Which workflow produced the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Cli,
    Soak,
    Unit,
}

/// Event names for entries carrying a core diagnostic.
pub const DIAGNOSTIC_EVENTS: [&str; 3] = ["mismatch", "range_summary", "scan_summary"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKind>,
    /// Scan label, e.g. `Round: 3 Kid: 2 Buffer: 0 MapCheck`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Diagnostic text as produced by the core; may span lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<u16>,
    /// Owner whose paint was expected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_fails: Option<u64>,
    /// Foreign owner found in a corrupted range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culprit: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            stream: None,
            label: None,
            text: None,
            round: None,
            worker: None,
            owner: None,
            buffer_id: None,
            outcome: None,
            total_fails: None,
            culprit: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    /// Entry for a core diagnostic; the trace id is assigned on emission.
    #[must_use]
    pub fn from_diagnostic(diagnostic: &Diagnostic) -> Self {
        let level = match diagnostic.kind {
            DiagnosticKind::Mismatch | DiagnosticKind::RangeSummary => LogLevel::Error,
            DiagnosticKind::ScanSummary => LogLevel::Warn,
        };
        let mut entry = Self::new("", level, diagnostic.kind.as_str());
        entry.label = Some(diagnostic.label.clone());
        entry.text = Some(diagnostic.text.clone());
        entry
    }

    #[must_use]
    pub fn with_stream(mut self, stream: StreamKind) -> Self {
        self.stream = Some(stream);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set round and worker.
    #[must_use]
    pub fn with_worker(mut self, round: u64, worker: u16) -> Self {
        self.round = Some(round);
        self.worker = Some(worker);
        self
    }

    /// Set the expected owner and buffer id.
    #[must_use]
    pub fn with_scan(mut self, owner: Owner, buffer_id: usize) -> Self {
        self.owner = Some(owner.get());
        self.buffer_id = Some(buffer_id);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_total_fails(mut self, total_fails: u64) -> Self {
        self.total_fails = Some(total_fails);
        self
    }

    #[must_use]
    pub fn with_culprit(mut self, culprit: Owner) -> Self {
        self.culprit = Some(culprit.get());
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach codec counters under `details.metrics`, keeping other details.
    #[must_use]
    pub fn with_metrics(mut self, metrics: &MetricsSnapshot) -> Self {
        let value = metrics_json(metrics);
        match self.details.as_mut().and_then(serde_json::Value::as_object_mut) {
            Some(details) => {
                details.insert("metrics".to_string(), value);
            }
            None => self.details = Some(serde_json::json!({ "metrics": value })),
        }
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// In-memory capture of emitted lines, shared with the emitter.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Captured text so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Captured lines, parsed as entries.
    pub fn entries(&self) -> Result<Vec<LogEntry>, serde_json::Error> {
        self.contents()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
    run_id: String,
    stream: StreamKind,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str, stream: StreamKind) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            std::io::BufWriter::new(file),
            run_id,
            stream,
        ))
    }

    /// Create an emitter that writes to stdout.
    #[must_use]
    pub fn to_stdout(run_id: &str, stream: StreamKind) -> Self {
        Self::to_writer(std::io::stdout(), run_id, stream)
    }

    /// Create an emitter that writes into a [`CaptureBuffer`] (for testing).
    #[must_use]
    pub fn to_capture(run_id: &str, stream: StreamKind) -> (Self, CaptureBuffer) {
        let capture = CaptureBuffer::default();
        (Self::to_writer(capture.clone(), run_id, stream), capture)
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + Send + 'static, run_id: &str, stream: StreamKind) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            run_id: run_id.to_string(),
            stream,
        }
    }

    /// Generate the next trace ID: `<run_id>::<stream>::<seq>`.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        let stream = match self.stream {
            StreamKind::Cli => "cli",
            StreamKind::Soak => "soak",
            StreamKind::Unit => "unit",
        };
        format!("{}::{stream}::{:06}", self.run_id, self.seq)
    }

    /// Emit a log entry with only the required fields filled in.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = LogEntry::new("", level, event);
        self.emit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry, filling trace id, run id and stream.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        if entry.stream.is_none() {
            entry.stream = Some(self.stream);
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Emit core diagnostics, each decorated by `decorate`.
    pub fn emit_diagnostics(
        &mut self,
        diagnostics: impl IntoIterator<Item = Diagnostic>,
        decorate: impl Fn(LogEntry) -> LogEntry,
    ) -> std::io::Result<()> {
        for diagnostic in diagnostics {
            self.emit_entry(decorate(LogEntry::from_diagnostic(&diagnostic)))?;
        }
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A [`DiagnosticSink`] writing straight into a [`LogEmitter`].
///
/// The sink interface cannot fail, so the first write error is held and
/// returned by [`finish`](Self::finish); later diagnostics are dropped.
pub struct JsonlSink<'a> {
    emitter: &'a mut LogEmitter,
    owner: Owner,
    buffer_id: usize,
    error: Option<std::io::Error>,
}

impl<'a> JsonlSink<'a> {
    #[must_use]
    pub fn new(emitter: &'a mut LogEmitter, owner: Owner, buffer_id: usize) -> Self {
        Self {
            emitter,
            owner,
            buffer_id,
            error: None,
        }
    }

    pub fn finish(self) -> std::io::Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => self.emitter.flush(),
        }
    }
}

impl DiagnosticSink for JsonlSink<'_> {
    fn emit(&mut self, diagnostic: Diagnostic) {
        if self.error.is_some() {
            return;
        }
        let entry = LogEntry::from_diagnostic(&diagnostic).with_scan(self.owner, self.buffer_id);
        if let Err(err) = self.emitter.emit_entry(entry) {
            self.error = Some(err);
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Artifact index linking logs to the files a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Add an artifact whose digest is already known.
    pub fn add(
        &mut self,
        path: impl Into<String>,
        kind: impl Into<String>,
        sha256: impl Into<String>,
    ) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256.into(),
            size_bytes: None,
        });
        self
    }

    /// Hash the file at `path` and add it.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let bytes = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.into(),
            sha256: sha256_hex(&bytes),
            size_bytes: Some(bytes.len() as u64),
        });
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Codec counters as a JSON object.
#[must_use]
pub fn metrics_json(metrics: &MetricsSnapshot) -> serde_json::Value {
    serde_json::json!({
        "scans": metrics.scans,
        "failed_scans": metrics.failed_scans,
        "mismatches": metrics.mismatches,
        "ranges": metrics.ranges,
        "indiscretions": metrics.indiscretions,
        "identify_attempts": metrics.identify_attempts,
        "identify_hits": metrics.identify_hits,
    })
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            fail(&mut errors, line_number, "<json>", format!("invalid JSON: {e}"));
            return Err(errors);
        }
    };
    let Some(obj) = value.as_object() else {
        let message = "expected JSON object".to_string();
        fail(&mut errors, line_number, "<root>", message);
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            let message = "required field missing".to_string();
            fail(&mut errors, line_number, field, message);
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error", "fatal"].contains(&level)
    {
        fail(&mut errors, line_number, "level", format!("invalid level: '{level}'"));
    }

    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !["pass", "fail", "error"].contains(&outcome)
    {
        let message = format!("invalid outcome: '{outcome}'");
        fail(&mut errors, line_number, "outcome", message);
    }

    if let Some(stream) = obj.get("stream").and_then(|v| v.as_str())
        && !["cli", "soak", "unit"].contains(&stream)
    {
        fail(&mut errors, line_number, "stream", format!("invalid stream: '{stream}'"));
    }

    // Diagnostic events must carry what the core produced.
    if let Some(event) = obj.get("event").and_then(|v| v.as_str())
        && DIAGNOSTIC_EVENTS.contains(&event)
    {
        for field in ["label", "text"] {
            if !obj.get(field).is_some_and(serde_json::Value::is_string) {
                let message = format!("{event} events must include {field}");
                fail(&mut errors, line_number, field, message);
            }
        }
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        fail(
            &mut errors,
            line_number,
            "trace_id",
            format!("trace_id should follow <run_id>::<stream>::<seq> format, got: '{trace_id}'"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    match serde_json::from_value::<LogEntry>(value) {
        Ok(entry) => Ok(entry),
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<deserialization>".to_string(),
                message: format!("failed to deserialize: {e}"),
            });
            Err(errors)
        }
    }
}

fn fail(errors: &mut Vec<LogValidationError>, line_number: usize, field: &str, message: String) {
    errors.push(LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    });
}

/// Validate an entire JSONL file.
///
/// Returns the total line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    let mut all_errors = Vec::new();
    let mut line_count = 0;

    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }

    Ok((line_count, all_errors))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// UTC timestamp with millisecond precision, e.g. `2026-10-16T08:30:00.123Z`.
fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
