//! Diagnostic sink seam.
//!
//! The core never writes logs itself. Trackers hand each line-oriented
//! diagnostic to a [`DiagnosticSink`] owned by the caller, which relays it
//! to whatever log it keeps.

/// Kind of diagnostic emitted by a corruption tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Per-mismatch detail text; subject to squelch.
    Mismatch,
    /// Summary of one corruption range.
    RangeSummary,
    /// The final block of a scan with failures.
    ScanSummary,
}

impl DiagnosticKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mismatch => "mismatch",
            Self::RangeSummary => "range_summary",
            Self::ScanSummary => "scan_summary",
        }
    }
}

/// One emitted diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Identifies the scan, e.g. `Round: 3 Kid: 2 Buffer: 0 MapCheck`.
    pub label: String,
    /// May span several lines.
    pub text: String,
}

impl Diagnostic {
    /// Render as `<label> <text>`, the form written to plain-text logs.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{} {}", self.label, self.text)
    }
}

/// Receives diagnostics from a scan.
pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn emit(&mut self, diagnostic: Diagnostic) {
        (**self).emit(diagnostic);
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    diagnostics: Vec<Diagnostic>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics of one kind, in emission order.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Take everything collected so far, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&mut self, _diagnostic: Diagnostic) {}
}
