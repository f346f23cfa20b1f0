//! Scanning discipline.
//!
//! Every scan walks the whole buffer, never stopping at the first failure,
//! so each tracker sees complete ranges and histograms. The verdict is true
//! iff no byte mismatched.

use std::fmt;

use crate::color::crack_color;
use crate::config::{TrackerConfig, tracker_config};
use crate::metrics::{CodecMetrics, global_metrics};
use crate::sink::DiagnosticSink;
use crate::summarizer::{CorruptionTracker, ScanReport};
use crate::two_color::{Owner, color};

/// Identifies a scan in diagnostics, e.g. `Round: 3 Kid: 2 Buffer: 0 MapCheck`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLabel {
    pub round: u64,
    pub worker: u16,
    pub buffer_id: usize,
    pub phase: String,
}

impl ScanLabel {
    #[must_use]
    pub fn new(round: u64, worker: u16, buffer_id: usize, phase: impl Into<String>) -> Self {
        Self {
            round,
            worker,
            buffer_id,
            phase: phase.into(),
        }
    }
}

impl fmt::Display for ScanLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round: {} Kid: {} Buffer: {} {}",
            self.round, self.worker, self.buffer_id, self.phase
        )
    }
}

/// Checks buffers expected to carry `owner`'s paint.
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    owner: Owner,
    local: Owner,
    config: TrackerConfig,
}

impl Verifier {
    /// Verifier for buffers painted by `owner`, seen from `owner` itself,
    /// using the process-wide [`tracker_config`].
    #[must_use]
    pub fn new(owner: Owner) -> Self {
        Self {
            owner,
            local: owner,
            config: tracker_config(),
        }
    }

    /// Crack colors and judge indiscretions from `local`'s point of view.
    ///
    /// A worker checking a buffer it inherited from its parent expects the
    /// parent's paint but is itself `local`.
    #[must_use]
    pub fn with_local(mut self, local: Owner) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[must_use]
    pub fn local(&self) -> Owner {
        self.local
    }

    /// Scan `buffer` against `owner`'s paint for `buffer_id`.
    pub fn scan<S: DiagnosticSink>(
        &self,
        buffer_id: usize,
        buffer: &[u8],
        label: &str,
        sink: S,
    ) -> ScanReport {
        let owner = self.owner;
        self.scan_with(buffer, label, sink, |k| color(owner, buffer_id, k))
    }

    /// True iff `buffer` is exactly `owner`'s paint for `buffer_id`.
    pub fn color_is_right<S: DiagnosticSink>(
        &self,
        buffer_id: usize,
        buffer: &[u8],
        label: &str,
        sink: S,
    ) -> bool {
        self.scan(buffer_id, buffer, label, sink).passed()
    }

    /// Scan bytes relayed through a transport against the bytes that were sent.
    ///
    /// Covers `max(reference.len(), observed.len())` positions. Bytes of
    /// `observed` beyond the end of `reference` always mismatch, and every
    /// reference byte that never arrived is reported as missing.
    pub fn scan_loopback<S: DiagnosticSink>(
        &self,
        reference: &[u8],
        observed: &[u8],
        label: &str,
        sink: S,
    ) -> ScanReport {
        let span = reference.len().max(observed.len());
        self.scan_span(observed, span, label, sink, |k| match reference.get(k) {
            Some(&sent) => sent,
            None => !observed[k],
        })
    }

    /// Scan a freshly obtained region, which must read as all zeroes.
    pub fn scan_zeroed<S: DiagnosticSink>(&self, buffer: &[u8], label: &str, sink: S) -> ScanReport {
        self.scan_with(buffer, label, sink, |_| 0)
    }

    fn scan_with<S, F>(&self, buffer: &[u8], label: &str, sink: S, expected: F) -> ScanReport
    where
        S: DiagnosticSink,
        F: Fn(usize) -> u8,
    {
        self.scan_span(buffer, buffer.len(), label, sink, expected)
    }

    // Positions in `buffer.len()..span` were expected but are absent.
    fn scan_span<S, F>(
        &self,
        buffer: &[u8],
        span: usize,
        label: &str,
        sink: S,
        expected: F,
    ) -> ScanReport
    where
        S: DiagnosticSink,
        F: Fn(usize) -> u8,
    {
        let mut tracker = CorruptionTracker::new(label, self.local, buffer, sink, self.config);
        for k in 0..span {
            match buffer.get(k) {
                Some(&observed) if observed == expected(k) => {}
                Some(&observed) => {
                    let error = format!(
                        "BadColor: {} Position: {k}",
                        crack_color(self.local, observed)
                    );
                    tracker.report(k, observed, &error);
                }
                None => tracker.report_missing(k, &format!("Missing Position: {k}")),
            }
        }
        let report = tracker.finish();

        let metrics = global_metrics();
        CodecMetrics::inc(&metrics.scans);
        if !report.passed() {
            CodecMetrics::inc(&metrics.failed_scans);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{DiagnosticKind, MemorySink, NullSink};
    use crate::two_color::paint;

    fn owner(id: u16) -> Owner {
        Owner::new(u32::from(id)).unwrap()
    }

    fn verifier(id: u16) -> Verifier {
        Verifier::new(owner(id)).with_config(TrackerConfig::default())
    }

    #[test]
    fn label_format() {
        let label = ScanLabel::new(3, 2, 0, "MapCheck");
        assert_eq!(label.to_string(), "Round: 3 Kid: 2 Buffer: 0 MapCheck");
    }

    #[test]
    fn clean_buffer_passes_silently() {
        let mut buf = vec![0u8; 1000];
        paint(owner(42), 5, &mut buf);
        let mut sink = MemorySink::new();
        assert!(verifier(42).color_is_right(5, &buf, "clean", &mut sink));
        assert!(sink.is_empty());
    }

    #[test]
    fn wrong_buffer_id_fails() {
        let mut buf = vec![0u8; 100];
        paint(owner(42), 5, &mut buf);
        assert!(!verifier(42).color_is_right(6, &buf, "shifted", NullSink));
    }

    #[test]
    fn scan_does_not_stop_early() {
        let mut buf = vec![0u8; 300];
        paint(owner(9), 0, &mut buf);
        buf[3] ^= 0xff;
        buf[200] ^= 0xff;
        buf[299] ^= 0xff;
        let report = verifier(9).scan(0, &buf, "three", NullSink);
        assert_eq!(report.total_fails, 3);
        assert_eq!(report.range_count, 3);
    }

    #[test]
    fn detail_text_cracks_the_observed_byte() {
        let mut buf = vec![0u8; 64];
        paint(owner(3), 0, &mut buf);
        buf[10] = 128 + 1;
        let mut sink = MemorySink::new();
        let _ = verifier(3).scan(0, &buf, "detail", &mut sink);
        let detail = sink.of_kind(DiagnosticKind::Mismatch).next().unwrap();
        assert_eq!(detail.text, "BadColor: 129 Foreign [1 mod 29] Position: 10");
        assert_eq!(detail.render(), "detail BadColor: 129 Foreign [1 mod 29] Position: 10");
    }

    #[test]
    fn inherited_buffer_is_cracked_from_the_local_view() {
        let mut buf = vec![0u8; 64];
        paint(Owner::ROOT, 0, &mut buf);
        buf[0] = 128 + 3;
        let mut sink = MemorySink::new();
        let v = verifier(0).with_local(owner(3));
        assert_eq!(v.owner(), Owner::ROOT);
        assert_eq!(v.local(), owner(3));
        let _ = v.scan(0, &buf, "papa", &mut sink);
        let detail = sink.of_kind(DiagnosticKind::Mismatch).next().unwrap();
        assert!(detail.text.starts_with("BadColor: 131 Local [3 mod 29]"));
    }

    #[test]
    fn loopback_compares_against_reference() {
        let mut reference = vec![0u8; 128];
        paint(owner(8), 0, &mut reference);
        let mut observed = reference[32..96].to_vec();
        observed[7] = 0;
        let report = verifier(8).scan_loopback(&reference[32..96], &observed, "Pipe", NullSink);
        assert_eq!(report.total_fails, 1);

        let longer = [reference[..4].to_vec(), vec![0x80]].concat();
        let report = verifier(8).scan_loopback(&reference[..4], &longer, "Pipe", NullSink);
        assert_eq!(report.total_fails, 1);
    }

    #[test]
    fn loopback_reports_bytes_that_never_arrived() {
        let mut sent = vec![0u8; 4096];
        paint(owner(8), 0, &mut sent);
        let mut sink = MemorySink::new();
        let report = verifier(8).scan_loopback(&sent, &sent[..100], "Pipe", &mut sink);
        assert!(!report.passed());
        assert_eq!(report.total_fails, 3996);
        assert_eq!(report.range_count, 1);
        let first = sink.of_kind(DiagnosticKind::Mismatch).next().unwrap();
        assert_eq!(first.text, "Missing Position: 100");
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert!(summary.text.starts_with("Range: 1 Range start: 100 Range end: 4095"));

        let report = verifier(8).scan_loopback(&sent, &[], "Pipe", NullSink);
        assert_eq!(report.total_fails, 4096);
        assert!(verifier(8).scan_loopback(&[], &[], "Pipe", NullSink).passed());
    }

    #[test]
    fn scan_publishes_counters_once_finished() {
        let mut buf = vec![0u8; 512];
        paint(owner(8), 0, &mut buf);
        buf[10..20].fill(0);
        let before = global_metrics().snapshot();
        let report = verifier(8).scan(0, &buf, "metrics", NullSink);
        let delta = global_metrics().snapshot().since(&before);
        // Other tests scan concurrently, so the deltas are lower bounds.
        assert!(delta.scans >= 1);
        assert!(delta.failed_scans >= 1);
        assert!(delta.mismatches >= report.total_fails);
        assert!(delta.ranges >= 1);
        assert!(delta.identify_attempts >= 1);
    }

    #[test]
    fn zeroed_scan_flags_dirty_bytes() {
        let mut fresh = vec![0u8; 4096];
        assert!(verifier(1).scan_zeroed(&fresh, "Mapped", NullSink).passed());
        fresh[100..110].fill(0x41);
        let report = verifier(1).scan_zeroed(&fresh, "Mapped", NullSink);
        assert_eq!(report.total_fails, 10);
        assert_eq!(report.range_count, 1);
    }
}
