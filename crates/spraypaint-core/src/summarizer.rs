//! Corruption summarizer.
//!
//! A [`CorruptionTracker`] consumes the mismatches of one scan, coalesces
//! consecutive positions into ranges, and emits a bounded amount of text:
//! per-mismatch detail lines until the squelch threshold is reached, one
//! summary per range, and a final block.
//!
//! Squelch only silences text. Range boundaries, counts, histograms and
//! attribution keep being tracked for the whole scan; summaries of ranges
//! closed while squelched are counted instead of emitted. The range still
//! open at [`CorruptionTracker::finish`] is always emitted.

use crate::color::crack_color;
use crate::config::TrackerConfig;
use crate::metrics::{CodecMetrics, global_metrics};
use crate::sink::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::two_color::{IdentityRecord, Owner, identify};

const HISTOGRAM_BUCKETS: usize = 256;

/// Who a corruption range resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// Painted by a different, non-root owner with enough evidence.
    Indiscretion { identity: Owner, length: usize },
    /// Resolved, but not incriminating: local, root, or too short.
    Identified(IdentityRecord),
    /// No owner could be resolved.
    Indeterminate,
}

/// First range of a scan attributed to a foreign owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indiscretion {
    pub range_index: usize,
    pub start: usize,
    pub identity: Owner,
    pub length: usize,
}

/// A finalized corruption range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSummary {
    /// 1-based.
    pub index: usize,
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub fails: u64,
    pub squelched: bool,
    /// Non-zero histogram buckets as `(color, count)`, ascending by color.
    pub colors: Vec<(u8, u64)>,
    pub attribution: Attribution,
}

impl RangeSummary {
    #[must_use]
    pub fn length(&self) -> usize {
        self.end - self.start + 1
    }

    /// Multi-line text for the log.
    #[must_use]
    pub fn render(&self, label: &str, local: Owner) -> String {
        let mut lines = Vec::with_capacity(self.colors.len() + 2);
        lines.push(format!(
            "Range: {} Range start: {} Range end: {} Length: {} Range fails: {}{} Colors:",
            self.index,
            self.start,
            self.end,
            self.length(),
            self.fails,
            if self.squelched { " Squelched" } else { "" },
        ));
        for &(color, count) in &self.colors {
            lines.push(format!("  {}: {count:>9}", crack_color(local, color)));
        }
        lines.push(match self.attribution {
            Attribution::Indiscretion { identity, length } => {
                format!("*** Indiscretion {label} from Owner: {identity} Length: {length}")
            }
            Attribution::Identified(record) => record.to_string(),
            Attribution::Indeterminate => "Identity indeterminate".to_string(),
        });
        lines.join("\n")
    }
}

/// Outcome of one scan, returned by [`CorruptionTracker::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    pub total_fails: u64,
    pub range_count: usize,
    /// Range summaries withheld because the tracker was squelched.
    pub suppressed_ranges: usize,
    /// Per-mismatch lines actually emitted.
    pub detail_lines: u64,
    pub squelched: bool,
    pub indiscretions: usize,
    pub first_indiscretion: Option<Indiscretion>,
}

impl ScanReport {
    /// True iff the scan saw no mismatch.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.total_fails == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveRange {
    start: usize,
    end: usize,
    fails: u64,
}

/// Summarizes the mismatches of a single scan.
///
/// Created per scan and consumed by [`finish`](Self::finish); never shared.
pub struct CorruptionTracker<'a, S: DiagnosticSink> {
    label: String,
    local: Owner,
    buffer: &'a [u8],
    sink: S,
    config: TrackerConfig,
    active: Option<ActiveRange>,
    histogram: [u64; HISTOGRAM_BUCKETS],
    range_count: usize,
    total_fails: u64,
    suppressed_ranges: usize,
    detail_lines: u64,
    indiscretions: usize,
    first_indiscretion: Option<Indiscretion>,
    identify_attempts: u64,
    identify_hits: u64,
}

impl<'a, S: DiagnosticSink> CorruptionTracker<'a, S> {
    /// `buffer` is the scanned buffer; ranges are identified against it.
    /// `local` is the owner whose view the colors are cracked from.
    pub fn new(
        label: impl Into<String>,
        local: Owner,
        buffer: &'a [u8],
        sink: S,
        config: TrackerConfig,
    ) -> Self {
        Self {
            label: label.into(),
            local,
            buffer,
            sink,
            config,
            active: None,
            histogram: [0; HISTOGRAM_BUCKETS],
            range_count: 0,
            total_fails: 0,
            suppressed_ranges: 0,
            detail_lines: 0,
            indiscretions: 0,
            first_indiscretion: None,
            identify_attempts: 0,
            identify_hits: 0,
        }
    }

    /// Record a mismatching `color` at `position`, with its detail text.
    pub fn report(&mut self, position: usize, color: u8, error: &str) {
        self.tally(position, error);
        self.histogram[usize::from(color)] += 1;
    }

    /// Record an expected byte at `position` that never arrived.
    ///
    /// Counts and coalesces like [`report`](Self::report) but adds nothing
    /// to the color histogram.
    pub fn report_missing(&mut self, position: usize, error: &str) {
        self.tally(position, error);
    }

    fn tally(&mut self, position: usize, error: &str) {
        self.total_fails += 1;

        match self.active {
            Some(range) if range.end.checked_add(1) == Some(position) => {}
            Some(_) => {
                self.close_range(false);
                self.open_range(position);
            }
            None => self.open_range(position),
        }
        if let Some(range) = self.active.as_mut() {
            range.end = position;
            range.fails += 1;
        }

        if !self.is_squelched() {
            self.detail_lines += 1;
            self.emit(DiagnosticKind::Mismatch, error.to_string());
        }
    }

    /// Emit the open range and the final block, and return the scan outcome.
    pub fn finish(mut self) -> ScanReport {
        if self.active.is_some() {
            self.close_range(true);
            let text = format!(
                "Total fails: {} Ranges: {} Suppressed ranges: {}",
                self.total_fails, self.range_count, self.suppressed_ranges
            );
            self.emit(DiagnosticKind::ScanSummary, text);
        }
        self.publish_metrics();
        ScanReport {
            total_fails: self.total_fails,
            range_count: self.range_count,
            suppressed_ranges: self.suppressed_ranges,
            detail_lines: self.detail_lines,
            squelched: self.is_squelched(),
            indiscretions: self.indiscretions,
            first_indiscretion: self.first_indiscretion,
        }
    }

    #[must_use]
    pub fn is_squelched(&self) -> bool {
        self.total_fails >= self.config.spew_limit
    }

    #[must_use]
    pub fn total_fails(&self) -> u64 {
        self.total_fails
    }

    #[must_use]
    pub fn range_count(&self) -> usize {
        self.range_count
    }

    fn open_range(&mut self, position: usize) {
        self.range_count += 1;
        self.active = Some(ActiveRange {
            start: position,
            end: position,
            fails: 0,
        });
        self.histogram = [0; HISTOGRAM_BUCKETS];
    }

    fn close_range(&mut self, last: bool) {
        let Some(range) = self.active.take() else {
            return;
        };
        let attribution = self.attribute(range);
        if let Attribution::Indiscretion { identity, length } = attribution {
            self.indiscretions += 1;
            self.first_indiscretion.get_or_insert(Indiscretion {
                range_index: self.range_count,
                start: range.start,
                identity,
                length,
            });
        }

        let squelched = self.is_squelched();
        if squelched && !last {
            self.suppressed_ranges += 1;
            return;
        }
        let summary = RangeSummary {
            index: self.range_count,
            start: range.start,
            end: range.end,
            fails: range.fails,
            squelched,
            colors: self.colors(),
            attribution,
        };
        let text = summary.render(&self.label, self.local);
        self.emit(DiagnosticKind::RangeSummary, text);
    }

    fn attribute(&mut self, range: ActiveRange) -> Attribution {
        let Some(bytes) = self.buffer.get(range.start..=range.end) else {
            return Attribution::Indeterminate;
        };
        self.identify_attempts += 1;
        let Some(record) = identify(bytes) else {
            return Attribution::Indeterminate;
        };
        self.identify_hits += 1;
        if record.identity != self.local
            && !record.identity.is_root()
            && record.length > self.config.confidence_threshold
        {
            Attribution::Indiscretion {
                identity: record.identity,
                length: record.length,
            }
        } else {
            Attribution::Identified(record)
        }
    }

    fn colors(&self) -> Vec<(u8, u64)> {
        (0..=u8::MAX)
            .zip(self.histogram.iter())
            .filter(|&(_, &count)| count != 0)
            .map(|(color, &count)| (color, count))
            .collect()
    }

    // One publish per scan keeps parallel scans off the shared counters.
    fn publish_metrics(&self) {
        let metrics = global_metrics();
        CodecMetrics::add(&metrics.mismatches, self.total_fails);
        CodecMetrics::add(&metrics.ranges, self.range_count as u64);
        CodecMetrics::add(&metrics.indiscretions, self.indiscretions as u64);
        CodecMetrics::add(&metrics.identify_attempts, self.identify_attempts);
        CodecMetrics::add(&metrics.identify_hits, self.identify_hits);
    }

    fn emit(&mut self, kind: DiagnosticKind, text: String) {
        self.sink.emit(Diagnostic {
            kind,
            label: self.label.clone(),
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::two_color::paint;

    fn owner(id: u16) -> Owner {
        Owner::new(u32::from(id)).unwrap()
    }

    fn painted(id: u16, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        paint(owner(id), 0, &mut buf);
        buf
    }

    #[test]
    fn one_range() {
        let buf = painted(0, 20_000);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("test", owner(0), &buf, &mut sink, TrackerConfig::default());
        for k in 11..50 {
            s.report(k, 13, "junk");
        }
        let report = s.finish();
        assert_eq!(report.total_fails, 50 - 11);
        assert_eq!(report.range_count, 1);
        assert_eq!(sink.count(DiagnosticKind::RangeSummary), 1);
        assert_eq!(sink.count(DiagnosticKind::ScanSummary), 1);
    }

    #[test]
    fn multi_range() {
        let buf = painted(0, 20_000);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("test", owner(0), &buf, &mut sink, TrackerConfig::default());
        for _ in 0..3 {
            for k in 1..3 {
                s.report(k, 13, "junk");
            }
        }
        let report = s.finish();
        assert_eq!(report.total_fails, 6);
        assert_eq!(report.range_count, 3);
        assert_eq!(sink.count(DiagnosticKind::RangeSummary), 3);
    }

    #[test]
    fn no_reports_emit_nothing() {
        let buf = painted(0, 64);
        let mut sink = MemorySink::new();
        let s = CorruptionTracker::new("test", owner(0), &buf, &mut sink, TrackerConfig::default());
        let report = s.finish();
        assert!(report.passed());
        assert_eq!(report, ScanReport::default());
        assert!(sink.is_empty());
    }

    #[test]
    fn summary_text_lists_colors_and_attribution() {
        let buf = painted(3, 64);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("scan", owner(3), &buf, &mut sink, TrackerConfig::default());
        s.report(4, 11, "first");
        s.report(5, 11, "second");
        let _ = s.finish();

        let summary = &sink.diagnostics()[2];
        assert_eq!(summary.kind, DiagnosticKind::RangeSummary);
        assert_eq!(
            summary.text,
            "Range: 1 Range start: 4 Range end: 5 Length: 2 Range fails: 2 Colors:\n  \
             11 Garbage:         2\nIdentity indeterminate"
        );
        let last = sink.diagnostics().last().unwrap();
        assert_eq!(last.text, "Total fails: 2 Ranges: 1 Suppressed ranges: 0");
        assert_eq!(last.label, "scan");
    }

    #[test]
    fn histogram_resets_between_ranges() {
        let buf = painted(3, 64);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("scan", owner(3), &buf, &mut sink, TrackerConfig::default());
        s.report(1, 11, "a");
        s.report(2, 12, "b");
        s.report(10, 200, "c");
        let _ = s.finish();
        let summaries: Vec<&Diagnostic> = sink.of_kind(DiagnosticKind::RangeSummary).collect();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].text.contains("11 Garbage"));
        assert!(summaries[0].text.contains("12 Garbage"));
        assert!(!summaries[0].text.contains("200 Garbage"));
        assert!(summaries[1].text.contains("200 Garbage"));
        assert!(!summaries[1].text.contains("11 Garbage"));
    }

    #[test]
    fn squelch_stops_detail_text_but_not_counting() {
        let buf = painted(0, 4096);
        let mut sink = MemorySink::new();
        let config = TrackerConfig::default().with_spew_limit(10);
        let mut s = CorruptionTracker::new("scan", owner(0), &buf, &mut sink, config);
        for k in 0..25 {
            s.report(k, 13, "junk");
            assert_eq!(s.total_fails(), k as u64 + 1);
        }
        let report = s.finish();
        assert_eq!(report.total_fails, 25);
        assert_eq!(report.detail_lines, 9);
        assert!(report.squelched);
        assert_eq!(sink.count(DiagnosticKind::Mismatch), 9);
        // The range open at finish is still summarized, flagged.
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert!(summary.text.contains("Range fails: 25 Squelched Colors:"));
    }

    #[test]
    fn squelch_keeps_range_bookkeeping() {
        let buf = painted(0, 4096);
        let mut sink = MemorySink::new();
        let config = TrackerConfig::default().with_spew_limit(4);
        let mut s = CorruptionTracker::new("scan", owner(0), &buf, &mut sink, config);
        // Ten scattered single-byte ranges.
        for k in 0..10 {
            s.report(k * 3, 13, "junk");
        }
        assert_eq!(s.range_count(), 10);
        let report = s.finish();
        assert_eq!(report.range_count, 10);
        // Ranges 1 and 2 close before squelch, 3..=9 close while squelched,
        // range 10 is emitted by finish.
        assert_eq!(report.suppressed_ranges, 7);
        assert_eq!(sink.count(DiagnosticKind::RangeSummary), 3);
        assert_eq!(sink.count(DiagnosticKind::Mismatch), 3);
        let last = sink.diagnostics().last().unwrap();
        assert_eq!(last.text, "Total fails: 10 Ranges: 10 Suppressed ranges: 7");
    }

    #[test]
    fn foreign_paint_is_an_indiscretion() {
        let mut buf = painted(3, 256);
        paint(owner(77), 2, &mut buf[100..140]);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("victim", owner(3), &buf, &mut sink, TrackerConfig::default());
        for k in 100..140 {
            s.report(k, buf[k], "bad");
        }
        let report = s.finish();
        assert_eq!(report.indiscretions, 1);
        let first = report.first_indiscretion.unwrap();
        assert_eq!(first.identity, owner(77));
        assert_eq!(first.start, 100);
        assert_eq!(first.length, 40);
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert!(
            summary
                .text
                .ends_with("*** Indiscretion victim from Owner: 77 Length: 40")
        );
    }

    #[test]
    fn root_paint_is_identified_not_incriminated() {
        let mut buf = painted(3, 256);
        paint(Owner::ROOT, 0, &mut buf[16..48]);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("victim", owner(3), &buf, &mut sink, TrackerConfig::default());
        for k in 16..48 {
            s.report(k, buf[k], "bad");
        }
        let report = s.finish();
        assert_eq!(report.indiscretions, 0);
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert!(summary.text.ends_with("Identity: 0 Length: 32 Phase: 0"));
    }

    #[test]
    fn confidence_threshold_gates_indiscretions() {
        let mut buf = painted(3, 256);
        paint(owner(77), 0, &mut buf[100..120]);
        let config = TrackerConfig::default().with_confidence_threshold(20);
        let mut s = CorruptionTracker::new("victim", owner(3), &buf, crate::sink::NullSink, config);
        for k in 100..120 {
            s.report(k, buf[k], "bad");
        }
        let report = s.finish();
        assert_eq!(report.indiscretions, 0);
    }

    #[test]
    fn missing_bytes_count_without_colors() {
        let buf = painted(3, 16);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("pipe", owner(3), &buf, &mut sink, TrackerConfig::default());
        for k in 16..20 {
            s.report_missing(k, "gone");
        }
        let report = s.finish();
        assert_eq!(report.total_fails, 4);
        assert_eq!(report.range_count, 1);
        assert_eq!(sink.count(DiagnosticKind::Mismatch), 4);
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert_eq!(
            summary.text,
            "Range: 1 Range start: 16 Range end: 19 Length: 4 Range fails: 4 Colors:\n\
             Identity indeterminate"
        );
    }

    #[test]
    fn positions_past_the_buffer_are_indeterminate() {
        let buf = painted(3, 8);
        let mut sink = MemorySink::new();
        let mut s =
            CorruptionTracker::new("short", owner(3), &buf, &mut sink, TrackerConfig::default());
        s.report(100, 1, "oob");
        let _ = s.finish();
        let summary = sink.of_kind(DiagnosticKind::RangeSummary).next().unwrap();
        assert!(summary.text.ends_with("Identity indeterminate"));
    }
}
