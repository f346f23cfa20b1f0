#![no_main]
use libfuzzer_sys::fuzz_target;
use spraypaint_core::{DiagnosticKind, MemorySink, Owner, TrackerConfig, Verifier};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let id = u32::from(u16::from_le_bytes([data[0], data[1]])) % 899;
    let Ok(owner) = Owner::new(id) else {
        return;
    };
    let buffer_id = usize::from(data[2]);
    let buffer = &data[3..];

    let config = TrackerConfig::default().with_spew_limit(64);
    let mut sink = MemorySink::new();
    let report = Verifier::new(owner)
        .with_config(config)
        .scan(buffer_id, buffer, "fuzz", &mut sink);

    assert!(report.total_fails <= buffer.len() as u64);
    assert!(report.range_count as u64 <= report.total_fails);
    assert!(report.detail_lines <= 63);
    assert_eq!(
        sink.count(DiagnosticKind::RangeSummary) + report.suppressed_ranges,
        report.range_count
    );
    assert_eq!(report.passed(), report.total_fails == 0);
});
