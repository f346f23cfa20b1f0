#![no_main]
use libfuzzer_sys::fuzz_target;
use spraypaint_core::two_color::{PERIOD, color_match, identify, paint};

fuzz_target!(|data: &[u8]| {
    let Some(record) = identify(data) else {
        return;
    };
    // Anything identified must be a genuine prefix of that owner's paint.
    assert!(record.length > PERIOD);
    assert!(record.length <= data.len());
    assert_eq!(color_match(record.identity, record.phase, data), record.length);

    let mut repainted = vec![0u8; record.length];
    paint(record.identity, record.phase, &mut repainted);
    assert_eq!(&repainted[..], &data[..record.length]);
});
