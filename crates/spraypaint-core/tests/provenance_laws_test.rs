use spraypaint_core::color::{Color, HIGH_TAG, LOW_TAG};
use spraypaint_core::two_color::{IDENTITY_SPACE, PERIOD, color, color_match, identify, paint};
use spraypaint_core::{Owner, crack_color};

const BUFFER_IDS: usize = 14;

fn owners() -> impl Iterator<Item = Owner> {
    (0..u32::from(IDENTITY_SPACE)).map(|id| Owner::new(id).unwrap())
}

#[test]
fn every_owner_roundtrips_through_identify() {
    let mut buf = vec![0u8; 48];
    for owner in owners() {
        for buffer_id in 0..BUFFER_IDS {
            paint(owner, buffer_id, &mut buf);
            let record = identify(&buf)
                .unwrap_or_else(|| panic!("owner {owner} buffer {buffer_id} not identified"));
            assert_eq!(record.identity, owner);
            assert_eq!(record.phase, buffer_id % PERIOD);
            assert_eq!(record.length, buf.len());
        }
    }
}

#[test]
fn shortest_identifiable_buffer_is_one_period_plus_one() {
    let owner = Owner::new(321).unwrap();
    for buffer_id in 0..PERIOD {
        let mut buf = vec![0u8; PERIOD + 1];
        paint(owner, buffer_id, &mut buf);
        let record = identify(&buf).unwrap();
        assert_eq!(record.length, PERIOD + 1);

        assert_eq!(identify(&buf[..PERIOD]), None);
    }
}

#[test]
fn paint_agrees_with_color_lookup() {
    let owner = Owner::new(555).unwrap();
    let mut buf = vec![0u8; 97];
    paint(owner, 3, &mut buf);
    for (k, &byte) in buf.iter().enumerate() {
        assert_eq!(byte, color(owner, 3, k));
    }
}

#[test]
fn prefix_law_full_buffer() {
    let owner = Owner::new(17).unwrap();
    let mut buf = vec![0u8; 333];
    paint(owner, 9, &mut buf);
    assert_eq!(color_match(owner, 9 % PERIOD, &buf), buf.len());
}

#[test]
fn prefix_law_garbage_at_p() {
    let owner = Owner::new(17).unwrap();
    let mut clean = vec![0u8; 200];
    paint(owner, 2, &mut clean);
    for p in 0..clean.len() {
        let mut buf = clean.clone();
        buf[p] = 0x00;
        assert!(!Color::from_byte(buf[p]).is_valid());
        assert_eq!(color_match(owner, 2, &buf), p);
    }
}

#[test]
fn constant_buffers_are_never_identified() {
    for byte in 0..=u8::MAX {
        for len in [0, 1, 2, 7, 8, 64, 4096] {
            let buf = vec![byte; len];
            assert_eq!(identify(&buf), None, "byte {byte} len {len}");
        }
    }
}

#[test]
fn short_evidence_is_not_trusted() {
    let owner = Owner::new(600).unwrap();
    let mut clean = vec![0u8; 64];
    paint(owner, 0, &mut clean);
    // Transition at position 3 is genuine, but the run ends at or before one period.
    for cut in 4..=PERIOD {
        let mut buf = clean.clone();
        buf[cut] = 0xff;
        assert_eq!(color_match(owner, 0, &buf), cut);
        assert_eq!(identify(&buf), None, "cut at {cut}");
    }
    let mut buf = clean.clone();
    buf[PERIOD + 1] = 0xff;
    let record = identify(&buf).unwrap();
    assert_eq!(record.identity, owner);
    assert_eq!(record.length, PERIOD + 1);
}

#[test]
fn identify_on_a_slice_reports_the_slice_phase() {
    let owner = Owner::new(250).unwrap();
    let mut buf = vec![0u8; 200];
    paint(owner, 4, &mut buf);
    for offset in [1, 5, 13, 64, 150] {
        let record = identify(&buf[offset..]).unwrap();
        assert_eq!(record.identity, owner);
        assert_eq!(record.phase, (4 + offset) % PERIOD);
    }
}

#[test]
fn classification_examples() {
    let o = |id| Owner::new(id).unwrap();
    assert_eq!(crack_color(o(3), LOW_TAG + 3), "131 Local [3 mod 29]");
    assert_eq!(crack_color(o(3), LOW_TAG + 1), "129 Foreign [1 mod 29]");
    assert_eq!(crack_color(o(0), LOW_TAG), "128 Root [0 mod 29]");
    assert_eq!(crack_color(o(3), 11), "11 Garbage");
    assert_eq!(crack_color(o(34), HIGH_TAG + 3), "67 Local [3 mod 31]");
}
