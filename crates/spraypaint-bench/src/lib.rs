//! Benchmark fixtures shared by the spraypaint benches.

use spraypaint_core::Owner;
use spraypaint_core::two_color::paint;

/// Buffer sizes exercised by the scan benchmarks.
pub const SCAN_SIZES: [usize; 3] = [4096, 64 * 1024, 1024 * 1024];

/// A buffer of `len` bytes painted by `owner` for `buffer_id`.
#[must_use]
pub fn painted(owner: Owner, buffer_id: usize, len: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; len];
    paint(owner, buffer_id, &mut buffer);
    buffer
}

/// `clean` with every `stride`-th byte zeroed.
#[must_use]
pub fn scattered(clean: &[u8], stride: usize) -> Vec<u8> {
    let mut buffer = clean.to_vec();
    for byte in buffer.iter_mut().step_by(stride.max(1)) {
        *byte = 0;
    }
    buffer
}
