//! Deterministic fault injection for painted buffers.
//!
//! Faults are the kinds of damage a scan is expected to localize: a single
//! flipped bit, scattered garbage, a run of constant bytes, or another
//! owner's paint stomped over a range.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use spraypaint_core::two_color::{IDENTITY_SPACE, paint};
use spraypaint_core::Owner;

use crate::HarnessError;

/// xorshift64* generator. Deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of the shift sequence.
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = (high_inclusive - low) as u64 + 1;
        low + (self.next_u64() % span) as usize
    }
}

/// One kind of damage applied to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Flip bit `bit` (0..8) of the byte at `position`.
    BitFlip { position: usize, bit: u8 },
    /// Make `count` writes of untagged bytes at pseudo-random positions.
    /// Positions may repeat.
    Scatter { seed: u64, count: usize },
    /// Paint `len` bytes from `start` with `owner`'s colors for `buffer_id`.
    Stomp {
        start: usize,
        len: usize,
        owner: Owner,
        buffer_id: usize,
    },
    /// Overwrite `len` bytes from `start` with `byte`.
    Fill { start: usize, len: usize, byte: u8 },
}

impl Fault {
    /// Apply the fault, clamped to the buffer. Returns the number of bytes touched.
    pub fn apply(&self, buffer: &mut [u8]) -> usize {
        match *self {
            Self::BitFlip { position, bit } => match buffer.get_mut(position) {
                Some(byte) => {
                    *byte ^= 1 << (bit & 7);
                    1
                }
                None => 0,
            },
            Self::Scatter { seed, count } => {
                if buffer.is_empty() {
                    return 0;
                }
                let mut rng = XorShift64::new(seed);
                let mut touched = HashSet::with_capacity(count.min(buffer.len()));
                for _ in 0..count {
                    let k = rng.gen_range(0, buffer.len() - 1);
                    // Tag bits clear: never a valid color.
                    buffer[k] = (rng.next_u64() & 0x1f) as u8;
                    touched.insert(k);
                }
                touched.len()
            }
            Self::Stomp {
                start,
                len,
                owner,
                buffer_id,
            } => {
                let range = clamp(buffer.len(), start, len);
                let touched = range.len();
                paint(owner, buffer_id, &mut buffer[range]);
                touched
            }
            Self::Fill { start, len, byte } => {
                let range = clamp(buffer.len(), start, len);
                let touched = range.len();
                buffer[range].fill(byte);
                touched
            }
        }
    }

    /// The owner whose paint this fault leaves behind, if any.
    #[must_use]
    pub fn culprit(&self) -> Option<Owner> {
        match self {
            Self::Stomp { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

fn clamp(buffer_len: usize, start: usize, len: usize) -> std::ops::Range<usize> {
    let start = start.min(buffer_len);
    start..start.saturating_add(len).min(buffer_len)
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BitFlip { position, bit } => write!(f, "bitflip:{position}:{bit}"),
            Self::Scatter { seed, count } => write!(f, "scatter:{seed}:{count}"),
            Self::Stomp {
                start,
                len,
                owner,
                buffer_id,
            } => write!(f, "stomp:{start}:{len}:{owner}:{buffer_id}"),
            Self::Fill { start, len, byte } => write!(f, "fill:{start}:{len}:{byte}"),
        }
    }
}

impl FromStr for Fault {
    type Err = HarnessError;

    /// Parses the [`Display`](fmt::Display) form, e.g. `stomp:100:64:613:0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HarnessError::InvalidArgument(format!("bad fault '{s}'"));
        let mut parts = s.split(':');
        let kind = parts.next().ok_or_else(invalid)?;
        let fields: Vec<u64> = parts
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        let fault = match (kind, fields.as_slice()) {
            ("bitflip", &[position, bit]) if bit < 8 => Self::BitFlip {
                position: position as usize,
                bit: bit as u8,
            },
            ("scatter", &[seed, count]) => Self::Scatter {
                seed,
                count: count as usize,
            },
            ("stomp", &[start, len, owner, buffer_id]) => Self::Stomp {
                start: start as usize,
                len: len as usize,
                owner: Owner::new(u32::try_from(owner).map_err(|_| invalid())?)?,
                buffer_id: buffer_id as usize,
            },
            ("fill", &[start, len, byte]) => Self::Fill {
                start: start as usize,
                len: len as usize,
                byte: u8::try_from(byte).map_err(|_| invalid())?,
            },
            _ => return Err(invalid()),
        };
        Ok(fault)
    }
}

// A foreign stomp this long always differs from the victim's paint somewhere.
const MIN_STOMP: usize = 32;

/// An ordered list of faults applied to one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub faults: Vec<Fault>,
}

impl FaultPlan {
    #[must_use]
    pub fn new(faults: Vec<Fault>) -> Self {
        Self { faults }
    }

    /// One random fault sized for a buffer of `buffer_len` bytes.
    ///
    /// Every generated fault changes at least one byte of a painted buffer.
    /// Stomps use an owner other than `victim` and root.
    #[must_use]
    pub fn random(rng: &mut XorShift64, buffer_len: usize, victim: Owner) -> Self {
        if buffer_len == 0 {
            return Self::default();
        }
        let last = buffer_len - 1;
        let fault = match rng.gen_range(0, 3) {
            0 => Fault::BitFlip {
                position: rng.gen_range(0, last),
                bit: rng.gen_range(0, 7) as u8,
            },
            1 => Fault::Scatter {
                seed: rng.next_u64(),
                count: rng.gen_range(1, 16),
            },
            2 => {
                let start = rng.gen_range(0, last);
                Fault::Fill {
                    start,
                    len: rng.gen_range(1, buffer_len - start),
                    // Untagged, so the fill never reproduces paint.
                    byte: (rng.next_u64() & 0x1f) as u8,
                }
            }
            _ => {
                let mut culprit = victim.get();
                while culprit == victim.get() {
                    culprit = rng.gen_range(1, usize::from(IDENTITY_SPACE) - 1) as u16;
                }
                let start = rng.gen_range(0, buffer_len.saturating_sub(MIN_STOMP));
                Fault::Stomp {
                    start,
                    len: (buffer_len - start).min(rng.gen_range(MIN_STOMP, 512)),
                    owner: Owner::new(u32::from(culprit)).unwrap_or(Owner::ROOT),
                    buffer_id: rng.gen_range(0, 13),
                }
            }
        };
        Self::new(vec![fault])
    }

    /// Apply every fault in order. Returns the total bytes touched.
    pub fn apply(&self, buffer: &mut [u8]) -> usize {
        self.faults.iter().map(|fault| fault.apply(buffer)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}
