//! Two-color buffer painter.
//!
//! Buffer ownership is made traceable by painting distinctive byte patterns.
//! An owner is identified by a pair of colors, one per modulus, which gives
//! `29 * 31 = 899` distinguishable owners. The sequencing of the two colors
//! along the buffer, a period-7 pattern shifted by a buffer id:
//! - loosely distinguishes several buffers of the same owner
//! - loosely distinguishes cache lines and pages within one buffer
//! - makes it unlikely that arbitrary memory resembles a painted buffer
//!
//! Given only raw bytes, [`identify`] recovers the owner from its two
//! residues by the Chinese Remainder Theorem, and the phase from where the
//! first color transition falls.

use std::fmt;

use crate::color::{Band, Color, HIGH_PRIME, LOW_PRIME};
use crate::error::CodecError;

/// Period of the color pattern.
pub const PERIOD: usize = 7;

/// Number of distinguishable owners.
pub const IDENTITY_SPACE: u16 = LOW_PRIME as u16 * HIGH_PRIME as u16;

/// The low color covers the first `PERIOD / 2` positions of every period.
const LOW_RUN: usize = PERIOD / 2;

// Inverses used by the closed-form CRT:
// 31 * 15 = 465 = 16 * 29 + 1, and 29 * 15 = 435 = 14 * 31 + 1.
const HIGH_PRIME_INV_MOD_LOW: u32 = 15;
const LOW_PRIME_INV_MOD_HIGH: u32 = 15;

/// Identity of a buffer owner, in `[0, 899)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Owner(u16);

impl Owner {
    /// The root owner. Its colors carry residue 0 in both moduli.
    pub const ROOT: Self = Self(0);

    pub fn new(identity: u32) -> Result<Self, CodecError> {
        if identity < u32::from(IDENTITY_SPACE) {
            Ok(Self(identity as u16))
        } else {
            Err(CodecError::IdentityOutOfRange { identity })
        }
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Owner {
    type Error = CodecError;

    fn try_from(identity: u32) -> Result<Self, Self::Error> {
        Self::new(identity)
    }
}

/// Which band the pattern selects at `position` of a buffer shifted by `buffer_id`.
#[inline]
#[must_use]
pub const fn band_at(buffer_id: usize, position: usize) -> Band {
    let v = (buffer_id % PERIOD + position % PERIOD) % PERIOD;
    if v < LOW_RUN { Band::Low } else { Band::High }
}

/// Expected byte at `position` of buffer `buffer_id` painted by `owner`.
#[inline]
#[must_use]
pub const fn color(owner: Owner, buffer_id: usize, position: usize) -> u8 {
    Color::of(owner, band_at(buffer_id, position)).to_byte()
}

/// Paint `buffer` with `owner`'s pattern for `buffer_id`.
pub fn paint(owner: Owner, buffer_id: usize, buffer: &mut [u8]) {
    for (k, byte) in buffer.iter_mut().enumerate() {
        *byte = color(owner, buffer_id, k);
    }
}

/// Length of the longest prefix of `buffer` painted by `owner` at `phase`.
///
/// `phase` stands in for the buffer id, so `color_match(o, id % 7, b)`
/// accepts whatever `paint(o, id, b)` wrote.
#[must_use]
pub fn color_match(owner: Owner, phase: usize, buffer: &[u8]) -> usize {
    buffer
        .iter()
        .enumerate()
        .position(|(k, &byte)| byte != color(owner, phase, k))
        .unwrap_or(buffer.len())
}

/// Who painted a region, as recovered by [`identify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRecord {
    pub identity: Owner,
    /// Length of the consistently painted prefix.
    pub length: usize,
    /// Modulo [`PERIOD`].
    pub phase: usize,
}

impl fmt::Display for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Identity: {} Length: {} Phase: {}",
            self.identity, self.length, self.phase
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CandidateColors {
    identity: Owner,
    phase: usize,
}

/// Candidate owner and phase from the first color transition in `buffer`.
fn candidates(buffer: &[u8]) -> Option<CandidateColors> {
    if buffer.len() < 2 {
        return None;
    }
    let window = buffer.len().min(PERIOD);
    let c_0 = buffer[0];
    let k = (1..window).find(|&k| buffer[k] != c_0)?;
    let c_1 = buffer[k];

    let (residue_low, residue_high, phase) = match (Color::from_byte(c_0), Color::from_byte(c_1))
    {
        (Color::Low(low), Color::High(high)) => (low, high, (PERIOD + LOW_RUN - k) % PERIOD),
        (Color::High(high), Color::Low(low)) => (low, high, PERIOD - k),
        _ => return None,
    };

    Some(CandidateColors {
        identity: crt(residue_low, residue_high),
        phase,
    })
}

/// Owner whose residues are `residue_low` (mod 29) and `residue_high` (mod 31).
///
/// Closed form; equal to a linear search over the owner space, including
/// `(0, 0) -> 0`.
///
/// # Panics
///
/// On residues outside their moduli, or if the result does not reproduce
/// its residues. Both are codec defects, not runtime faults.
#[must_use]
pub fn crt(residue_low: u8, residue_high: u8) -> Owner {
    assert!(
        residue_low < LOW_PRIME && residue_high < HIGH_PRIME,
        "residues ({residue_low}, {residue_high}) are not reduced"
    );
    let low = u32::from(residue_low) * u32::from(HIGH_PRIME) * HIGH_PRIME_INV_MOD_LOW;
    let high = u32::from(residue_high) * u32::from(LOW_PRIME) * LOW_PRIME_INV_MOD_HIGH;
    let identity = (low + high) % u32::from(IDENTITY_SPACE);
    let owner = Owner(identity as u16);
    debug_assert_eq!(Color::of(owner, Band::Low), Color::Low(residue_low));
    debug_assert_eq!(Color::of(owner, Band::High), Color::High(residue_high));
    owner
}

/// Identify the owner of the longest consistently painted prefix of `buffer`.
///
/// Returns `None` when the buffer carries too little evidence: fewer than
/// two bytes, no transition in the first period, a transition that is not
/// one low and one high color, or a matching run of at most [`PERIOD`]
/// bytes. `None` means indeterminate, not corrupt.
#[must_use]
pub fn identify(buffer: &[u8]) -> Option<IdentityRecord> {
    let candidate = candidates(buffer)?;
    let length = color_match(candidate.identity, candidate.phase, buffer);
    if length <= PERIOD {
        return None;
    }
    Some(IdentityRecord {
        identity: candidate.identity,
        length,
        phase: candidate.phase,
    })
}

/// Like [`color_match`], rejecting a phase that is not reduced.
pub fn checked_color_match(owner: Owner, phase: usize, buffer: &[u8]) -> Result<usize, CodecError> {
    if phase >= PERIOD {
        return Err(CodecError::InvalidPhase { phase });
    }
    Ok(color_match(owner, phase, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: u16) -> Owner {
        Owner::new(u32::from(id)).unwrap()
    }

    fn brute_force_crt(residue_low: u8, residue_high: u8) -> Option<Owner> {
        (0..IDENTITY_SPACE).map(Owner).find(|&o| {
            Color::of(o, Band::Low) == Color::Low(residue_low)
                && Color::of(o, Band::High) == Color::High(residue_high)
        })
    }

    #[test]
    fn owner_space_is_bounded() {
        assert_eq!(IDENTITY_SPACE, 899);
        assert!(Owner::new(898).is_ok());
        assert_eq!(
            Owner::new(899),
            Err(CodecError::IdentityOutOfRange { identity: 899 })
        );
        assert!(Owner::ROOT.is_root());
    }

    #[test]
    fn pattern_runs_three_low_then_four_high() {
        let bands: Vec<Band> = (0..PERIOD).map(|k| band_at(0, k)).collect();
        assert_eq!(
            bands,
            [
                Band::Low,
                Band::Low,
                Band::Low,
                Band::High,
                Band::High,
                Band::High,
                Band::High
            ]
        );
        assert_eq!(band_at(1, 2), Band::High);
        assert_eq!(band_at(usize::MAX, 1), band_at(usize::MAX % PERIOD, 1));
    }

    #[test]
    fn closed_form_crt_matches_linear_search() {
        for low in 0..LOW_PRIME {
            for high in 0..HIGH_PRIME {
                assert_eq!(Some(crt(low, high)), brute_force_crt(low, high));
            }
        }
        assert_eq!(crt(0, 0), Owner::ROOT);
    }

    #[test]
    #[should_panic(expected = "not reduced")]
    fn crt_rejects_unreduced_residues() {
        let _ = crt(LOW_PRIME, 0);
    }

    #[test]
    fn paint_then_match() {
        let mut b_0 = [0u8; 100];
        paint(owner(0), 0, &mut b_0);
        assert_eq!(color_match(owner(0), 0, &b_0), 100);
        assert_eq!(color_match(owner(0), 1, &b_0[1..]), 99);

        let mut b_1 = [0u8; 100];
        paint(owner(3), 1, &mut b_1);
        assert_eq!(color_match(owner(3), 1, &b_1), 100);
        assert_eq!(color_match(owner(0), 0, &b_1), 0);
    }

    #[test]
    fn identify_at_every_offset() {
        let mut b = [0u8; 100];
        for (buf_id, u) in (0..100u16).step_by(17).enumerate() {
            paint(owner(u), buf_id, &mut b);
            let id = identify(&b).unwrap();
            assert_eq!(id.identity, owner(u));
            assert_eq!(id.length, b.len());
            assert_eq!(id.phase, buf_id % PERIOD);

            for offset in 0..b.len() - PERIOD {
                let id = identify(&b[offset..]).unwrap();
                assert_eq!(id.identity, owner(u));
                assert_eq!(id.length, b.len() - offset);
                assert_eq!(id.phase, (buf_id + offset) % PERIOD);
            }
        }
    }

    #[test]
    fn identify_stops_at_first_wrong_byte() {
        const BUF_ID: usize = 19;
        let mut b = [0u8; 100];
        paint(owner(98), BUF_ID, &mut b);
        b[13] = 0;
        let id = identify(&b[3..]).unwrap();
        assert_eq!(id.identity, owner(98));
        assert_eq!(id.length, 13 - 3);
        assert_eq!(id.phase, (3 + BUF_ID) % PERIOD);
    }

    #[test]
    fn identify_rejects_constant_buffers() {
        assert_eq!(identify(&[128u8; 100]), None);
        assert_eq!(identify(&[0u8; 3]), None);
        assert_eq!(identify(&[64u8]), None);
        assert_eq!(identify(&[]), None);
    }

    #[test]
    fn identify_rejects_constant_preamble() {
        let mut b = [0u8; 100];
        paint(owner(93), 0, &mut b);
        let fill = b[10];
        b[..PERIOD].fill(fill);
        assert_eq!(identify(&b), None);
    }

    #[test]
    fn identify_rejects_same_band_transition() {
        let mut b = [0u8; 40];
        paint(owner(5), 0, &mut b);
        b[0] = Color::Low(6).to_byte();
        assert_eq!(identify(&b), None);
    }

    #[test]
    fn identify_rejects_garbage_transition() {
        let mut b = [0u8; 40];
        paint(owner(5), 0, &mut b);
        b[3] = 0x20;
        assert_eq!(identify(&b), None);
    }

    #[test]
    fn identify_resolves_root() {
        let mut b = [0u8; 64];
        paint(Owner::ROOT, 4, &mut b);
        let id = identify(&b).unwrap();
        assert_eq!(id.identity, Owner::ROOT);
        assert_eq!(id.phase, 4);
        assert_eq!(id.length, 64);
    }

    #[test]
    fn record_renders_like_a_log_line() {
        let record = IdentityRecord {
            identity: owner(12),
            length: 40,
            phase: 3,
        };
        assert_eq!(record.to_string(), "Identity: 12 Length: 40 Phase: 3");
    }

    #[test]
    fn checked_match_rejects_unreduced_phase() {
        let b = [0u8; 4];
        assert_eq!(
            checked_color_match(owner(1), PERIOD, &b),
            Err(CodecError::InvalidPhase { phase: PERIOD })
        );
        assert_eq!(checked_color_match(owner(1), 0, &b), Ok(0));
    }
}
