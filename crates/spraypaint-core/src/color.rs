//! Color byte format and provenance classification.
//!
//! A color is one byte:
//! - high-order 3 bits: tag, either [`LOW_TAG`] or [`HIGH_TAG`], naming the modulus
//! - low-order 5 bits: the owner's identity modulo [`LOW_PRIME`] or [`HIGH_PRIME`]
//!
//! Any other tag, or a residue at or above the tag's modulus, is garbage.
//! Bytes are decoded into the tagged [`Color`] variant; the byte mapping is
//! exact in both directions so painting and cracking agree bit for bit.

use std::fmt;

use crate::two_color::Owner;

/// Modulus of low-tagged colors.
pub const LOW_PRIME: u8 = 29;
/// Modulus of high-tagged colors.
pub const HIGH_PRIME: u8 = 31;
/// Tag bits of a low color.
pub const LOW_TAG: u8 = 0x80;
/// Tag bits of a high color.
pub const HIGH_TAG: u8 = 0x40;

const TAG_MASK: u8 = 0xe0;
const RESIDUE_MASK: u8 = 0x1f;

/// Which of the two moduli a color carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Low,
    High,
}

impl Band {
    #[must_use]
    pub const fn modulus(self) -> u8 {
        match self {
            Self::Low => LOW_PRIME,
            Self::High => HIGH_PRIME,
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Low => LOW_TAG,
            Self::High => HIGH_TAG,
        }
    }
}

/// A decoded color byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Residue modulo 29, always `< LOW_PRIME`.
    Low(u8),
    /// Residue modulo 31, always `< HIGH_PRIME`.
    High(u8),
    /// Any byte that is not a valid color; keeps the raw value.
    Garbage(u8),
}

impl Color {
    /// Decode a raw byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        let residue = byte & RESIDUE_MASK;
        match byte & TAG_MASK {
            LOW_TAG if residue < LOW_PRIME => Self::Low(residue),
            HIGH_TAG if residue < HIGH_PRIME => Self::High(residue),
            _ => Self::Garbage(byte),
        }
    }

    /// Encode back to the raw byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Low(residue) => LOW_TAG | residue,
            Self::High(residue) => HIGH_TAG | residue,
            Self::Garbage(byte) => byte,
        }
    }

    /// The color `owner` paints in `band`.
    #[must_use]
    pub const fn of(owner: Owner, band: Band) -> Self {
        let residue = (owner.get() % band.modulus() as u16) as u8;
        match band {
            Band::Low => Self::Low(residue),
            Band::High => Self::High(residue),
        }
    }

    #[must_use]
    pub const fn band(self) -> Option<Band> {
        match self {
            Self::Low(_) => Some(Band::Low),
            Self::High(_) => Some(Band::High),
            Self::Garbage(_) => None,
        }
    }

    #[must_use]
    pub const fn residue(self) -> Option<u8> {
        match self {
            Self::Low(residue) | Self::High(residue) => Some(residue),
            Self::Garbage(_) => None,
        }
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Garbage(_))
    }
}

impl From<u8> for Color {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

/// Who a single observed byte appears to belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Not a valid color at all.
    Garbage,
    /// Valid color with residue 0, as painted by the root owner.
    Root,
    /// Valid color matching the local owner's color for that modulus.
    Local,
    /// Valid color of some other owner.
    Foreign,
}

impl Provenance {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Garbage => "Garbage",
            Self::Root => "Root",
            Self::Local => "Local",
            Self::Foreign => "Foreign",
        }
    }
}

/// Classification of one byte relative to a local owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrackedColor {
    pub byte: u8,
    pub provenance: Provenance,
    /// `None` for garbage.
    pub band: Option<Band>,
}

impl CrackedColor {
    #[must_use]
    pub fn new(local: Owner, byte: u8) -> Self {
        let color = Color::from_byte(byte);
        let Some(band) = color.band() else {
            return Self {
                byte,
                provenance: Provenance::Garbage,
                band: None,
            };
        };
        // Root wins over Local: the root owner's own colors crack as Root.
        let provenance = if color.residue() == Some(0) {
            Provenance::Root
        } else if color == Color::of(local, band) {
            Provenance::Local
        } else {
            Provenance::Foreign
        };
        Self {
            byte,
            provenance,
            band: Some(band),
        }
    }
}

impl fmt::Display for CrackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.band {
            None => write!(f, "{} Garbage", self.byte),
            Some(band) => write!(
                f,
                "{} {} [{} mod {}]",
                self.byte,
                self.provenance.as_str(),
                self.byte & RESIDUE_MASK,
                band.modulus()
            ),
        }
    }
}

/// Describe `color` as seen by `local`, e.g. `"131 Local [3 mod 29]"`.
#[must_use]
pub fn crack_color(local: Owner, color: u8) -> String {
    CrackedColor::new(local, color).to_string()
}
