use num_enum::{IntoPrimitive, TryFromPrimitive};

/// One logical bus level. Dominant wins over recessive on the wire and is
/// written as `'0'` in bit streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = InvalidBit, constructor = InvalidBit))]
#[repr(u8)]
pub enum Bit {
    Dominant = b'0',
    #[default]
    Recessive = b'1',
}

/// A byte from a bit source that is neither `'0'` nor `'1'`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Tried to decode a logical bit but it was neither '0' nor '1' ({0:?})")]
pub struct InvalidBit(pub u8);

impl Bit {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::Recessive
        } else {
            Self::Dominant
        }
    }

    /// The logical value of the level (dominant is 0)
    pub fn as_bool(self) -> bool {
        self == Self::Recessive
    }

    pub fn is_dominant(self) -> bool {
        self == Self::Dominant
    }

    pub fn is_recessive(self) -> bool {
        self == Self::Recessive
    }

    /// The opposite level, as used for stuff bits
    pub fn complement(self) -> Self {
        match self {
            Self::Dominant => Self::Recessive,
            Self::Recessive => Self::Dominant,
        }
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}
