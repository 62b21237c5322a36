//! The position of the bit state machine inside a frame.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterframeSpace {
    /// The three recessive bits following every data, error and overload frame
    Intermission,
    /// Idle bus waiting for a start-of-frame
    BusIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Arbitration {
    /// The 11 base identifier bits
    Identifier,
    /// The bit after the base identifier. Until IDE is known this may turn
    /// out to be SRR.
    Rtr,
    /// Empty transition which moves the bit taken as RTR over to SRR
    Srr,
    /// Empty transition, IDE has already been consumed
    Ide,
    /// The 18 identifier extension bits
    ExtendedIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    Ide,
    Reserved1,
    Reserved0,
    DataLengthCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcField {
    Sequence,
    Delimiter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Acknowledge {
    Slot,
    Delimiter,
}

/// Shared layout of error and overload frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recovery {
    Flag,
    Delimiter,
}

/// Top-level frame field, carrying the sub-field where one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    InterframeSpace(InterframeSpace),
    StartOfFrame,
    Arbitration(Arbitration),
    Control(Control),
    Data,
    Crc(CrcField),
    Acknowledge(Acknowledge),
    EndOfFrame,
    Error(Recovery),
    Overload(Recovery),
}

impl Field {
    pub const BUS_IDLE: Self = Self::InterframeSpace(InterframeSpace::BusIdle);
    pub const INTERMISSION: Self = Self::InterframeSpace(InterframeSpace::Intermission);

    pub fn name(&self) -> &'static str {
        match self {
            Self::InterframeSpace(_) => "interframe space",
            Self::StartOfFrame => "start of frame",
            Self::Arbitration(_) => "arbitration",
            Self::Control(_) => "control",
            Self::Data => "data",
            Self::Crc(_) => "crc",
            Self::Acknowledge(_) => "acknowledge",
            Self::EndOfFrame => "end of frame",
            Self::Error(_) => "error",
            Self::Overload(_) => "overload",
        }
    }

    /// Bits covered by bit stuffing: start-of-frame through the CRC sequence
    pub fn is_stuffed(&self) -> bool {
        matches!(
            self,
            Self::StartOfFrame
                | Self::Arbitration(_)
                | Self::Control(_)
                | Self::Data
                | Self::Crc(CrcField::Sequence)
        )
    }

    /// Bits fed to the CRC register: start-of-frame through the data field
    pub fn is_crc_covered(&self) -> bool {
        self.is_stuffed() && !matches!(self, Self::Crc(_))
    }

    /// Whether the field belongs to a data or remote frame (as opposed to
    /// interframe space and the recovery frames)
    pub fn is_frame(&self) -> bool {
        !matches!(
            self,
            Self::InterframeSpace(_) | Self::Error(_) | Self::Overload(_)
        )
    }

    pub fn is_recovery(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Overload(_))
    }
}

/// Active state, with the bit stuffing overlay layered on top of a field.
/// Stuff bits cannot themselves be stuffed, so one saved field suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Normal(Field),
    Stuffing { saved: Field },
}

impl Mode {
    /// The field in effect, looking through the overlay
    pub fn field(&self) -> Field {
        match self {
            Self::Normal(field) => *field,
            Self::Stuffing { saved } => *saved,
        }
    }

    pub fn is_stuffing(&self) -> bool {
        matches!(self, Self::Stuffing { .. })
    }
}

/// Whether bits are read from the bus or generated from a queued frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    Receive,
    Transmit,
}

#[cfg(test)]
mod tests {
    use crate::{Arbitration, Control, CrcField, Field, Mode, Recovery};

    #[test]
    fn stuffed_region_bounds() {
        assert!(Field::StartOfFrame.is_stuffed());
        assert!(Field::Arbitration(Arbitration::Rtr).is_stuffed());
        assert!(Field::Crc(CrcField::Sequence).is_stuffed());
        assert!(!Field::Crc(CrcField::Delimiter).is_stuffed());
        assert!(!Field::BUS_IDLE.is_stuffed());

        assert!(Field::Data.is_crc_covered());
        assert!(Field::Control(Control::DataLengthCode).is_crc_covered());
        assert!(!Field::Crc(CrcField::Sequence).is_crc_covered());
    }

    #[test]
    fn overlay_looks_through_to_saved_field() {
        let mode = Mode::Stuffing { saved: Field::Data };
        assert_eq!(mode.field(), Field::Data);
        assert!(mode.is_stuffing());

        assert!(Field::Overload(Recovery::Flag).is_recovery());
        assert!(!Field::Error(Recovery::Delimiter).is_frame());
        assert!(Field::EndOfFrame.is_frame());
    }
}
