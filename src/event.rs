use heapless::Vec;

use crate::{Bit, Field, Frame, Mode};

/// Protocol rule broken by the bit stream. Each one aborts the frame in
/// progress; decoding resumes after the error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Violation {
    /// A fixed-form bit (delimiter, end-of-frame) had the wrong level
    #[error("Sampled a dominant bit where {field:?} requires recessive")]
    Framing { field: Field },
    #[error("Found six consecutive bits of the same level inside the stuffed region")]
    Stuffing,
    #[error("Received CRC sequence ({received:#06x}) does not match the computed one ({computed:#06x})")]
    CrcMismatch { received: u16, computed: u16 },
    #[error("No station acknowledged the frame (recessive acknowledge slot)")]
    Acknowledge,
    #[error("Error or overload flag of ({bits:?}) bits is outside 6..=12")]
    ErrorFlag { bits: u8 },
    #[error("More than two overload frames in one intermission")]
    OverloadLimit,
}

/// Diagnostic emitted by a [`Node`](crate::Node) while it runs.
///
/// `position` counts every bit handed to the node, stuff bits included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The active state changed while consuming one bit
    Transition { from: Mode, to: Mode, position: u32 },
    /// The frame in progress was aborted
    Violation {
        violation: Violation,
        field: Field,
        position: u32,
    },
    /// An overload frame started (`count` within the current intermission)
    OverloadFrame { count: u8, position: u32 },
    /// A frame passed every check and was handed to the sink
    FrameReceived { position: u32 },
    /// A queued frame went out completely
    FrameTransmitted { position: u32 },
    /// The bit source produced something other than `'0'` or `'1'`
    InvalidInput(u8),
}

/// Consumer of everything a [`Node`](crate::Node) produces.
pub trait FrameSink {
    /// Called once for every received frame that passed all checks, together
    /// with its destuffed bits from start-of-frame through end-of-frame.
    fn frame(&mut self, frame: &Frame, raw: &[Bit]);

    fn event(&mut self, _event: Event) {}

    /// Called with each bit the node drives while transmitting
    fn transmitted(&mut self, _bit: Bit) {}

    /// Start-of-frame edge. A bit timing layer resynchronises here.
    fn hard_sync(&mut self) {}
}

/// Collects received frames; frames beyond the capacity are dropped.
impl<const N: usize> FrameSink for Vec<Frame, N> {
    fn frame(&mut self, frame: &Frame, _raw: &[Bit]) {
        self.push(frame.clone()).ok();
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn frame(&mut self, frame: &Frame, raw: &[Bit]) {
        (**self).frame(frame, raw)
    }

    fn event(&mut self, event: Event) {
        (**self).event(event)
    }

    fn transmitted(&mut self, bit: Bit) {
        (**self).transmitted(bit)
    }

    fn hard_sync(&mut self) {
        (**self).hard_sync()
    }
}
