//! Bit-level state machine of a single CAN node.
//!
//! [`Node::advance`] consumes one bit from the bus. The active field handler
//! decides the next state; bits in the stuffed region then feed the CRC
//! register and the stuff counter, and any violation overrides the handler's
//! choice with the error frame. Transmission runs the very same graph: only
//! the origin of each bit differs (see [`Node::transmit`]).

use embedded_can::Frame as _;
use heapless::Vec;

use crate::{
    Acknowledge, Arbitration, Bit, Config, Control, Crc15, CrcField, Direction, EchoMode, Event,
    Field, Frame, FrameSink, InterframeSpace, InvalidBit, InvalidBitPolicy, Mode, Recovery,
    StuffCounter, Violation, MAX_FRAME_BITS,
};

pub const INTERMISSION_BITS: u8 = 3;
pub const END_OF_FRAME_BITS: u8 = 7;
pub const FLAG_MIN_BITS: u8 = 6;
/// Flags superposed by several stations may stretch up to this length
pub const FLAG_MAX_BITS: u8 = 12;
pub const RECOVERY_DELIMITER_BITS: u8 = 8;
pub const MAX_OVERLOAD_FRAMES: u8 = 2;

/// Outcome of a field handler that accepted the bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Consumed,
    /// Zero-length transition, the same bit is dispatched again
    Empty,
    /// Last bit of a frame that passed every check
    Completed,
}

#[derive(Debug, Clone)]
pub struct Node {
    config: Config,
    direction: Direction,
    mode: Mode,
    frame: Frame,
    raw: Vec<Bit, MAX_FRAME_BITS>,
    crc: Crc15,
    stuffing: StuffCounter,
    /// Bit position inside fixed-length fields (intermission, EOF, flags)
    counter: u8,
    /// Detected but not yet signalled (CRC mismatch waits for the ACK delimiter)
    pending_fault: Option<Violation>,
    /// Field whose bits completed the run the current stuff bit answers
    stuffed_field: Field,
    overloads: u8,
    /// Queued, not yet on the bus
    outbound: Option<Frame>,
    /// On the bus. Kept across an error frame so that it is sent again.
    sending: Option<Frame>,
    position: u32,
}

impl Default for Node {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Node {
    /// Creates a receiving node waiting on an idle bus
    pub fn new(config: Config) -> Self {
        Self {
            config,
            direction: Direction::Receive,
            mode: Mode::Normal(Field::BUS_IDLE),
            frame: Frame::default(),
            raw: Vec::new(),
            crc: Crc15::new(),
            stuffing: StuffCounter::new(),
            counter: 0,
            pending_fault: None,
            stuffed_field: Field::StartOfFrame,
            overloads: 0,
            outbound: None,
            sending: None,
            position: 0,
        }
    }

    /// Returns to bus idle, dropping any frame in progress or queued
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Field in effect, looking through the stuffing overlay
    pub fn field(&self) -> Field {
        self.mode.field()
    }

    /// The frame under reception (or transmission), as far as it got
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The frame waiting to go out, if any
    pub fn outbound(&self) -> Option<&Frame> {
        self.outbound.as_ref()
    }

    /// The frame currently being transmitted, if any
    pub fn sending(&self) -> Option<&Frame> {
        self.sending.as_ref()
    }

    /// Number of bits handed to the node so far
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Schedules `frame` for transmission. Sending starts at the next bus
    /// idle, replacing anything queued but not yet started. A frame already
    /// on the bus is not affected.
    pub fn queue(&mut self, frame: Frame) {
        self.outbound = Some(frame);

        if self.mode == Mode::Normal(Field::BUS_IDLE) {
            self.direction = Direction::Transmit;
        }
    }

    /// Drives the node from a bit source until it runs dry. While the node
    /// transmits no input is read.
    pub fn run<I, S>(&mut self, source: I, sink: &mut S) -> Result<(), InvalidBit>
    where
        I: IntoIterator<Item = u8>,
        S: FrameSink,
    {
        let mut source = source.into_iter();

        loop {
            if self.transmit(sink).is_some() {
                continue;
            }

            let Some(byte) = source.next() else {
                return Ok(());
            };

            match Bit::try_from(byte) {
                Ok(bit) => self.advance(bit, sink),
                Err(err) => match self.config.invalid_bits() {
                    InvalidBitPolicy::Skip => sink.event(Event::InvalidInput(byte)),
                    InvalidBitPolicy::Reject => return Err(err),
                },
            }
        }
    }

    /// Produces and processes the next outbound bit. Returns `None` while
    /// the node is receiving.
    pub fn transmit<S: FrameSink>(&mut self, sink: &mut S) -> Option<Bit> {
        if self.direction != Direction::Transmit {
            return None;
        }

        if self.sending.is_none() {
            let Some(frame) = self.outbound.take() else {
                self.direction = Direction::Receive;
                return None;
            };
            self.sending = Some(frame);
        }

        let bit = self.outbound_bit();
        sink.transmitted(bit);
        self.advance(bit, sink);

        Some(bit)
    }

    /// Consumes one bit sampled from the bus
    pub fn advance<S: FrameSink>(&mut self, bit: Bit, sink: &mut S) {
        let from = self.mode;

        match self.mode {
            Mode::Stuffing { saved } => match self.stuffing.check_stuff_bit(bit) {
                Ok(()) => self.mode = Mode::Normal(saved),
                Err(_) => self.abort(Violation::Stuffing, self.stuffed_field, sink),
            },
            Mode::Normal(_) => self.dispatch(bit, sink),
        }

        if self.mode != from {
            sink.event(Event::Transition {
                from,
                to: self.mode,
                position: self.position,
            });
        }

        self.position = self.position.wrapping_add(1);
    }

    fn dispatch<S: FrameSink>(&mut self, bit: Bit, sink: &mut S) {
        loop {
            let Mode::Normal(field) = self.mode else {
                return;
            };

            let step = match self.handle(field, bit, sink) {
                Ok(step) => step,
                Err(violation) => {
                    self.abort(violation, field, sink);
                    return;
                }
            };

            if step == Step::Empty {
                continue;
            }

            if field.is_frame() {
                // MAX_FRAME_BITS covers the longest frame, SOF through EOF
                let stored = self.raw.push(bit).is_ok();
                debug_assert!(stored, "frame exceeds MAX_FRAME_BITS");
            }

            if field.is_crc_covered() {
                self.crc.update(bit);
            }

            if field.is_stuffed() && self.stuffing.observe(bit) {
                self.stuffed_field = field;
                self.mode = Mode::Stuffing {
                    saved: self.mode.field(),
                };
            }

            if step == Step::Completed {
                self.complete(sink);
            }

            return;
        }
    }

    fn handle<S: FrameSink>(
        &mut self,
        field: Field,
        bit: Bit,
        sink: &mut S,
    ) -> Result<Step, Violation> {
        match field {
            Field::InterframeSpace(sub) => self.interframe_space(sub, bit, sink),
            Field::StartOfFrame => {
                self.begin_frame(sink);
                self.enter(Field::Arbitration(Arbitration::Identifier));
                Ok(Step::Consumed)
            }
            Field::Arbitration(sub) => Ok(self.arbitration(sub, bit)),
            Field::Control(sub) => Ok(self.control(sub, bit)),
            Field::Data => {
                if self.frame.push_payload(bit) {
                    self.enter(Field::Crc(CrcField::Sequence));
                }
                Ok(Step::Consumed)
            }
            Field::Crc(sub) => self.crc_field(sub, bit),
            Field::Acknowledge(sub) => self.acknowledge(sub, bit),
            Field::EndOfFrame => {
                expect_recessive(field, bit)?;

                self.counter += 1;
                if self.counter < END_OF_FRAME_BITS {
                    return Ok(Step::Consumed);
                }

                self.enter(Field::INTERMISSION);
                Ok(Step::Completed)
            }
            Field::Error(sub) | Field::Overload(sub) => self.recovery(field, sub, bit),
        }
    }

    fn enter(&mut self, field: Field) {
        self.mode = Mode::Normal(field);
        self.counter = 0;
    }

    fn interframe_space<S: FrameSink>(
        &mut self,
        sub: InterframeSpace,
        bit: Bit,
        sink: &mut S,
    ) -> Result<Step, Violation> {
        match (sub, bit) {
            (InterframeSpace::BusIdle, Bit::Dominant) => {
                self.enter(Field::StartOfFrame);
                Ok(Step::Empty)
            }
            (InterframeSpace::BusIdle, Bit::Recessive) => {
                if self.outbound.is_some() {
                    self.direction = Direction::Transmit;
                }
                Ok(Step::Consumed)
            }
            (InterframeSpace::Intermission, Bit::Recessive) => {
                self.counter += 1;

                if self.counter == INTERMISSION_BITS {
                    self.enter(Field::BUS_IDLE);

                    if self.overloads == 0 && self.outbound.is_some() {
                        self.direction = Direction::Transmit;
                    }
                    self.overloads = 0;
                }

                Ok(Step::Consumed)
            }
            // Dominant in the last intermission bit is a start-of-frame
            (InterframeSpace::Intermission, Bit::Dominant)
                if self.counter == INTERMISSION_BITS - 1 =>
            {
                self.enter(Field::StartOfFrame);
                Ok(Step::Empty)
            }
            (InterframeSpace::Intermission, Bit::Dominant) => {
                self.overloads += 1;

                if self.overloads > MAX_OVERLOAD_FRAMES {
                    return Err(Violation::OverloadLimit);
                }

                #[cfg(feature = "defmt")]
                defmt::debug!("Overload frame {} at bit {}", self.overloads, self.position);

                sink.event(Event::OverloadFrame {
                    count: self.overloads,
                    position: self.position,
                });

                // The sampled bit is the first bit of the overload flag
                self.enter(Field::Overload(Recovery::Flag));
                self.counter = 1;

                Ok(Step::Consumed)
            }
        }
    }

    /// Clears everything left over from the previous frame
    fn begin_frame<S: FrameSink>(&mut self, sink: &mut S) {
        #[cfg(feature = "defmt")]
        defmt::trace!("Start of frame at bit {}", self.position);

        self.frame = Frame::default();
        self.raw.clear();
        self.crc.reset();
        self.stuffing.reset();
        self.pending_fault = None;
        self.overloads = 0;

        sink.hard_sync();
    }

    fn arbitration(&mut self, sub: Arbitration, bit: Bit) -> Step {
        match sub {
            Arbitration::Identifier => {
                if self.frame.push_base_id(bit) {
                    self.enter(Field::Arbitration(Arbitration::Rtr));
                }
                Step::Consumed
            }
            Arbitration::Rtr => {
                self.frame.set_rtr(bit);

                if self.frame.ide().is_recessive() {
                    self.enter(Field::Control(Control::Reserved1));
                } else {
                    self.enter(Field::Control(Control::Ide));
                }
                Step::Consumed
            }
            Arbitration::Srr => {
                self.frame.move_rtr_to_srr();
                self.enter(Field::Arbitration(Arbitration::Ide));
                Step::Empty
            }
            Arbitration::Ide => {
                self.enter(Field::Arbitration(Arbitration::ExtendedIdentifier));
                Step::Empty
            }
            Arbitration::ExtendedIdentifier => {
                if self.frame.push_extended_id(bit) {
                    self.enter(Field::Arbitration(Arbitration::Rtr));
                }
                Step::Consumed
            }
        }
    }

    fn control(&mut self, sub: Control, bit: Bit) -> Step {
        match sub {
            Control::Ide => {
                self.frame.set_ide(bit);

                if bit.is_dominant() {
                    self.enter(Field::Control(Control::Reserved0));
                } else {
                    // What looked like RTR was SRR; the real RTR follows the
                    // identifier extension
                    self.enter(Field::Arbitration(Arbitration::Srr));
                }
            }
            Control::Reserved1 => {
                self.frame.set_r1(bit);
                self.enter(Field::Control(Control::Reserved0));
            }
            Control::Reserved0 => {
                self.frame.set_r0(bit);
                self.enter(Field::Control(Control::DataLengthCode));
            }
            Control::DataLengthCode => {
                if let Some(dlc) = self.frame.push_dlc_code(bit) {
                    // Remote frames and zero length data frames have no data field
                    if self.frame.rtr().is_dominant() && dlc != 0 {
                        self.enter(Field::Data);
                    } else {
                        self.enter(Field::Crc(CrcField::Sequence));
                    }
                }
            }
        }

        Step::Consumed
    }

    fn crc_field(&mut self, sub: CrcField, bit: Bit) -> Result<Step, Violation> {
        match sub {
            CrcField::Sequence => {
                if self.frame.push_crc(bit) {
                    let received = self.frame.crc_sequence().unwrap_or_default();

                    if !self.crc.matches(received) {
                        self.pending_fault = Some(Violation::CrcMismatch {
                            received,
                            computed: self.crc.value(),
                        });
                    }

                    self.enter(Field::Crc(CrcField::Delimiter));
                }
            }
            CrcField::Delimiter => {
                expect_recessive(Field::Crc(sub), bit)?;
                self.enter(Field::Acknowledge(Acknowledge::Slot));
            }
        }

        Ok(Step::Consumed)
    }

    fn acknowledge(&mut self, sub: Acknowledge, bit: Bit) -> Result<Step, Violation> {
        match sub {
            Acknowledge::Slot => {
                if bit.is_recessive() {
                    return Err(Violation::Acknowledge);
                }
                self.enter(Field::Acknowledge(Acknowledge::Delimiter));
            }
            Acknowledge::Delimiter => {
                if let Some(fault) = self.pending_fault.take() {
                    return Err(fault);
                }

                expect_recessive(Field::Acknowledge(sub), bit)?;
                self.enter(Field::EndOfFrame);
            }
        }

        Ok(Step::Consumed)
    }

    /// Error and overload frames: a dominant flag of 6 bits, stretched up to
    /// 12 by other stations, then 8 recessive delimiter bits.
    fn recovery(&mut self, field: Field, sub: Recovery, bit: Bit) -> Result<Step, Violation> {
        let within = |sub| match field {
            Field::Overload(_) => Field::Overload(sub),
            _ => Field::Error(sub),
        };

        match (sub, bit) {
            (Recovery::Flag, Bit::Dominant) => {
                self.counter += 1;

                if self.counter > FLAG_MAX_BITS {
                    return Err(Violation::ErrorFlag { bits: self.counter });
                }
            }
            (Recovery::Flag, Bit::Recessive) => {
                if self.counter < FLAG_MIN_BITS {
                    return Err(Violation::ErrorFlag { bits: self.counter });
                }

                self.enter(within(Recovery::Delimiter));
                self.counter = 1;
            }
            (Recovery::Delimiter, Bit::Recessive) => {
                self.counter += 1;

                if self.counter == RECOVERY_DELIMITER_BITS {
                    self.enter(Field::INTERMISSION);
                }
            }
            (Recovery::Delimiter, Bit::Dominant) => {
                return Err(Violation::Framing { field });
            }
        }

        Ok(Step::Consumed)
    }

    /// Drops the frame in progress and starts an error frame. A broken error
    /// or overload frame is not answered with another one; the node waits
    /// for bus idle instead.
    fn abort<S: FrameSink>(&mut self, violation: Violation, field: Field, sink: &mut S) {
        #[cfg(feature = "defmt")]
        defmt::warn!("{} in {} at bit {}", violation, field, self.position);

        sink.event(Event::Violation {
            violation,
            field,
            position: self.position,
        });

        self.frame = Frame::default();
        self.raw.clear();
        self.pending_fault = None;

        if field.is_recovery() {
            self.enter(Field::BUS_IDLE);
        } else {
            self.overloads = 0;
            self.enter(Field::Error(Recovery::Flag));
        }
    }

    fn complete<S: FrameSink>(&mut self, sink: &mut S) {
        match self.direction {
            Direction::Transmit => {
                #[cfg(feature = "defmt")]
                defmt::debug!("Transmitted frame {}", self.frame);

                self.sending = None;
                self.direction = Direction::Receive;

                sink.event(Event::FrameTransmitted {
                    position: self.position,
                });
            }
            Direction::Receive => {
                #[cfg(feature = "defmt")]
                defmt::debug!("Received frame {}", self.frame);

                sink.frame(&self.frame, &self.raw);
                sink.event(Event::FrameReceived {
                    position: self.position,
                });

                // A frame queued by the user takes precedence over the echo
                if self.config.echo() == EchoMode::Loopback && self.outbound.is_none() {
                    self.outbound = Some(self.frame.clone());
                }
            }
        }
    }

    /// The bit this node drives in its current state. Fields are read from
    /// the queued frame at the position the frame under construction has
    /// reached; fixed-form bits are constants.
    fn outbound_bit(&self) -> Bit {
        let field = match self.mode {
            Mode::Stuffing { .. } => return self.stuffing.previous().complement(),
            Mode::Normal(field) => field,
        };

        let Some(outbound) = self.sending.as_ref() else {
            return Bit::Recessive;
        };

        match field {
            Field::InterframeSpace(InterframeSpace::BusIdle) | Field::StartOfFrame => Bit::Dominant,
            Field::InterframeSpace(InterframeSpace::Intermission) => Bit::Recessive,
            Field::Arbitration(Arbitration::Identifier) => {
                outbound.base_id_bits().bit(self.frame.base_id_bits().len())
            }
            // First pass through RTR carries SRR for extended frames
            Field::Arbitration(Arbitration::Rtr) => match outbound.srr() {
                Some(srr) if outbound.is_extended() && self.frame.ide().is_dominant() => srr,
                _ => outbound.rtr(),
            },
            // SRR and IDE are empty transitions into the identifier extension
            Field::Arbitration(_) => outbound
                .extended_id_bits()
                .bit(self.frame.extended_id_bits().len()),
            Field::Control(Control::Ide) => outbound.ide(),
            Field::Control(Control::Reserved1) => outbound.r1().unwrap_or(Bit::Dominant),
            Field::Control(Control::Reserved0) => outbound.r0(),
            Field::Control(Control::DataLengthCode) => outbound
                .dlc_code_bits()
                .bit(self.frame.dlc_code_bits().len()),
            Field::Data => outbound.payload_bit(self.frame.payload_bits_received()),
            Field::Crc(CrcField::Sequence) => self.crc.bit(self.frame.crc_bits_received() as u8),
            Field::Crc(CrcField::Delimiter) => Bit::Recessive,
            // Single-node loopback: the sender acknowledges its own frame
            Field::Acknowledge(Acknowledge::Slot) => Bit::Dominant,
            Field::Acknowledge(Acknowledge::Delimiter) | Field::EndOfFrame => Bit::Recessive,
            Field::Error(Recovery::Flag) | Field::Overload(Recovery::Flag)
                if self.counter < FLAG_MIN_BITS =>
            {
                Bit::Dominant
            }
            Field::Error(_) | Field::Overload(_) => Bit::Recessive,
        }
    }
}

fn expect_recessive(field: Field, bit: Bit) -> Result<(), Violation> {
    if bit.is_dominant() {
        return Err(Violation::Framing { field });
    }

    Ok(())
}
