use embedded_can::{ExtendedId, Id, StandardId};
use heapless::Vec;

use crate::{crc::CRC15_WIDTH, crc15, push_value, Bit, CodecError, MAX_FRAME_BITS};

pub const BASE_ID_WIDTH: usize = 11;
pub const EXTENDED_ID_WIDTH: usize = 18;
pub const DLC_WIDTH: usize = 4;
pub const MAX_DATA_LENGTH: usize = 8;
pub const MAX_DLC_CODE: u8 = (1 << DLC_WIDTH) - 1;

/// Fixed-width field accumulator. Bits arrive most significant first and
/// nothing is accepted once `WIDTH` bits have been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldBits<const WIDTH: usize> {
    value: u32,
    len: u8,
}

impl<const WIDTH: usize> FieldBits<WIDTH> {
    pub const fn new() -> Self {
        Self { value: 0, len: 0 }
    }

    /// A complete field holding the `WIDTH` low bits of `value`
    pub fn from_value(value: u32) -> Self {
        Self {
            value: value & Self::mask(),
            len: WIDTH as u8,
        }
    }

    const fn mask() -> u32 {
        (1 << WIDTH) - 1
    }

    /// Appends one bit. Returns `false` without writing if the field is
    /// already complete.
    pub fn push(&mut self, bit: Bit) -> bool {
        if self.is_complete() {
            return false;
        }

        self.value = (self.value << 1) | bit.as_bool() as u32;
        self.len += 1;

        true
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_complete(&self) -> bool {
        self.len as usize == WIDTH
    }

    /// Value of the bits written so far
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Bit at `index` of a complete field, counted from the most significant
    /// end
    pub fn bit(&self, index: usize) -> Bit {
        if index >= WIDTH {
            return Bit::Recessive;
        }

        Bit::from_bool((self.value >> (WIDTH - 1 - index)) & 1 == 1)
    }
}

/// A classic CAN data or remote frame as it appears bit by bit on the bus.
///
/// Fields are kept at bit level so that a frame under reception can be
/// filled in one bit at a time. The extended-format fields (`srr`, `r1` and
/// the identifier extension) stay empty unless IDE is recessive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    base_id: FieldBits<BASE_ID_WIDTH>,
    rtr: Bit,
    srr: Option<Bit>,
    ide: Bit,
    extended_id: FieldBits<EXTENDED_ID_WIDTH>,
    r1: Option<Bit>,
    r0: Bit,
    dlc_code: FieldBits<DLC_WIDTH>,
    dlc: u8,
    payload: [u8; MAX_DATA_LENGTH],
    payload_bits: u8,
    crc: FieldBits<{ CRC15_WIDTH as usize }>,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            base_id: FieldBits::new(),
            rtr: Bit::Dominant,
            srr: None,
            ide: Bit::Dominant,
            extended_id: FieldBits::new(),
            r1: None,
            r0: Bit::Dominant,
            dlc_code: FieldBits::new(),
            dlc: 0,
            payload: [0; MAX_DATA_LENGTH],
            payload_bits: 0,
            crc: FieldBits::new(),
        }
    }
}

impl Frame {
    fn with_id(id: Id) -> Self {
        let mut frame = Self::default();

        match id {
            Id::Standard(id) => {
                frame.base_id = FieldBits::from_value(id.as_raw() as u32);
            }
            Id::Extended(id) => {
                let raw = id.as_raw();
                frame.base_id = FieldBits::from_value(raw >> EXTENDED_ID_WIDTH);
                frame.extended_id = FieldBits::from_value(raw);
                frame.srr = Some(Bit::Recessive);
                frame.ide = Bit::Recessive;
                frame.r1 = Some(Bit::Dominant);
            }
        }

        frame
    }

    /// Overrides the transmitted data length code. Codes above 8 still
    /// describe 8 data bytes; missing bytes are sent as zeros. Codes that do
    /// not fit the four DLC bits saturate at 15.
    pub fn with_dlc_code(mut self, code: u8) -> Self {
        self.dlc_code = FieldBits::from_value(code.min(MAX_DLC_CODE) as u32);
        self.dlc = (self.dlc_code.value() as u8).min(MAX_DATA_LENGTH as u8);

        if self.rtr.is_dominant() {
            let bits = self.dlc * 8;
            if bits > self.payload_bits {
                self.payload_bits = bits;
            }
        }

        self
    }

    /// The 11 base identifier bits
    pub fn base_id(&self) -> u16 {
        self.base_id.value() as u16
    }

    /// The 18 identifier extension bits, for extended-format frames
    pub fn extended_id(&self) -> Option<u32> {
        (!self.extended_id.is_empty()).then(|| self.extended_id.value())
    }

    pub fn rtr(&self) -> Bit {
        self.rtr
    }

    pub fn srr(&self) -> Option<Bit> {
        self.srr
    }

    pub fn ide(&self) -> Bit {
        self.ide
    }

    pub fn r1(&self) -> Option<Bit> {
        self.r1
    }

    pub fn r0(&self) -> Bit {
        self.r0
    }

    /// The data length code exactly as sent (0..=15)
    pub fn dlc_code(&self) -> u8 {
        self.dlc_code.value() as u8
    }

    /// The 15-bit CRC sequence as received. Empty for frames built locally.
    pub fn crc_sequence(&self) -> Option<u16> {
        self.crc
            .is_complete()
            .then(|| self.crc.value() as u16)
    }

    /// Number of data bits present in the data field
    pub fn data_bits(&self) -> usize {
        if self.rtr.is_recessive() {
            0
        } else {
            self.dlc as usize * 8
        }
    }

    /// Serialises the frame from start-of-frame through the CRC sequence,
    /// before stuffing. The CRC is computed over the preceding bits.
    pub fn unstuffed_bits(&self) -> Result<Vec<Bit, MAX_FRAME_BITS>, CodecError> {
        let mut bits = Vec::new();

        bits.push(Bit::Dominant)
            .map_err(|_| CodecError::Overflow(MAX_FRAME_BITS))?;
        push_value(&mut bits, self.base_id.value(), BASE_ID_WIDTH as u8)?;

        if let Some(srr) = self.srr.filter(|_| self.ide.is_recessive()) {
            push_value(&mut bits, srr.as_bool() as u32, 1)?;
            push_value(&mut bits, self.ide.as_bool() as u32, 1)?;
            push_value(&mut bits, self.extended_id.value(), EXTENDED_ID_WIDTH as u8)?;
            push_value(&mut bits, self.rtr.as_bool() as u32, 1)?;
            push_value(&mut bits, self.r1.unwrap_or_default().as_bool() as u32, 1)?;
        } else {
            push_value(&mut bits, self.rtr.as_bool() as u32, 1)?;
            push_value(&mut bits, self.ide.as_bool() as u32, 1)?;
        }

        push_value(&mut bits, self.r0.as_bool() as u32, 1)?;
        push_value(&mut bits, self.dlc_code.value(), DLC_WIDTH as u8)?;

        for index in 0..self.data_bits() {
            push_value(&mut bits, self.payload_bit(index).as_bool() as u32, 1)?;
        }

        let crc = crc15(&bits);
        push_value(&mut bits, crc as u32, CRC15_WIDTH)?;

        Ok(bits)
    }

    /* Bit-level access used by the state machine */

    pub(crate) fn push_base_id(&mut self, bit: Bit) -> bool {
        self.base_id.push(bit);
        self.base_id.is_complete()
    }

    pub(crate) fn push_extended_id(&mut self, bit: Bit) -> bool {
        self.extended_id.push(bit);
        self.extended_id.is_complete()
    }

    pub(crate) fn set_rtr(&mut self, bit: Bit) {
        self.rtr = bit;
    }

    /// SRR occupies the slot first taken as RTR
    pub(crate) fn move_rtr_to_srr(&mut self) {
        self.srr = Some(self.rtr);
    }

    pub(crate) fn set_ide(&mut self, bit: Bit) {
        self.ide = bit;
    }

    pub(crate) fn set_r1(&mut self, bit: Bit) {
        self.r1 = Some(bit);
    }

    pub(crate) fn set_r0(&mut self, bit: Bit) {
        self.r0 = bit;
    }

    /// Returns the clamped data length once all four DLC bits are in
    pub(crate) fn push_dlc_code(&mut self, bit: Bit) -> Option<u8> {
        self.dlc_code.push(bit);

        if !self.dlc_code.is_complete() {
            return None;
        }

        self.dlc = (self.dlc_code.value() as u8).min(MAX_DATA_LENGTH as u8);
        Some(self.dlc)
    }

    /// Returns `true` once the data field is complete
    pub(crate) fn push_payload(&mut self, bit: Bit) -> bool {
        let index = self.payload_bits as usize;

        if index < self.data_bits() {
            if bit.as_bool() {
                self.payload[index / 8] |= 0x80 >> (index % 8);
            }
            self.payload_bits += 1;
        }

        self.payload_bits as usize >= self.data_bits()
    }

    pub(crate) fn push_crc(&mut self, bit: Bit) -> bool {
        self.crc.push(bit);
        self.crc.is_complete()
    }

    pub(crate) fn base_id_bits(&self) -> &FieldBits<BASE_ID_WIDTH> {
        &self.base_id
    }

    pub(crate) fn extended_id_bits(&self) -> &FieldBits<EXTENDED_ID_WIDTH> {
        &self.extended_id
    }

    pub(crate) fn dlc_code_bits(&self) -> &FieldBits<DLC_WIDTH> {
        &self.dlc_code
    }

    pub(crate) fn crc_bits_received(&self) -> usize {
        self.crc.len()
    }

    pub(crate) fn payload_bits_received(&self) -> usize {
        self.payload_bits as usize
    }

    pub(crate) fn payload_bit(&self, index: usize) -> Bit {
        if index >= MAX_DATA_LENGTH * 8 {
            return Bit::Dominant;
        }

        Bit::from_bool(self.payload[index / 8] & (0x80 >> (index % 8)) != 0)
    }
}

impl embedded_can::Frame for Frame {
    /// Creates a data frame. `data` must be at most 8 bytes long.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LENGTH {
            return None;
        }

        let mut frame = Self::with_id(id.into());
        frame.payload[..data.len()].copy_from_slice(data);
        frame.payload_bits = (data.len() * 8) as u8;

        Some(frame.with_dlc_code(data.len() as u8))
    }

    /// Creates a remote frame requesting `dlc` bytes (0..=8)
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_DATA_LENGTH {
            return None;
        }

        let mut frame = Self::with_id(id.into());
        frame.rtr = Bit::Recessive;

        Some(frame.with_dlc_code(dlc as u8))
    }

    fn is_extended(&self) -> bool {
        self.ide.is_recessive()
    }

    fn is_remote_frame(&self) -> bool {
        self.rtr.is_recessive()
    }

    fn id(&self) -> Id {
        if self.is_extended() {
            let raw = (self.base_id.value() << EXTENDED_ID_WIDTH) | self.extended_id.value();
            Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO))
        } else {
            Id::Standard(StandardId::new(self.base_id.value() as u16).unwrap_or(StandardId::ZERO))
        }
    }

    /// The data length after clamping codes above 8
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        &self.payload[..self.data_bits() / 8]
    }
}
