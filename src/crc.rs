//! CRC-15 as carried in the CRC field of classic CAN frames.

use crate::Bit;

/// Generator polynomial x^15 + x^14 + x^10 + x^8 + x^7 + x^4 + x^3 + 1,
/// leading term implied.
pub const CRC15_POLYNOMIAL: u16 = 0x4599;

pub const CRC15_WIDTH: u8 = 15;

const CRC15_MASK: u16 = 0x7FFF;

/// Linear feedback shift register fed one protocol bit at a time, from
/// start-of-frame through the last data bit. Stuff bits are never fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc15 {
    register: u16,
}

impl Crc15 {
    pub const fn new() -> Self {
        Self { register: 0 }
    }

    pub fn reset(&mut self) {
        self.register = 0;
    }

    pub fn update(&mut self, bit: Bit) {
        let carry = bit.as_bool() ^ (self.register >> (CRC15_WIDTH - 1) & 1 == 1);

        self.register = (self.register << 1) & CRC15_MASK;

        if carry {
            self.register ^= CRC15_POLYNOMIAL;
        }
    }

    /// Current register contents (15 bits)
    pub fn value(&self) -> u16 {
        self.register
    }

    /// Register bit at `index`, counted from the most significant end as it
    /// goes out on the wire. Indices past the register read as recessive.
    pub fn bit(&self, index: u8) -> Bit {
        if index >= CRC15_WIDTH {
            return Bit::Recessive;
        }

        Bit::from_bool((self.register >> (CRC15_WIDTH - 1 - index)) & 1 == 1)
    }

    /// Whether a received 15-bit CRC sequence equals the register
    pub fn matches(&self, received: u16) -> bool {
        self.register == received & CRC15_MASK
    }
}

/// CRC-15 of a whole (destuffed) bit sequence
pub fn crc15(bits: &[Bit]) -> u16 {
    let mut crc = Crc15::new();

    for bit in bits {
        crc.update(*bit);
    }

    crc.value()
}

#[cfg(test)]
mod tests {
    use heapless::Vec;

    use crate::{bits_from_ascii, crc15, Bit, Crc15};

    // SOF, id 0x123, RTR, IDE, r0, DLC 2, data 01 02
    const REFERENCE: &[u8] = b"0 00100100011 000 0010 00000001 00000010";

    #[test]
    fn reference_vector() {
        let bits: Vec<Bit, 64> = bits_from_ascii(REFERENCE).unwrap();
        assert_eq!(crc15(&bits), 0x69FE);

        let zeros = [Bit::Dominant; 34];
        assert_eq!(crc15(&zeros), 0);
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let bits: Vec<Bit, 64> = bits_from_ascii(REFERENCE).unwrap();
        let reference = crc15(&bits);

        for index in 0..bits.len() {
            let mut flipped = bits.clone();
            flipped[index] = flipped[index].complement();

            assert_ne!(crc15(&flipped), reference, "flip at {index} went unnoticed");
        }
    }

    #[test]
    fn register_bits_go_out_msb_first() {
        let bits: Vec<Bit, 64> = bits_from_ascii(REFERENCE).unwrap();

        let mut crc = Crc15::new();
        bits.iter().for_each(|bit| crc.update(*bit));

        // 0x69FE = 110 1001 1111 1110
        assert_eq!(crc.bit(0), Bit::Recessive);
        assert_eq!(crc.bit(2), Bit::Dominant);
        assert_eq!(crc.bit(14), Bit::Dominant);
        assert!(crc.matches(0x69FE));
        assert!(!crc.matches(0x69FF));

        crc.reset();
        assert_eq!(crc.value(), 0);
    }
}
