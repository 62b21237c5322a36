use heapless::Vec;

use crate::{Bit, InvalidBit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    #[error("Failed to decode bit string")]
    InvalidBit(#[from] InvalidBit),
    #[error("Bit sequence does not fit in a buffer of ({0:?}) entries")]
    Overflow(usize),
}

/* Encoding */

/// Appends the `width` low bits of `value`, most significant first
pub fn push_value<const N: usize>(
    out: &mut Vec<Bit, N>,
    value: u32,
    width: u8,
) -> Result<(), CodecError> {
    for shift in (0..width).rev() {
        out.push(Bit::from_bool((value >> shift) & 1 == 1))
            .map_err(|_| CodecError::Overflow(N))?;
    }

    Ok(())
}

pub fn bits_to_ascii<const N: usize>(bits: &[Bit]) -> Result<Vec<u8, N>, CodecError> {
    let mut buf = Vec::new();

    for bit in bits {
        buf.push((*bit).into())
            .map_err(|_| CodecError::Overflow(N))?;
    }

    Ok(buf)
}

/* Decoding */

/// Parses a string of `'0'`/`'1'` characters, ignoring ASCII whitespace
pub fn bits_from_ascii<const N: usize>(ascii: &[u8]) -> Result<Vec<Bit, N>, CodecError> {
    let mut buf = Vec::new();

    for byte in ascii.iter().filter(|b| !b.is_ascii_whitespace()) {
        buf.push(Bit::try_from(*byte)?)
            .map_err(|_| CodecError::Overflow(N))?;
    }

    Ok(buf)
}

/// Folds a most-significant-first bit sequence back into an integer
pub fn value_of(bits: &[Bit]) -> u32 {
    bits.iter()
        .fold(0, |acc, bit| (acc << 1) | bit.as_bool() as u32)
}
