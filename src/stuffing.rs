//! Bit stuffing: after five equal protocol bits a complementary bit is
//! inserted so receivers keep finding edges to resynchronise on.

use heapless::Vec;

use crate::Bit;

/// Number of equal bits after which a stuff bit follows
pub const STUFF_RUN: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StuffError {
    #[error("Expected a stuff bit but found a sixth consecutive ({0:?}) bit")]
    MissingStuffBit(Bit),
    #[error("Bit sequence does not fit in a buffer of ({0:?}) entries")]
    Overflow(usize),
}

/// Run-length tracker over the stuffed region of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StuffCounter {
    previous: Bit,
    run: u8,
}

impl StuffCounter {
    pub const fn new() -> Self {
        Self {
            previous: Bit::Recessive,
            run: 0,
        }
    }

    /// Forget the history. The first observed bit then starts a run of one.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn previous(&self) -> Bit {
        self.previous
    }

    pub fn run(&self) -> u8 {
        self.run
    }

    /// Feeds one protocol bit. Returns `true` when the bit completed a run of
    /// [`STUFF_RUN`], meaning the next bit on the wire is a stuff bit.
    pub fn observe(&mut self, bit: Bit) -> bool {
        if bit == self.previous {
            self.run += 1;
        } else {
            self.previous = bit;
            self.run = 1;
        }

        if self.run == STUFF_RUN {
            self.run = 1;
            return true;
        }

        false
    }

    /// Consumes the bit following a completed run. It must have the opposite
    /// level; it then starts the next run.
    pub fn check_stuff_bit(&mut self, bit: Bit) -> Result<(), StuffError> {
        if bit == self.previous {
            return Err(StuffError::MissingStuffBit(bit));
        }

        self.previous = bit;
        self.run = 1;

        Ok(())
    }
}

/// Inserts stuff bits into a plain protocol bit sequence
pub fn stuff<const N: usize>(bits: &[Bit]) -> Result<Vec<Bit, N>, StuffError> {
    let mut counter = StuffCounter::new();
    let mut out = Vec::new();

    for bit in bits {
        out.push(*bit).map_err(|_| StuffError::Overflow(N))?;

        if counter.observe(*bit) {
            let stuff_bit = bit.complement();
            counter.check_stuff_bit(stuff_bit)?;
            out.push(stuff_bit).map_err(|_| StuffError::Overflow(N))?;
        }
    }

    Ok(out)
}

/// Removes stuff bits, rejecting any run that is not broken after five bits
pub fn destuff<const N: usize>(bits: &[Bit]) -> Result<Vec<Bit, N>, StuffError> {
    let mut counter = StuffCounter::new();
    let mut expect_stuff_bit = false;
    let mut out = Vec::new();

    for bit in bits {
        if expect_stuff_bit {
            counter.check_stuff_bit(*bit)?;
            expect_stuff_bit = false;
            continue;
        }

        out.push(*bit).map_err(|_| StuffError::Overflow(N))?;
        expect_stuff_bit = counter.observe(*bit);
    }

    Ok(out)
}
