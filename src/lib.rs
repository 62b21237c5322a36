#![no_std]

mod bit;
mod codec;
mod config;
mod crc;
mod event;
mod field;
mod frame;
mod node;
mod stuffing;

// Longest destuffed frame, SOF through EOF:
// 1 + 11 + 1 + 1 + 18 + 1 + 1 + 1 + 4 + 64 + 15 + 1 + 1 + 1 + 7
pub const MAX_FRAME_BITS: usize = 128;

/// Upper bound for a fully stuffed frame (one stuff bit per four protocol bits
/// in the stuffed region, worst case).
pub const MAX_STUFFED_FRAME_BITS: usize = MAX_FRAME_BITS + 30;

pub use bit::*;
pub use codec::*;
pub use config::*;
pub use crc::*;
pub use event::*;
pub use field::*;
pub use frame::*;
pub use node::*;
pub use stuffing::*;

pub use embedded_can::{ExtendedId, Frame as CanFrame, Id, StandardId};
