use num_enum::{IntoPrimitive, TryFromPrimitive};

/// What a [`Node`](crate::Node) does with bytes from the bit source that are
/// neither `'0'` nor `'1'`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = ConfigParseError, constructor = ConfigParseError::InvalidBitPolicy))]
#[repr(u8)]
pub enum InvalidBitPolicy {
    /// Report an [`Event::InvalidInput`](crate::Event::InvalidInput) and read
    /// on (line breaks in bit files end up here)
    #[default]
    Skip = b'S',
    /// Stop decoding and return the offending byte
    Reject = b'R',
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = ConfigParseError, constructor = ConfigParseError::InvalidEchoMode))]
#[repr(u8)]
pub enum EchoMode {
    #[default]
    Disabled = b'0',
    /// Re-transmit every received frame after the following intermission.
    /// The node drives its own acknowledge slot (single-node loopback).
    Loopback = b'L',
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigParseError {
    #[error("Expected ({expected:?}) configuration bytes but received ({received:?})")]
    WrongLength { expected: usize, received: usize },
    #[error("Tried to decode invalid bit policy but it was out of range ({0:?})")]
    InvalidBitPolicy(u8),
    #[error("Tried to decode echo mode but it was out of range ({0:?})")]
    InvalidEchoMode(u8),
}

/// Node settings. The compact two byte form (`b"S0"`, `b"RL"`, ...) lists the
/// invalid bit policy followed by the echo mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    invalid_bits: InvalidBitPolicy,
    echo: EchoMode,
}

impl Config {
    pub fn invalid_bits(&self) -> InvalidBitPolicy {
        self.invalid_bits
    }

    pub fn echo(&self) -> EchoMode {
        self.echo
    }

    /// Consumes self and returns a new self with the supplied invalid bit
    /// policy
    pub fn with_invalid_bits(mut self, invalid_bits: InvalidBitPolicy) -> Self {
        self.invalid_bits = invalid_bits;
        self
    }

    /// Consumes self and returns a new self with the supplied echo mode
    pub fn with_echo(mut self, echo: EchoMode) -> Self {
        self.echo = echo;
        self
    }

    pub fn from_bytes(buffer: &[u8]) -> Result<Self, ConfigParseError> {
        if buffer.len() != 2 {
            return Err(ConfigParseError::WrongLength {
                expected: 2,
                received: buffer.len(),
            });
        }

        Ok(Self {
            invalid_bits: buffer[0].try_into()?,
            echo: buffer[1].try_into()?,
        })
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        [self.invalid_bits.into(), self.echo.into()]
    }
}

#[cfg(test)]
mod tests {
    use crate::{Config, ConfigParseError, EchoMode, InvalidBitPolicy};

    #[test]
    fn parse_config_bytes() {
        assert_eq!(Config::from_bytes(b"S0"), Ok(Config::default()));

        assert_eq!(
            Config::from_bytes(b"RL"),
            Ok(Config::default()
                .with_invalid_bits(InvalidBitPolicy::Reject)
                .with_echo(EchoMode::Loopback))
        );

        assert_eq!(
            Config::from_bytes(b"X0"),
            Err(ConfigParseError::InvalidBitPolicy(b'X'))
        );
        assert_eq!(
            Config::from_bytes(b"S1"),
            Err(ConfigParseError::InvalidEchoMode(b'1'))
        );
        assert_eq!(
            Config::from_bytes(b"S"),
            Err(ConfigParseError::WrongLength {
                expected: 2,
                received: 1
            })
        );

        let config = Config::default().with_echo(EchoMode::Loopback);
        assert_eq!(Config::from_bytes(&config.as_bytes()), Ok(config));
    }
}
