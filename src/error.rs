//! Fatal, construction-time errors. Everything a running guest can do wrong
//! is handled in place by the bus/peripherals (see their module docs); this
//! type only covers conditions that must prevent the core from starting.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// BIOS image missing or the wrong size.
    MissingBios,
    /// Cartridge image could not be read, or its size is not a power of two
    /// and so no ROM bank can be mapped.
    InvalidCartridge,
    /// The backing RAM allocation failed or came back the wrong size.
    RamAllocation,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::MissingBios => write!(f, "BIOS image missing or invalid"),
            CoreError::InvalidCartridge => write!(f, "cartridge image unreadable or not a power-of-two size"),
            CoreError::RamAllocation => write!(f, "backing RAM allocation failed"),
        }
    }
}

impl std::error::Error for CoreError {}
