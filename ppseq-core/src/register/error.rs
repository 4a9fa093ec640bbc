use thiserror::Error;

/// An error produced when describing a register.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum RegisterError {
    /// The bit field does not fit in a 32-bit word.
    #[error("Bit field of {name} (offset {bit_offset}, {bits} bits) does not fit in a 32-bit word")]
    InvalidBitField {
        /// Register name
        name: String,
        /// Bit offset
        bit_offset: u8,
        /// Field width
        bits: u8,
    },
    /// The count range is empty or does not fit in the bit field.
    #[error("Count range [{min}, {max}] of {name} does not fit in {bits} bits")]
    InvalidCountRange {
        /// Register name
        name: String,
        /// Lower bound
        min: u64,
        /// Upper bound
        max: u64,
        /// Field width
        bits: u8,
    },
    /// A line of an advertised register list is malformed.
    #[error("Invalid register description at line {line}: {reason}")]
    InvalidDescription {
        /// Line number, starting at 1
        line: usize,
        /// What is wrong with it
        reason: String,
    },
}
