use thiserror::Error;

/// An error in a line of the sequence language.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum ParseError {
    /// A character that starts no token.
    #[error("Unexpected character '{ch}' at {pos}")]
    UnexpectedChar {
        /// Byte position
        pos: usize,
        /// The character
        ch: char,
    },
    /// A string literal without a closing quote.
    #[error("Unterminated string starting at {0}")]
    UnterminatedString(usize),
    /// A malformed number or time unit.
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    /// A token that does not fit the grammar.
    #[error("Expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the parser was looking for
        expected: &'static str,
        /// The offending token
        found: String,
    },
    /// The line ended early.
    #[error("Expected {0}, found end of input")]
    UnexpectedEnd(&'static str),
    /// Keyword and positional arguments mixed at the top level.
    #[error("Keyword and positional arguments cannot be mixed at the top level")]
    MixedTopLevel,
    /// A repetition count that is not a non-negative integer.
    #[error("Invalid repetition count: {0}")]
    InvalidRepeat(String),
    /// A call to a function that is not a generator.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    /// A generator called with invalid arguments.
    #[error("{function}: {reason}")]
    InvalidArgument {
        /// Generator name
        function: String,
        /// What is wrong
        reason: String,
    },
    /// Lists of different lengths in one scope.
    #[error("Length of {key} ({len}) does not match the other lists ({expected})")]
    LengthMismatch {
        /// The parameter
        key: String,
        /// Its length
        len: usize,
        /// Length of the other lists
        expected: usize,
    },
    /// A parameter value of the wrong kind.
    #[error("Invalid value of {key}: {value}")]
    InvalidValue {
        /// The parameter
        key: String,
        /// The value as written
        value: String,
    },
    /// An expression that does not describe scan points.
    #[error("Not a scan point: {0}")]
    InvalidRecord(String),
    /// A scan point whose timing is inconsistent.
    #[error("{0}")]
    InvalidTiming(String),
    /// An expression nested deeper than the limit.
    #[error("Expression is nested deeper than {0} levels")]
    TooDeep(usize),
    /// An expression that expands into more values than the limit.
    #[error("Expression expands into more than {0} values")]
    TooManyValues(usize),
}

/// An error in compiling a scan point.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum CompileError {
    /// The period of a scan point is zero.
    #[error("Period must be positive")]
    ZeroPeriod,
    /// The X-ray pulses do not fit in the period.
    #[error("{n} pulses every {dt} ticks do not fit in a period of {period} ticks")]
    PulsesExceedPeriod {
        /// Number of pulses
        n: usize,
        /// Pulse spacing in ticks
        dt: usize,
        /// Period in ticks
        period: usize,
    },
    /// A phase matching period that does not fit in an interrupt record.
    #[error("Phase matching period {0} exceeds {max}", max = u8::MAX)]
    PhaseMatchingPeriod(u32),
}

/// An error in decoding a packet.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum PacketError {
    /// The packet ends inside a record.
    #[error("Packet truncated at byte {0}")]
    Truncated(usize),
    /// A record length that is too short or runs past the end.
    #[error("Invalid record length {length} at byte {offset}")]
    InvalidLength {
        /// Byte offset of the record
        offset: usize,
        /// Length field of the record
        length: usize,
    },
    /// A record type that is not defined.
    #[error("Unknown record type {ty} at byte {offset}")]
    UnknownType {
        /// Byte offset of the record
        offset: usize,
        /// Type field of the record
        ty: u8,
    },
    /// A record version that is not supported.
    #[error("Unsupported record version {version} at byte {offset}")]
    UnsupportedVersion {
        /// Byte offset of the record
        offset: usize,
        /// Version field of the record
        version: u8,
    },
    /// A text record that is not UTF-8.
    #[error("Invalid UTF-8 text at byte {0}")]
    InvalidText(usize),
    /// A packet that does not start with its index.
    #[error("Packet has no index")]
    MissingIndex,
    /// An index entry that does not point at a record boundary inside the packet.
    #[error("Index entry {tick} points at {offset}, outside of the packet")]
    InvalidIndex {
        /// Tick of the entry
        tick: usize,
        /// The offset
        offset: usize,
    },
    /// A tick beyond the period.
    #[error("Tick {tick} is out of range (period {period})")]
    TickOutOfRange {
        /// Requested tick
        tick: usize,
        /// Period in ticks
        period: usize,
    },
}
