mod error;
mod io;
mod table;

pub use error::RegisterError;
pub use io::{RegisterIo, RegisterStorage};
pub use table::RegisterTable;

use getset::{CopyGetters, Getters};

/// Direction of the user scale relative to the dial scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Sign {
    /// `user = dial + offset`
    #[default]
    Positive,
    /// `user = -dial + offset`
    Negative,
}

impl Sign {
    /// The sign as a factor.
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Sign::Positive => 1.,
            Sign::Negative => -1.,
        }
    }
}

/// An addressable bit field of the timing FPGA.
///
/// A register holds an unsigned integer count. The count converts to a dial value with `dial = count * stepsize`,
/// and the dial value converts to a user value with `user = dial * sign + offset`.
#[derive(Clone, Debug, PartialEq, Getters, CopyGetters)]
pub struct Register {
    /// The unique name of the register.
    #[getset(get = "pub")]
    name: String,
    /// The address of the 32-bit word containing the register.
    #[getset(get_copy = "pub")]
    address: u32,
    /// The position of the least significant bit in the word.
    #[getset(get_copy = "pub")]
    bit_offset: u8,
    /// The width of the register in bits.
    #[getset(get_copy = "pub")]
    bits: u8,
    /// The dial value of one count.
    #[getset(get_copy = "pub")]
    stepsize: f64,
    /// The user value at count zero.
    #[getset(get_copy = "pub")]
    offset: f64,
    /// The direction of the user scale.
    #[getset(get_copy = "pub")]
    sign: Sign,
    /// The smallest count that may be written.
    #[getset(get_copy = "pub")]
    min_count: u64,
    /// The largest count that may be written.
    #[getset(get_copy = "pub")]
    max_count: u64,
    dummy: bool,
}

impl Register {
    /// Creates a new [`Register`] with unit step size and the full count range of the bit field.
    pub fn new(
        name: impl Into<String>,
        address: u32,
        bit_offset: u8,
        bits: u8,
    ) -> Result<Self, RegisterError> {
        let name = name.into();
        if bits == 0 || bits > 32 || bit_offset > 31 || bit_offset as u32 + bits as u32 > 32 {
            return Err(RegisterError::InvalidBitField {
                name,
                bit_offset,
                bits,
            });
        }
        Ok(Self {
            name,
            address,
            bit_offset,
            bits,
            stepsize: 1.,
            offset: 0.,
            sign: Sign::Positive,
            min_count: 0,
            max_count: (1u64 << bits) - 1,
            dummy: false,
        })
    }

    /// Creates a placeholder for a register the device does not advertise.
    ///
    /// A dummy register accepts writes silently and reads as zero. Encoders emit nothing for it.
    #[must_use]
    pub fn dummy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: 0,
            bit_offset: 0,
            bits: 32,
            stepsize: 1.,
            offset: 0.,
            sign: Sign::Positive,
            min_count: 0,
            max_count: u32::MAX as u64,
            dummy: true,
        }
    }

    /// Sets the step size.
    #[must_use]
    pub fn with_stepsize(mut self, stepsize: f64) -> Self {
        self.stepsize = stepsize;
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the sign.
    #[must_use]
    pub fn with_sign(mut self, sign: Sign) -> Self {
        self.sign = sign;
        self
    }

    /// Restricts the counts that may be written.
    pub fn with_count_range(mut self, min: u64, max: u64) -> Result<Self, RegisterError> {
        if min > max || max > self.field_mask() {
            return Err(RegisterError::InvalidCountRange {
                name: self.name,
                min,
                max,
                bits: self.bits,
            });
        }
        self.min_count = min;
        self.max_count = max;
        Ok(self)
    }

    /// Returns `true` for a placeholder created by [`Register::dummy`].
    #[must_use]
    pub const fn is_dummy(&self) -> bool {
        self.dummy
    }

    const fn field_mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    /// The mask of the register bits in its word.
    #[must_use]
    pub const fn bitmask(&self) -> u32 {
        (self.field_mask() << self.bit_offset) as u32
    }

    /// Converts a count to its dial value.
    #[must_use]
    pub fn dial_from_count(&self, count: u64) -> f64 {
        count as f64 * self.stepsize
    }

    /// Converts a dial value to a user value.
    #[must_use]
    pub fn user_from_dial(&self, dial: f64) -> f64 {
        dial * self.sign.factor() + self.offset
    }

    /// Converts a user value to a dial value.
    #[must_use]
    pub fn dial_from_user(&self, user: f64) -> f64 {
        (user - self.offset) * self.sign.factor()
    }

    /// Converts a count to its user value.
    #[must_use]
    pub fn value_from_count(&self, count: u64) -> f64 {
        self.user_from_dial(self.dial_from_count(count))
    }

    /// The count whose dial value is closest to `dial`, limited to the count range.
    #[must_use]
    pub fn count_from_dial(&self, dial: f64) -> u64 {
        if self.stepsize == 0. || dial.is_nan() {
            return self.min_count;
        }
        let count = (dial / self.stepsize).round();
        count.clamp(self.min_count as f64, self.max_count as f64) as u64
    }

    /// The count whose user value is closest to `value`, limited to the count range.
    #[must_use]
    pub fn count_from_value(&self, value: f64) -> u64 {
        self.count_from_dial(self.dial_from_user(value))
    }

    /// The representable user value closest to `value`.
    #[must_use]
    pub fn next(&self, value: f64) -> f64 {
        if value.is_nan() {
            return value;
        }
        self.value_from_count(self.count_from_value(value))
    }

    /// Limits a count to the count range, warning if it has to.
    #[must_use]
    pub fn clamp_count(&self, count: i64) -> u64 {
        if count < self.min_count as i64 {
            tracing::warn!(
                "{}: count {} is below the minimum {}, clamped",
                self.name,
                count,
                self.min_count
            );
            self.min_count
        } else if count as u64 > self.max_count {
            tracing::warn!(
                "{}: count {} is above the maximum {}, clamped",
                self.name,
                count,
                self.max_count
            );
            self.max_count
        } else {
            count as u64
        }
    }

    /// Shifts a count into its word position.
    ///
    /// The second element is `true` if bits of the count were lost to the mask.
    #[must_use]
    pub const fn encode(&self, count: u64) -> (u32, bool) {
        let masked = count & self.field_mask();
        ((masked << self.bit_offset) as u32, masked != count)
    }

    /// Shifts a count into its word position, warning with both values if it does not fit.
    #[must_use]
    pub fn wire_value(&self, count: u64) -> u32 {
        let (value, lossy) = self.encode(count);
        if lossy {
            tracing::warn!(
                "{}: count {} does not fit in {} bits, written as {}",
                self.name,
                count,
                self.bits,
                (value >> self.bit_offset)
            );
        }
        value
    }

    /// Replaces the register bits of `word` with `count`.
    #[must_use]
    pub fn apply(&self, word: u32, count: u64) -> u32 {
        (word & !self.bitmask()) | self.wire_value(count)
    }

    /// Extracts the count from a word as reported by the device.
    ///
    /// Words arrive as signed 32-bit integers; negative ones are reinterpreted by adding 2^32.
    #[must_use]
    pub const fn count_from_raw(&self, raw: i64) -> u64 {
        let word = (if raw < 0 { raw + (1i64 << 32) } else { raw }) as u64;
        (word >> self.bit_offset) & self.field_mask()
    }
}
