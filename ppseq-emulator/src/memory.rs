use std::collections::BTreeMap;

/// The register words of the timing FPGA.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegisterMemory {
    words: BTreeMap<u32, u32>,
}

fn shift(bitmask: u32) -> u32 {
    if bitmask == 0 {
        0
    } else {
        bitmask.trailing_zeros()
    }
}

impl RegisterMemory {
    /// Creates zeroed memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The word at `address`.
    #[must_use]
    pub fn word(&self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(0)
    }

    /// Replaces the bits of `bitmask` at `address` with the bits of `value`.
    pub fn write(&mut self, address: u32, bitmask: u32, value: u32) {
        let word = self.words.entry(address).or_default();
        *word = (*word & !bitmask) | (value & bitmask);
    }

    /// Adds `value` to the bits of `bitmask` at `address`, wrapping within the field.
    pub fn increment(&mut self, address: u32, bitmask: u32, value: u32) {
        let word = self.words.entry(address).or_default();
        let field = (*word & bitmask).wrapping_add(value & bitmask) & bitmask;
        *word = (*word & !bitmask) | field;
    }

    /// The field of `bitmask` at `address`, shifted down to bit 0.
    #[must_use]
    pub fn read(&self, address: u32, bitmask: u32) -> u32 {
        (self.word(address) & bitmask) >> shift(bitmask)
    }

    /// Zeroes all words.
    pub fn clear(&mut self) {
        self.words.clear();
    }
}
