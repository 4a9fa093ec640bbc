use std::collections::BTreeMap;

use super::{Register, RegisterError};

/// The registers a device advertises, by name.
///
/// The advertised list is a text file with one register per line:
/// `name address bit_offset bits [stepsize [min_count max_count]]`.
/// Addresses are decimal or `0x`-prefixed hexadecimal. Blank lines and lines starting with `#` are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegisterTable {
    registers: BTreeMap<String, Register>,
}

impl RegisterTable {
    /// Creates a new [`RegisterTable`].
    pub fn new(registers: impl IntoIterator<Item = Register>) -> Self {
        Self {
            registers: registers
                .into_iter()
                .map(|r| (r.name().clone(), r))
                .collect(),
        }
    }

    /// Parses an advertised register list.
    pub fn parse(text: &str) -> Result<Self, RegisterError> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(i, line)| Self::parse_line(i + 1, line))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    fn parse_line(line: usize, text: &str) -> Result<Register, RegisterError> {
        let invalid = |reason: String| RegisterError::InvalidDescription { line, reason };
        let fields = text.split_whitespace().collect::<Vec<_>>();
        if !matches!(fields.len(), 4 | 5 | 7) {
            return Err(invalid(format!("expected 4, 5 or 7 fields, got {}", fields.len())));
        }
        let address = (if let Some(hex) = fields[1]
            .strip_prefix("0x")
            .or_else(|| fields[1].strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16)
        } else {
            fields[1].parse()
        })
        .map_err(|_| invalid(format!("invalid address {}", fields[1])))?;
        let bit_offset = fields[2]
            .parse()
            .map_err(|_| invalid(format!("invalid bit offset {}", fields[2])))?;
        let bits = fields[3]
            .parse()
            .map_err(|_| invalid(format!("invalid width {}", fields[3])))?;
        let mut register = Register::new(fields[0], address, bit_offset, bits)
            .map_err(|e| invalid(e.to_string()))?;
        if let Some(stepsize) = fields.get(4) {
            register = register.with_stepsize(
                stepsize
                    .parse()
                    .map_err(|_| invalid(format!("invalid step size {stepsize}")))?,
            );
        }
        if let (Some(min), Some(max)) = (fields.get(5), fields.get(6)) {
            let min = min
                .parse()
                .map_err(|_| invalid(format!("invalid minimum {min}")))?;
            let max = max
                .parse()
                .map_err(|_| invalid(format!("invalid maximum {max}")))?;
            register = register
                .with_count_range(min, max)
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(register)
    }

    /// Formats the table as an advertised register list.
    #[must_use]
    pub fn advertise(&self) -> String {
        self.registers
            .values()
            .map(|r| {
                format!(
                    "{} 0x{:08X} {} {} {:?} {} {}\n",
                    r.name(),
                    r.address(),
                    r.bit_offset(),
                    r.bits(),
                    r.stepsize(),
                    r.min_count(),
                    r.max_count()
                )
            })
            .collect()
    }

    /// Returns the register `name`, or a dummy register if the device does not advertise it.
    #[must_use]
    pub fn get(&self, name: &str) -> Register {
        self.registers.get(name).cloned().unwrap_or_else(|| {
            tracing::trace!("{} is not advertised, using a dummy register", name);
            Register::dummy(name)
        })
    }

    /// Returns the register `name` if the device advertises it.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Register> {
        self.registers.get(name)
    }

    /// Replaces the calibration of the register `name`.
    pub fn calibrate(&mut self, name: &str, offset: f64, sign: super::Sign) {
        if let Some(r) = self.registers.get_mut(name) {
            *r = r.clone().with_offset(offset).with_sign(sign);
        }
    }

    /// An iterator over the registers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    /// The number of advertised registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Returns `true` if the device advertises no register.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}
