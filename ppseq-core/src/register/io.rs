use std::sync::Arc;

use super::Register;
use crate::{
    attribute::{AttributeError, Storage},
    defined::register_variable,
    link::{DeviceLink, LinkError},
};

/// Count and value access to the registers of a device.
pub trait RegisterIo {
    /// Reads the count of `register`. A dummy register reads as zero.
    fn read_count(&self, register: &Register) -> Result<u64, LinkError>;

    /// Writes the count of `register`, clamped to its count range. Writes to a dummy register are ignored.
    fn write_count(&self, register: &Register, count: i64) -> Result<(), LinkError>;

    /// Reads the user value of `register`. A dummy register reads as NaN.
    fn read_value(&self, register: &Register) -> Result<f64, LinkError> {
        if register.is_dummy() {
            return Ok(f64::NAN);
        }
        Ok(register.value_from_count(self.read_count(register)?))
    }

    /// Writes the count closest to the user value `value`. Writing NaN does nothing.
    fn write_value(&self, register: &Register, value: f64) -> Result<(), LinkError> {
        if value.is_nan() {
            return Ok(());
        }
        let count = (register.dial_from_user(value) / register.stepsize()).round();
        self.write_count(register, count as i64)
    }
}

impl<L: DeviceLink + ?Sized> RegisterIo for L {
    fn read_count(&self, register: &Register) -> Result<u64, LinkError> {
        if register.is_dummy() {
            return Ok(0);
        }
        let data = self.get(&register_variable(register.name()))?;
        let text = String::from_utf8_lossy(&data);
        let raw: i64 = text.trim().parse().map_err(|_| {
            LinkError::new(format!(
                "Invalid count of {}: {:?}",
                register.name(),
                text.trim()
            ))
        })?;
        let count = if raw < 0 { raw + (1i64 << 32) } else { raw };
        Ok(count as u64)
    }

    fn write_count(&self, register: &Register, count: i64) -> Result<(), LinkError> {
        if register.is_dummy() {
            return Ok(());
        }
        let count = register.clamp_count(count);
        let masked = (register.wire_value(count) >> register.bit_offset()) as u64;
        self.put(
            &register_variable(register.name()),
            format!("{masked}\n").as_bytes(),
        )
    }
}

/// A storage backed by a register of a device, holding its count as `u64` or its user value as `f64`.
#[derive(Clone)]
pub struct RegisterStorage {
    link: Arc<dyn DeviceLink>,
    register: Register,
}

impl RegisterStorage {
    /// Creates a new [`RegisterStorage`].
    pub fn new(link: Arc<dyn DeviceLink>, register: Register) -> Self {
        Self { link, register }
    }

    /// The register.
    #[must_use]
    pub const fn register(&self) -> &Register {
        &self.register
    }
}

impl Storage<u64> for RegisterStorage {
    fn load(&self) -> Option<u64> {
        self.link.read_count(&self.register).ok()
    }

    fn store(&self, value: &u64) -> Result<(), AttributeError> {
        let count = i64::try_from(*value).map_err(|_| AttributeError::Invalid(value.to_string()))?;
        Ok(self.link.write_count(&self.register, count)?)
    }
}

impl Storage<f64> for RegisterStorage {
    fn load(&self) -> Option<f64> {
        self.link.read_value(&self.register).ok()
    }

    fn store(&self, value: &f64) -> Result<(), AttributeError> {
        Ok(self.link.write_value(&self.register, *value)?)
    }
}
