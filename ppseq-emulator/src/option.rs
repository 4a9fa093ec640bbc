use ppseq_driver::core::{defined::SEQUENCE_DIR, register::RegisterTable};

use crate::{default_registers, MAX_REPORTS};

/// Settings of a [`DeviceEmulator`](crate::DeviceEmulator).
#[derive(Clone, Debug, PartialEq)]
pub struct EmulatorOption {
    /// Directory of queue files and packets.
    pub sequence_dir: String,
    /// The advertised registers.
    pub registers: RegisterTable,
    /// Text of the `version` driver variable.
    pub version: String,
    /// Number of reports kept; the oldest one is discarded when full.
    pub report_capacity: usize,
}

impl Default for EmulatorOption {
    fn default() -> Self {
        Self {
            sequence_dir: SEQUENCE_DIR.to_owned(),
            registers: default_registers().unwrap_or_default(),
            version: format!("ppseq-emulator {}", env!("CARGO_PKG_VERSION")),
            report_capacity: MAX_REPORTS,
        }
    }
}
