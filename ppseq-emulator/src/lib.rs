#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! An in-memory emulator of the pump-probe timing device.
//!
//! The emulator holds the device file system, the driver variables and the register memory,
//! and executes the packets of its queues tick by tick.

mod device;
mod fs;
mod memory;
mod option;
mod queue;
mod registers;

pub use device::{DeviceEmulator, Report, MAX_REPORTS, VARIABLES};
pub use fs::FileSystem;
pub use memory::RegisterMemory;
pub use option::EmulatorOption;
pub use registers::default_registers;
