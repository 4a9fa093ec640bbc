#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Core traits and types for the pump-probe timing sequencer.

/// Observable attributes with monitors and stale-event rejection.
pub mod attribute;
/// Timing calibration of the device.
pub mod calibration;
/// Output channels of the timing unit.
pub mod channel;
/// Common constants and units.
pub mod defined;
/// A interface to the device file system.
pub mod link;
/// FPGA register model.
pub mod register;
/// Sleep abstraction used by spin loops.
pub mod sleep;
