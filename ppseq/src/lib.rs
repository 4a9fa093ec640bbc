#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Pump-probe timing sequence composer and sequencer.
//!
//! A [`Device`] discovers the registers, calibration and channels of a timing device through a
//! [`DeviceLink`](ppseq_core::link::DeviceLink). A [`Sequencer`] programs its queues in the background
//! and controls the acquisition. Packets are cached locally and on the device under the MD5 hash of their descriptor.

/// Two-level packet store.
pub mod cache;
/// Persisted configurations.
pub mod config;
/// Device handle.
pub mod device;
/// Error type.
pub mod error;
/// Links to timing devices.
pub mod link;
/// Settings.
pub mod option;
/// Prelude.
pub mod prelude;
/// Queue uploads.
pub mod queue;
/// Devices by domain name.
pub mod registry;
/// Queue runtime and acquisition control.
pub mod sequencer;

pub use ppseq_core as core;
pub use ppseq_driver as driver;

pub use device::Device;
pub use registry::DeviceRegistry;
pub use sequencer::Sequencer;
