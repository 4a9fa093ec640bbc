#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! Sequence language, compiler and packet format of the pump-probe timing sequencer.
//!
//! A line of the sequence language is parsed into [`sequence::Sequences`],
//! each of which compiles into a [`compiler::CompiledSequence`] and encodes into a binary packet named by the MD5 hash of its descriptor.

/// Compilation of scan points into register tracks.
pub mod compiler;
/// The sequence language.
pub mod dsl;
/// Error types.
pub mod error;
/// Binary packet format.
pub mod packet;
/// Normalized scan points.
pub mod sequence;

/// Re-exports of `ppseq-core`.
pub use ppseq_core as core;
