#[cfg_attr(docsrs, doc(cfg(feature = "link-emulated")))]
#[cfg(feature = "link-emulated")]
mod emulated;

#[cfg(feature = "link-emulated")]
pub use emulated::{Emulated, EmulatedSleeper};
