#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::unescaped_backticks)]

//! A link to the file server of a timing device.
//!
//! The file server exposes the device file system, driver variables and registers over TCP
//! with a line-based protocol of `PUT`, `GET`, `DEL`, `EXISTS`, `DIR` and `SIZE` requests.
//! With the `server` feature, [`FileServer`] serves any [`DeviceLink`](ppseq_core::link::DeviceLink) over the same protocol.

#[cfg_attr(docsrs, doc(cfg(feature = "link")))]
#[cfg(feature = "link")]
mod link;
/// Wire format of requests and responses.
pub mod protocol;
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
#[cfg(feature = "server")]
mod server;

#[cfg(feature = "link")]
pub use link::{FileServerLink, FileServerOption};
pub use protocol::DEFAULT_PORT;
#[cfg(feature = "server")]
pub use server::FileServer;
