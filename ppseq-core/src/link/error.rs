use derive_more::Display;
use derive_new::new;
use thiserror::Error;

#[derive(new, Error, Debug, Display, PartialEq, Clone)]
#[display("{}", msg)]
/// An error produced by the link.
pub struct LinkError {
    #[new(into)]
    msg: String,
}

impl LinkError {
    /// Creates a new [`LinkError`] for a closed link.
    #[must_use]
    pub fn closed() -> Self {
        Self::new("Link is closed")
    }

    /// Creates a new [`LinkError`] for a device that has been marked offline.
    #[must_use]
    pub fn offline() -> Self {
        Self::new("Device is offline")
    }

    /// Creates a new [`LinkError`] for a missing file.
    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(format!("No such file: {path}"))
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::new(err.to_string())
    }
}
