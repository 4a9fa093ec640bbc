use std::time::Duration;

use ppseq_core::{
    attribute::AttributeError, channel::ChannelError, link::LinkError, register::RegisterError,
};
use ppseq_driver::error::{CompileError, ParseError};
use thiserror::Error;

/// An error produced by the sequencer.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum SequencerError {
    /// Error in the device link.
    #[error("{0}")]
    Link(#[from] LinkError),
    /// Error in the advertised register list.
    #[error("{0}")]
    Register(#[from] RegisterError),
    /// Error in a channel configuration.
    #[error("{0}")]
    Channel(#[from] ChannelError),
    /// Error in a line of the sequence language.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// Error in compiling a scan point.
    #[error("{0}")]
    Compile(#[from] CompileError),
    /// Error in an attribute storage.
    #[error("{0}")]
    Attribute(#[from] AttributeError),
    /// Error in the local packet cache or configuration directory.
    #[error("{0}")]
    Io(String),
    /// A persisted configuration that cannot be read.
    #[error("Invalid configuration {name}: {reason}")]
    InvalidConfiguration {
        /// Configuration name
        name: String,
        /// What is wrong with it
        reason: String,
    },
    /// The device did not reach the expected state in time.
    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout {
        /// What was awaited
        what: String,
        /// The timeout
        timeout: Duration,
    },
    /// Uploading a queue failed.
    #[error("Upload of {queue} failed: {reason}")]
    UploadFailed {
        /// Queue name
        queue: String,
        /// The error of the uploader
        reason: String,
    },
    /// The queue has no scan points.
    #[error("Queue {0} is empty")]
    EmptyQueue(String),
    /// The uploader worker is not running.
    #[error("Uploader of {0} has stopped")]
    WorkerStopped(String),
}

impl From<std::io::Error> for SequencerError {
    fn from(e: std::io::Error) -> Self {
        SequencerError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!("Device is offline", SequencerError::from(LinkError::offline()).to_string());
        assert_eq!(
            "Timed out after 5s waiting for queue_active=1",
            SequencerError::Timeout {
                what: "queue_active=1".to_owned(),
                timeout: Duration::from_secs(5)
            }
            .to_string()
        );
        assert_eq!("Queue queue is empty", SequencerError::EmptyQueue("queue".to_owned()).to_string());
    }
}
