mod worker;

use std::{
    collections::HashMap,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use ppseq_driver::sequence::Sequences;

pub(crate) use worker::spawn;

/// A request to program one queue.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueJob {
    /// Queue to program
    pub queue: String,
    /// Scan points of the queue
    pub sequences: Sequences,
    /// Value of `default_queue_name` to publish after the upload
    pub default_queue_name: Option<String>,
    /// Value of `next_queue_name` to publish after the upload
    pub next_queue_name: Option<String>,
}

impl QueueJob {
    /// Creates a new [`QueueJob`] that publishes no queue names.
    #[must_use]
    pub fn new(queue: impl Into<String>, sequences: Sequences) -> Self {
        Self {
            queue: queue.into(),
            sequences,
            default_queue_name: None,
            next_queue_name: None,
        }
    }

    /// Publishes `default_queue_name` after the upload.
    #[must_use]
    pub fn with_default_queue_name(mut self, name: impl Into<String>) -> Self {
        self.default_queue_name = Some(name.into());
        self
    }

    /// Publishes `next_queue_name` after the upload.
    #[must_use]
    pub fn with_next_queue_name(mut self, name: impl Into<String>) -> Self {
        self.next_queue_name = Some(name.into());
        self
    }
}

pub(crate) enum Command {
    SetQueue(QueueJob),
    Shutdown,
}

/// An event emitted by the uploader.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadEvent {
    /// A packet of `queue` is on the device.
    Progress {
        /// Queue name
        queue: String,
        /// Distinct packets on the device so far
        uploaded: usize,
        /// Distinct packets of the queue
        total: usize,
    },
    /// The queue file of `queue` has been written.
    Published {
        /// Queue name
        queue: String,
        /// Packet ids of the queue file
        ids: Vec<String>,
    },
    /// The upload of `queue` was abandoned for a later request.
    Superseded {
        /// Queue name
        queue: String,
    },
    /// The upload of `queue` failed.
    Failed {
        /// Queue name
        queue: String,
        /// Error message
        error: String,
    },
}

/// The state of a queue as seen by the uploader.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueState {
    /// Waiting for the uploader.
    Pending,
    /// Packets are being uploaded.
    Uploading {
        /// Distinct packets on the device so far
        uploaded: usize,
        /// Distinct packets of the queue
        total: usize,
    },
    /// The queue file has been written with these ids.
    Published(Vec<String>),
    /// The upload failed.
    Failed(String),
}

impl QueueState {
    /// Returns `true` if the uploader is done with the queue.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, QueueState::Published(_) | QueueState::Failed(_))
    }
}

#[derive(Default)]
pub(crate) struct Status {
    states: Mutex<HashMap<String, QueueState>>,
    changed: Condvar,
}

impl Status {
    pub(crate) fn set(&self, queue: &str, state: QueueState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue.to_owned(), state);
        self.changed.notify_all();
    }

    pub(crate) fn get(&self, queue: &str) -> Option<QueueState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .cloned()
    }

    /// Waits until the state of `queue` is finished or unknown. Returns `None` on timeout.
    pub(crate) fn wait_finished(&self, queue: &str, timeout: Duration) -> Option<Option<QueueState>> {
        let deadline = Instant::now() + timeout;
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match states.get(queue) {
                Some(state) if !state.is_finished() => {}
                state => return Some(state.cloned()),
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            states = self
                .changed
                .wait_timeout(states, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}
