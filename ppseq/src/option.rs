use std::{path::PathBuf, time::Duration};

use ppseq_core::defined::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, LOCAL_CACHE_DIR, SEQUENCE_DIR,
};

/// Settings of a [`Device`](crate::Device) and its [`Sequencer`](crate::Sequencer).
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerOption {
    /// Directory of the local packet cache.
    pub local_cache_dir: PathBuf,
    /// Directory of queue files, packets and parameters on the device.
    pub sequence_dir: String,
    /// Directory of persisted configurations.
    pub config_dir: PathBuf,
    /// Upper bound of every wait for the device or the uploader.
    pub timeout: Duration,
    /// Interval between polls of the device while waiting.
    pub poll_interval: Duration,
    /// Number of uploader events kept until read. The oldest event is discarded when full.
    pub event_capacity: usize,
}

impl Default for SequencerOption {
    fn default() -> Self {
        Self {
            local_cache_dir: PathBuf::from(LOCAL_CACHE_DIR),
            sequence_dir: SEQUENCE_DIR.to_owned(),
            config_dir: std::env::temp_dir().join("sequencer").join("configurations"),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
