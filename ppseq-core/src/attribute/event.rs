use std::{
    sync::OnceLock,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use derive_more::Deref;

/// The ancestry of an event: the timestamps of the input events it was derived from.
#[derive(Clone, Debug, Default, PartialEq, Deref)]
pub struct Timestamps(Vec<f64>);

impl Timestamps {
    /// Creates a new [`Timestamps`].
    #[must_use]
    pub const fn new(timestamps: Vec<f64>) -> Self {
        Self(timestamps)
    }

    /// Ancestry consisting of a single event at `time`.
    #[must_use]
    pub fn single(time: f64) -> Self {
        Self(vec![time])
    }

    /// The most recent timestamp.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.0.iter().copied().reduce(f64::max)
    }

    /// This ancestry extended by an event at `time`.
    #[must_use]
    pub fn extended(&self, time: f64) -> Self {
        let mut timestamps = self.0.clone();
        timestamps.push(time);
        Self(timestamps)
    }
}

/// A change notification of an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Event<T> {
    /// Time of the change as returned by [`now`] \[s since the Unix epoch\]
    pub time: f64,
    /// The new value
    pub value: T,
    /// The attribute that changed
    pub reference: String,
    /// Ancestry of the change
    pub timestamps: Timestamps,
}

impl<T> Event<T> {
    /// Creates an event at `time` without further ancestry.
    pub fn new(time: f64, value: T, reference: impl Into<String>) -> Self {
        Self {
            time,
            value,
            reference: reference.into(),
            timestamps: Timestamps::single(time),
        }
    }

    /// Replaces the ancestry.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// The current time in seconds since the Unix epoch.
///
/// The wall clock is read once. Later readings advance with the monotonic clock,
/// so a step of the system time never makes a newer event look older.
#[must_use]
pub fn now() -> f64 {
    static EPOCH: OnceLock<(Instant, f64)> = OnceLock::new();
    let (start, wall) = EPOCH.get_or_init(|| {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        (Instant::now(), wall)
    });
    wall + start.elapsed().as_secs_f64()
}
