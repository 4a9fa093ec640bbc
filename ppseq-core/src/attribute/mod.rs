mod event;
mod monitors;
mod storage;

use std::sync::{Mutex, PoisonError};

pub use event::{now, Event, Timestamps};
pub use monitors::{Handler, Monitors};
pub use storage::{FileStorage, LinkStorage, MemoryStorage, Storage, TextFormat};

use thiserror::Error;

use crate::link::LinkError;

/// An error produced by an attribute storage.
#[derive(Error, Debug, PartialEq, Clone)]
#[non_exhaustive]
pub enum AttributeError {
    /// Error in the device link.
    #[error("{0}")]
    Link(#[from] LinkError),
    /// Error in the local file system.
    #[error("{0}")]
    Io(String),
    /// The value cannot be represented by the storage.
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Values an [`Attribute`] can hold.
pub trait AttributeValue: Clone + Default + PartialEq + Send + Sync + 'static {}

impl<T: Clone + Default + PartialEq + Send + Sync + 'static> AttributeValue for T {}

/// A named, observable value with a pluggable backing store.
///
/// Reads go to the storage and fall back to the default value when the storage is unavailable.
/// Writes go to the storage and notify the monitors. [`Attribute::poll`] notifies the monitors of changes made elsewhere.
pub struct Attribute<T> {
    reference: String,
    storage: Box<dyn Storage<T>>,
    monitors: Monitors<T>,
    last: Mutex<Option<T>>,
}

impl<T> std::fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("reference", &self.reference)
            .field("monitors", &self.monitors)
            .finish()
    }
}

impl<T: AttributeValue> Attribute<T> {
    /// Creates a new [`Attribute`].
    pub fn new(reference: impl Into<String>, storage: impl Storage<T> + 'static) -> Self {
        let reference = reference.into();
        Self {
            monitors: Monitors::new(reference.clone()),
            reference,
            storage: Box::new(storage),
            last: Mutex::new(None),
        }
    }

    /// Creates a new [`Attribute`] held in memory.
    pub fn memory(reference: impl Into<String>, value: T) -> Self {
        Self::new(reference, MemoryStorage::new(value))
    }

    /// The name of the attribute.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The current value, or `None` if the storage is unavailable.
    #[must_use]
    pub fn try_value(&self) -> Option<T> {
        self.storage.load()
    }

    /// The current value, or the default value if the storage is unavailable.
    #[must_use]
    pub fn value(&self) -> T {
        self.try_value().unwrap_or_default()
    }

    /// Writes a new value and notifies the monitors.
    pub fn set_value(&self, value: T) -> Result<(), AttributeError> {
        let time = now();
        self.storage.store(&value)?;
        self.monitors.note_write(time);
        self.publish(Event::new(time, value, self.reference.clone()));
        Ok(())
    }

    /// The subscribers of this attribute.
    #[must_use]
    pub const fn monitors(&self) -> &Monitors<T> {
        &self.monitors
    }

    /// Delivers an externally produced event. Returns `false` if it was stale.
    pub fn publish(&self, event: Event<T>) -> bool {
        let value = event.value.clone();
        if !self.monitors.notify(&event) {
            return false;
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        true
    }

    /// Reads the storage and notifies the monitors if the value changed since the last notification.
    pub fn poll(&self) -> Option<T> {
        let value = self.value();
        let changed = self
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            != Some(&value);
        if changed && self.publish(Event::new(now(), value.clone(), self.reference.clone())) {
            Some(value)
        } else {
            None
        }
    }
}
