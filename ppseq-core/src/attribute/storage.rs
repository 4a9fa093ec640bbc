use std::{
    fmt::Display,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use super::AttributeError;
use crate::link::{encode_counter, DeviceLink};

/// A backing store of an [`Attribute`](super::Attribute).
pub trait Storage<T>: Send + Sync {
    /// Reads the stored value. `None` means the value is unavailable and the attribute reads as its default.
    fn load(&self) -> Option<T>;

    /// Stores a new value.
    fn store(&self, value: &T) -> Result<(), AttributeError>;
}

/// A storage in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage<T> {
    value: Mutex<T>,
}

impl<T> MemoryStorage<T> {
    /// Creates a new [`MemoryStorage`] holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

impl<T: Clone + Send> Storage<T> for MemoryStorage<T> {
    fn load(&self) -> Option<T> {
        Some(
            self.value
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }

    fn store(&self, value: &T) -> Result<(), AttributeError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();
        Ok(())
    }
}

/// A storage in a local text file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Creates a new [`FileStorage`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<T: FromStr + Display> Storage<T> for FileStorage {
    fn load(&self) -> Option<T> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }

    fn store(&self, value: &T) -> Result<(), AttributeError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| AttributeError::Io(e.to_string()))?;
        }
        std::fs::write(&self.path, value.to_string()).map_err(|e| AttributeError::Io(e.to_string()))
    }
}

/// How a value is written to a device file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TextFormat {
    /// The plain text form of the value.
    #[default]
    Plain,
    /// The fixed-width form of queue counters.
    Counter,
}

/// A storage in a text file on the device, such as a driver variable or a persistent parameter.
#[derive(Clone)]
pub struct LinkStorage {
    link: Arc<dyn DeviceLink>,
    path: String,
    format: TextFormat,
}

impl LinkStorage {
    /// Creates a new [`LinkStorage`].
    pub fn new(link: Arc<dyn DeviceLink>, path: impl Into<String>, format: TextFormat) -> Self {
        Self {
            link,
            path: path.into(),
            format,
        }
    }
}

impl<T: FromStr + Display> Storage<T> for LinkStorage {
    fn load(&self) -> Option<T> {
        let data = self.link.get(&self.path).ok()?;
        let text = String::from_utf8_lossy(&data);
        let text = text.trim();
        match (self.format, text.is_empty()) {
            (TextFormat::Counter, true) => "0".parse().ok(),
            _ => text.parse().ok(),
        }
    }

    fn store(&self, value: &T) -> Result<(), AttributeError> {
        let text = match self.format {
            TextFormat::Plain => value.to_string(),
            TextFormat::Counter => match value.to_string().parse::<u64>() {
                Ok(v) => encode_counter(v),
                Err(_) => return Err(AttributeError::Invalid(value.to_string())),
            },
        };
        Ok(self.link.put(&self.path, text.as_bytes())?)
    }
}
