use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};

use derive_more::{Deref, DerefMut};
use serde::{Deserialize, Serialize};

use crate::{device::Device, error::SequencerError};

/// A named set of persistent device parameters: calibration constants and channel configurations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Deref, DerefMut)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, String>);

impl Configuration {
    /// Creates a new [`Configuration`].
    #[must_use]
    pub const fn new(parameters: BTreeMap<String, String>) -> Self {
        Self(parameters)
    }

    /// The parameters of `device`.
    #[must_use]
    pub fn of(device: &Device) -> Self {
        Self(device.parameters())
    }

    /// Writes the parameters that differ on `device`, then reloads its settings.
    ///
    /// Returns the keys that were written.
    pub fn apply(&self, device: &Device) -> Result<Vec<String>, SequencerError> {
        let changed = self
            .0
            .iter()
            .filter(|(key, value)| device.parameter(key).as_ref() != Some(*value))
            .map(|(key, value)| device.set_parameter(key, value).map(|()| key.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        if !changed.is_empty() {
            device.reload();
        }
        Ok(changed)
    }
}

/// A directory of named configurations, one JSON document each.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationStore {
    dir: PathBuf,
}

impl ConfigurationStore {
    /// Creates a new [`ConfigurationStore`].
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, SequencerError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(SequencerError::InvalidConfiguration {
                name: name.to_owned(),
                reason: "not a valid name".to_owned(),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Reads configuration `name`.
    pub fn read(&self, name: &str) -> Result<Configuration, SequencerError> {
        let text = std::fs::read_to_string(self.path(name)?)?;
        serde_json::from_str(&text).map_err(|e| SequencerError::InvalidConfiguration {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Writes configuration `name`, replacing it if it exists.
    pub fn write(&self, name: &str, configuration: &Configuration) -> Result<(), SequencerError> {
        let path = self.path(name)?;
        let text = serde_json::to_string_pretty(configuration).map_err(|e| {
            SequencerError::InvalidConfiguration {
                name: name.to_owned(),
                reason: e.to_string(),
            }
        })?;
        std::fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(text.as_bytes())?;
        file.persist(&path).map_err(|e| SequencerError::from(e.error))?;
        Ok(())
    }

    /// Saves the parameters of `device` as configuration `name`.
    pub fn save(&self, name: &str, device: &Device) -> Result<(), SequencerError> {
        let configuration = Configuration::of(device);
        self.write(name, &configuration)?;
        tracing::info!(
            "{}: {} parameters saved as {}",
            device.name(),
            configuration.len(),
            name
        );
        Ok(())
    }

    /// Loads configuration `name` into `device`, writing only the parameters that differ.
    ///
    /// Returns the keys that were written.
    pub fn load(&self, name: &str, device: &Device) -> Result<Vec<String>, SequencerError> {
        let changed = self.read(name)?.apply(device)?;
        tracing::info!(
            "{}: configuration {} loaded, {} parameters changed",
            device.name(),
            name,
            changed.len()
        );
        Ok(changed)
    }

    /// Names of the stored configurations, sorted.
    pub fn list(&self) -> Result<Vec<String>, SequencerError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = std::fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }
}
