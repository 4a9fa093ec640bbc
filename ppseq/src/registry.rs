use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{error::SequencerError, sequencer::Sequencer};

type Connector = dyn Fn(&str) -> Result<Sequencer, SequencerError> + Send + Sync;

/// Sequencers by domain name, connected on first use.
pub struct DeviceRegistry {
    connector: Box<Connector>,
    devices: Mutex<BTreeMap<String, Arc<Sequencer>>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.names())
            .finish()
    }
}

impl DeviceRegistry {
    /// Creates a new [`DeviceRegistry`]. `connector` opens the sequencer of a domain.
    #[must_use]
    pub fn new(
        connector: impl Fn(&str) -> Result<Sequencer, SequencerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            connector: Box::new(connector),
            devices: Mutex::new(BTreeMap::new()),
        }
    }

    /// The sequencer of `domain`, connecting it if needed.
    ///
    /// A failed connection is not remembered, so the next call tries again.
    pub fn get(&self, domain: &str) -> Result<Arc<Sequencer>, SequencerError> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sequencer) = devices.get(domain) {
            return Ok(sequencer.clone());
        }
        tracing::debug!("Connecting to {}", domain);
        let sequencer = Arc::new((self.connector)(domain)?);
        devices.insert(domain.to_owned(), sequencer.clone());
        Ok(sequencer)
    }

    /// Forgets the sequencer of `domain`. It is dropped once no other handle remains.
    pub fn remove(&self, domain: &str) -> Option<Arc<Sequencer>> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(domain)
    }

    /// The number of connected domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no domain is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The connected domains.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ppseq_core::link::LinkError;

    use super::*;
    use crate::{link::Emulated, option::SequencerOption};

    #[test]
    fn lazy() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = dir.path().to_path_buf();
        let connected = Arc::new(AtomicUsize::new(0));
        let registry = DeviceRegistry::new({
            let connected = connected.clone();
            move |domain| {
                if domain == "offline" {
                    return Err(LinkError::offline().into());
                }
                connected.fetch_add(1, Ordering::Relaxed);
                Sequencer::open(
                    domain,
                    Arc::new(Emulated::default()),
                    SequencerOption {
                        local_cache_dir: cache.clone(),
                        ..Default::default()
                    },
                )
            }
        });
        assert!(registry.is_empty());

        let a = registry.get("BioCARS")?;
        let b = registry.get("BioCARS")?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!("BioCARS", a.device().name());
        registry.get("LaserLab")?;
        assert_eq!(2, connected.load(Ordering::Relaxed));
        assert_eq!(vec!["BioCARS".to_owned(), "LaserLab".to_owned()], registry.names());

        assert_eq!(
            SequencerError::from(LinkError::offline()),
            registry.get("offline").unwrap_err()
        );
        assert_eq!(2, registry.len());

        assert!(registry.remove("BioCARS").is_some());
        assert_eq!(1, registry.len());
        let c = registry.get("BioCARS")?;
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(3, connected.load(Ordering::Relaxed));
        Ok(())
    }
}
