use std::{
    io::Write,
    path::{Path, PathBuf},
};

use ppseq_core::{
    defined::{LOCAL_CACHE_DIR, MAX_FILENAME_LEN},
    link::DeviceLink,
};
use ppseq_driver::{
    compiler::{Compiler, Descriptor},
    sequence::Sequence,
};

use crate::error::SequencerError;

/// The two-level store of packets, keyed by packet id.
///
/// Packets live in a local cache directory and in the sequence directory of the device.
/// Both levels are write-once, so concurrent writers of the same id are harmless.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketCache {
    local_dir: PathBuf,
    sequence_dir: String,
}

impl PacketCache {
    /// Creates a new [`PacketCache`].
    #[must_use]
    pub fn new(local_dir: impl Into<PathBuf>, sequence_dir: impl Into<String>) -> Self {
        Self {
            local_dir: local_dir.into(),
            sequence_dir: sequence_dir.into(),
        }
    }

    /// Directory of the local cache.
    #[must_use]
    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Local path of packet `id`.
    /// A path longer than the file name limit falls back to the bare id in the default cache directory.
    #[must_use]
    pub fn local_path(&self, id: &str) -> PathBuf {
        let path = self.local_dir.join(id);
        if path.as_os_str().len() > MAX_FILENAME_LEN {
            let fallback = Path::new(LOCAL_CACHE_DIR).join(id);
            tracing::warn!(
                "Cache path {} is too long, using {}",
                path.display(),
                fallback.display()
            );
            return fallback;
        }
        path
    }

    /// Device path of packet `id`. A path longer than the file name limit falls back to the bare id.
    #[must_use]
    pub fn remote_path(&self, id: &str) -> String {
        let path = format!("{}/{}", self.sequence_dir, id);
        if path.len() > MAX_FILENAME_LEN {
            tracing::warn!("Packet path {} is too long, using {}", path, id);
            return id.to_owned();
        }
        path
    }

    /// Reads packet `id` from the local cache.
    #[must_use]
    pub fn load_local(&self, id: &str) -> Option<Vec<u8>> {
        std::fs::read(self.local_path(id)).ok()
    }

    /// Checks whether packet `id` is in the local cache.
    #[must_use]
    pub fn is_local(&self, id: &str) -> bool {
        self.local_path(id).is_file()
    }

    /// Writes packet `id` to the local cache.
    ///
    /// The packet is written to a temporary file that is then renamed, so readers never see a partial packet.
    pub fn store_local(&self, id: &str, data: &[u8]) -> Result<(), SequencerError> {
        let path = self.local_path(id);
        let dir = path.parent().unwrap_or(&self.local_dir);
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.persist(&path).map_err(|e| SequencerError::from(e.error))?;
        Ok(())
    }

    /// Returns the packet of `seq`, looking in the local cache, then on the device, and compiling it last.
    ///
    /// A packet found on the device is copied into the local cache.
    /// A compiled packet is stored in both levels.
    pub fn packet(
        &self,
        link: &dyn DeviceLink,
        compiler: &Compiler<'_>,
        seq: Sequence<'_>,
    ) -> Result<(Descriptor, Vec<u8>), SequencerError> {
        let descriptor = compiler.describe(seq);
        if let Some(data) = self.load_local(&descriptor.id) {
            tracing::debug!("Packet {} found in the local cache", descriptor.id);
            return Ok((descriptor, data));
        }
        if let Ok(data) = link.get(&self.remote_path(&descriptor.id)) {
            tracing::debug!("Packet {} found on the device", descriptor.id);
            self.store_local(&descriptor.id, &data)?;
            return Ok((descriptor, data));
        }
        self.generate(link, compiler, seq)
    }

    /// Compiles the packet of `seq` and stores it in both levels.
    pub fn generate(
        &self,
        link: &dyn DeviceLink,
        compiler: &Compiler<'_>,
        seq: Sequence<'_>,
    ) -> Result<(Descriptor, Vec<u8>), SequencerError> {
        let (descriptor, data) = compiler.encode(seq)?;
        self.store_local(&descriptor.id, &data)?;
        link.put(&self.remote_path(&descriptor.id), &data)?;
        tracing::trace!("Packet {} generated ({} bytes)", descriptor.id, data.len());
        Ok((descriptor, data))
    }
}

#[cfg(test)]
mod tests {
    use ppseq_core::{calibration::Calibration, channel::ChannelTable, link::DeviceLinkExt};
    use ppseq_driver::sequence::Sequences;

    use super::*;
    use crate::link::Emulated;

    #[test]
    fn paths() {
        let cache = PacketCache::new("/tmp/sequencer/cache", "/tmp/sequencer_fs");
        assert_eq!(
            PathBuf::from("/tmp/sequencer/cache/0123"),
            cache.local_path("0123")
        );
        assert_eq!("/tmp/sequencer_fs/0123", cache.remote_path("0123"));

        let long = "d".repeat(MAX_FILENAME_LEN);
        let cache = PacketCache::new(format!("/{long}"), format!("/{long}"));
        assert_eq!(
            PathBuf::from("/tmp/sequencer/cache/0123"),
            cache.local_path("0123")
        );
        assert!(cache.local_path("0123").is_absolute());
        assert_eq!("0123", cache.remote_path("0123"));
    }

    #[test]
    fn local() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PacketCache::new(dir.path().join("cache"), "/tmp/sequencer_fs");
        assert!(!cache.is_local("a"));
        assert_eq!(None, cache.load_local("a"));

        cache.store_local("a", b"packet")?;
        assert!(cache.is_local("a"));
        assert_eq!(Some(b"packet".to_vec()), cache.load_local("a"));
        cache.store_local("a", b"packet")?;
        assert_eq!(1, std::fs::read_dir(dir.path().join("cache"))?.count());
        Ok(())
    }

    #[test]
    fn levels() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = PacketCache::new(dir.path(), "/tmp/sequencer_fs");
        let link = Emulated::default();
        let calibration = Calibration::default();
        let channels = ChannelTable::default();
        let registers = link.emulator().registers().clone();
        let compiler = Compiler::new(&calibration, &channels, &registers);
        let sequences = Sequences::try_parse("delay=[1ms, 2ms]")?;
        let first = sequences.get(0).unwrap();

        let (descriptor, data) = cache.packet(&link, &compiler, first)?;
        assert_eq!(Some(data.clone()), cache.load_local(&descriptor.id));
        assert_eq!(data, link.get(&cache.remote_path(&descriptor.id))?);

        std::fs::remove_file(cache.local_path(&descriptor.id))?;
        link.put_text(&cache.remote_path(&descriptor.id), "remote")?;
        let (_, data) = cache.packet(&link, &compiler, first)?;
        assert_eq!(b"remote".to_vec(), data);
        assert_eq!(Some(b"remote".to_vec()), cache.load_local(&descriptor.id));

        link.put_text(&cache.remote_path(&descriptor.id), "changed")?;
        let (_, data) = cache.packet(&link, &compiler, first)?;
        assert_eq!(b"remote".to_vec(), data);
        Ok(())
    }
}
