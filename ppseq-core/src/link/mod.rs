mod error;

use std::sync::Arc;

pub use error::LinkError;

use crate::defined::COUNTER_FILE_WIDTH;

/// A trait to access the file system of a timing device.
///
/// Packets, queue files, counters and driver variables are all files on the device.
/// Implementations are shared between the composer and the uploader, so every method takes `&self`.
pub trait DeviceLink: Send + Sync {
    /// Writes or replaces the file at `path`.
    fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError>;

    /// Reads the file at `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>, LinkError>;

    /// Deletes the file at `path`.
    fn del(&self, path: &str) -> Result<(), LinkError>;

    /// Checks whether the file at `path` exists.
    fn exists(&self, path: &str) -> Result<bool, LinkError>;

    /// Lists the files matching `pattern`. `*` and `?` match within the file name.
    fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError>;

    /// Returns the size of the file at `path` in bytes.
    fn size(&self, path: &str) -> Result<u64, LinkError>;

    /// Writes several files in one batched transfer.
    fn put_many(&self, files: &[(String, Vec<u8>)]) -> Result<(), LinkError> {
        files.iter().try_for_each(|(path, data)| self.put(path, data))
    }

    /// Returns `false` once the link has given up reaching the device.
    fn is_online(&self) -> bool {
        true
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for Arc<L> {
    fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError> {
        self.as_ref().put(path, data)
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
        self.as_ref().get(path)
    }

    fn del(&self, path: &str) -> Result<(), LinkError> {
        self.as_ref().del(path)
    }

    fn exists(&self, path: &str) -> Result<bool, LinkError> {
        self.as_ref().exists(path)
    }

    fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        self.as_ref().dir(pattern)
    }

    fn size(&self, path: &str) -> Result<u64, LinkError> {
        self.as_ref().size(path)
    }

    fn put_many(&self, files: &[(String, Vec<u8>)]) -> Result<(), LinkError> {
        self.as_ref().put_many(files)
    }

    fn is_online(&self) -> bool {
        self.as_ref().is_online()
    }
}

/// Text helpers on top of [`DeviceLink`].
pub trait DeviceLinkExt: DeviceLink {
    /// Reads a text file and trims surrounding whitespace.
    fn get_text(&self, path: &str) -> Result<String, LinkError> {
        let data = self.get(path)?;
        Ok(String::from_utf8_lossy(&data).trim().to_owned())
    }

    /// Writes a text file.
    fn put_text(&self, path: &str, text: &str) -> Result<(), LinkError> {
        self.put(path, text.as_bytes())
    }

    /// Reads a queue counter file. An empty file reads as zero.
    fn get_counter(&self, path: &str) -> Result<u64, LinkError> {
        decode_counter(&self.get(path)?)
    }

    /// Writes a queue counter file in its fixed-width format.
    fn put_counter(&self, path: &str, value: u64) -> Result<(), LinkError> {
        self.put(path, encode_counter(value).as_bytes())
    }
}

impl<L: DeviceLink + ?Sized> DeviceLinkExt for L {}

/// Formats a queue counter: left aligned and space padded to 19 characters, then a newline.
#[must_use]
pub fn encode_counter(value: u64) -> String {
    format!("{:<width$}\n", value, width = COUNTER_FILE_WIDTH - 1)
}

/// Parses a queue counter file.
pub fn decode_counter(data: &[u8]) -> Result<u64, LinkError> {
    let text = String::from_utf8_lossy(data);
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| LinkError::new(format!("Invalid counter value: {text:?}")))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Mutex};

    use super::*;

    #[derive(Default)]
    struct MemoryLink {
        files: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl DeviceLink for MemoryLink {
        fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_owned(), data.to_vec());
            Ok(())
        }

        fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| LinkError::not_found(path))
        }

        fn del(&self, path: &str) -> Result<(), LinkError> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        fn exists(&self, path: &str) -> Result<bool, LinkError> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        fn dir(&self, _pattern: &str) -> Result<Vec<String>, LinkError> {
            Ok(self.files.lock().unwrap().keys().cloned().collect())
        }

        fn size(&self, path: &str) -> Result<u64, LinkError> {
            Ok(self.get(path)?.len() as u64)
        }
    }

    #[rstest::rstest]
    #[case("0                  \n", 0)]
    #[case("42                 \n", 42)]
    #[case("1234567890123456789\n", 1234567890123456789)]
    #[test]
    fn counter_format(#[case] expect: &str, #[case] value: u64) {
        let encoded = encode_counter(value);
        assert_eq!(COUNTER_FILE_WIDTH, encoded.len());
        assert_eq!(expect, encoded);
    }

    #[rstest::rstest]
    #[case(Ok(0), b"")]
    #[case(Ok(0), b"\n")]
    #[case(Ok(7), b"7                  \n")]
    #[case(Err(LinkError::new("Invalid counter value: \"x\"")), b"x")]
    #[test]
    fn counter_parse(#[case] expect: Result<u64, LinkError>, #[case] data: &[u8]) {
        assert_eq!(expect, decode_counter(data));
    }

    #[test]
    fn ext() -> anyhow::Result<()> {
        let link = Arc::new(MemoryLink::default());
        link.put_text("/a", "queue1\n")?;
        assert_eq!("queue1", link.get_text("/a")?);

        link.put_counter("/b", 3)?;
        assert_eq!(20, link.size("/b")?);
        assert_eq!(3, link.get_counter("/b")?);

        link.put_many(&[("/c".to_owned(), vec![1]), ("/d".to_owned(), vec![2, 3])])?;
        assert!(link.exists("/c")?);
        assert_eq!(2, link.size("/d")?);
        assert!(link.is_online());
        Ok(())
    }
}
