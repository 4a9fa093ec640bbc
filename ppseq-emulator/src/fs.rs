use std::collections::BTreeMap;

use glob::Pattern;
use ppseq_driver::core::link::LinkError;

/// A flat in-memory file system keyed by absolute path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileSystem {
    files: BTreeMap<String, Vec<u8>>,
}

fn split(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

impl FileSystem {
    /// Creates an empty file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes or replaces a file.
    pub fn put(&mut self, path: &str, data: &[u8]) {
        self.files.insert(path.to_owned(), data.to_vec());
    }

    /// Reads a file.
    pub fn get(&self, path: &str) -> Result<&[u8], LinkError> {
        self.files
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| LinkError::not_found(path))
    }

    /// Deletes a file. Deleting a missing file is an error.
    pub fn del(&mut self, path: &str) -> Result<(), LinkError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| LinkError::not_found(path))
    }

    /// Checks whether a file exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Lists the files in the directory of `pattern` whose name matches its last component.
    pub fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        let (dir, name) = split(pattern);
        let name = Pattern::new(name)
            .map_err(|e| LinkError::new(format!("Invalid pattern {pattern}: {e}")))?;
        Ok(self
            .files
            .keys()
            .filter(|path| {
                let (d, n) = split(path);
                d == dir && name.matches(n)
            })
            .cloned()
            .collect())
    }

    /// The number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if there are no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
