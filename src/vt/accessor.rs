//! Page data sources for the streamer.
//!
//! A page store is a flat directory of raw pixel buffers, one file per page,
//! named by the decimal rendering of the page key. No header, no
//! compression: the accessor trusts that a well-formed page file is exactly
//! the configured page byte size, and treats anything else as a load
//! failure.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GraphicsError;

use super::page::PageKey;

/// Reads page pixel data by key.
///
/// Implementations run on the streamer thread; a failed read returns `None`
/// and the page is retried on the next feedback request.
pub trait PageAccessor: Send {
    /// Read the full pixel buffer of a page, or `None` on failure.
    fn read_page(&self, key: PageKey) -> Option<Vec<u8>>;

    /// The exact byte size of a well-formed page.
    fn page_byte_size(&self) -> usize;
}

/// Page accessor over a page store directory.
#[derive(Debug)]
pub struct FilePageAccessor {
    directory: PathBuf,
    page_byte_size: usize,
}

impl FilePageAccessor {
    /// Create an accessor over a store directory.
    pub fn new(directory: impl Into<PathBuf>, page_byte_size: usize) -> Self {
        Self {
            directory: directory.into(),
            page_byte_size,
        }
    }

    /// The store directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn page_path(&self, key: PageKey) -> PathBuf {
        self.directory.join(key.file_name())
    }
}

impl PageAccessor for FilePageAccessor {
    fn read_page(&self, key: PageKey) -> Option<Vec<u8>> {
        let path = self.page_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("failed to read {key} from {}: {e}", path.display());
                return None;
            }
        };
        if data.len() != self.page_byte_size {
            log::warn!(
                "{key} at {} is {} bytes, expected {}",
                path.display(),
                data.len(),
                self.page_byte_size
            );
            return None;
        }
        Some(data)
    }

    fn page_byte_size(&self) -> usize {
        self.page_byte_size
    }
}

/// Write a page file into a store directory, creating it if needed.
///
/// The counterpart of [`FilePageAccessor`], used by offline page baking and
/// tests.
///
/// # Errors
///
/// Returns an error if `data` is not `page_byte_size` bytes or the write
/// fails.
pub fn write_page_file(
    directory: impl AsRef<Path>,
    key: PageKey,
    data: &[u8],
    page_byte_size: usize,
) -> Result<(), GraphicsError> {
    if data.len() != page_byte_size {
        return Err(GraphicsError::InvalidParameter(format!(
            "page data is {} bytes, expected {page_byte_size}",
            data.len()
        )));
    }
    let directory = directory.as_ref();
    fs::create_dir_all(directory).map_err(|e| {
        GraphicsError::Internal(format!(
            "failed to create page store {}: {e}",
            directory.display()
        ))
    })?;
    let path = directory.join(key.file_name());
    fs::write(&path, data).map_err(|e| {
        GraphicsError::Internal(format!("failed to write {}: {e}", path.display()))
    })
}

/// In-memory page accessor for tests and procedural sources.
#[derive(Debug, Default)]
pub struct InMemoryPageAccessor {
    pages: HashMap<PageKey, Vec<u8>>,
    page_byte_size: usize,
}

impl InMemoryPageAccessor {
    /// Create an empty accessor.
    pub fn new(page_byte_size: usize) -> Self {
        Self {
            pages: HashMap::new(),
            page_byte_size,
        }
    }

    /// Insert a page.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not the configured page byte size.
    pub fn insert(&mut self, key: PageKey, data: Vec<u8>) {
        assert_eq!(
            data.len(),
            self.page_byte_size,
            "page data must be {} bytes",
            self.page_byte_size
        );
        self.pages.insert(key, data);
    }

    /// Number of stored pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if no pages are stored.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageAccessor for InMemoryPageAccessor {
    fn read_page(&self, key: PageKey) -> Option<Vec<u8>> {
        self.pages.get(&key).cloned()
    }

    fn page_byte_size(&self) -> usize {
        self.page_byte_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_BYTES: usize = 16;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let key = PageKey::new(1, 0, 2, 3);
        let data = vec![0xAB; PAGE_BYTES];

        write_page_file(dir.path(), key, &data, PAGE_BYTES).unwrap();

        let accessor = FilePageAccessor::new(dir.path(), PAGE_BYTES);
        assert_eq!(accessor.read_page(key), Some(data));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let accessor = FilePageAccessor::new(dir.path(), PAGE_BYTES);
        assert_eq!(accessor.read_page(PageKey::new(0, 0, 0, 0)), None);
    }

    #[test]
    fn test_size_mismatch_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let key = PageKey::new(0, 0, 0, 0);
        std::fs::write(dir.path().join(key.file_name()), [0u8; PAGE_BYTES / 2]).unwrap();

        let accessor = FilePageAccessor::new(dir.path(), PAGE_BYTES);
        assert_eq!(accessor.read_page(key), None);
    }

    #[test]
    fn test_write_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_page_file(dir.path(), PageKey::new(0, 0, 0, 0), &[0u8; 3], PAGE_BYTES);
        assert!(result.is_err());
    }

    #[test]
    fn test_in_memory_accessor() {
        let mut accessor = InMemoryPageAccessor::new(PAGE_BYTES);
        let key = PageKey::new(0, 1, 0, 0);
        accessor.insert(key, vec![7; PAGE_BYTES]);

        assert_eq!(accessor.read_page(key), Some(vec![7; PAGE_BYTES]));
        assert_eq!(accessor.read_page(PageKey::new(0, 2, 0, 0)), None);
    }
}
