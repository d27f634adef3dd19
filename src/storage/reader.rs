//! Fixture file reader

use std::fs::File;
use std::path::Path;

use bytemuck::pod_read_unaligned;
use crc32fast::Hasher;
use memmap2::Mmap;

use super::format::{FileHeader, InteractionEntry, HEADER_CRC_RANGE, HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::{Result, TapedeckError};

/// Reader for fixture files
pub struct FixtureReader {
    _file: File,
    mmap: Mmap,
    header: FileHeader,
}

impl FixtureReader {
    /// Open an existing fixture file
    ///
    /// # Errors
    ///
    /// Returns error if file is missing, cannot be mapped, or is invalid
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TapedeckError::FixtureNotFound(path.to_path_buf())
            } else {
                TapedeckError::Io(e)
            }
        })?;

        if file.metadata()?.len() < HEADER_SIZE as u64 {
            return Err(TapedeckError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        let mmap = unsafe { Mmap::map(&file)? };

        let header: FileHeader = pod_read_unaligned(&mmap[..HEADER_SIZE]);
        super::validate_header(&header)?;

        // Verify header CRC (exclude CRC field)
        let mut hasher = Hasher::new();
        hasher.update(&mmap[..HEADER_CRC_RANGE.start]);
        hasher.update(&mmap[HEADER_CRC_RANGE.end..HEADER_SIZE]);
        let computed_crc = hasher.finalize();

        if header.header_crc != computed_crc {
            return Err(TapedeckError::CorruptedData {
                offset: 0,
                expected: header.header_crc,
                actual: computed_crc,
            });
        }

        let index_end = header
            .interaction_count
            .checked_mul(INDEX_ENTRY_SIZE as u64)
            .and_then(|size| size.checked_add(header.index_offset));
        let file_size = mmap.len() as u64;
        match index_end {
            Some(end) if end <= header.data_offset && header.file_size() <= file_size => {}
            _ => {
                return Err(TapedeckError::InvalidFormat(format!(
                    "Sections exceed file size {file_size}"
                )))
            }
        }

        Ok(Self {
            _file: file,
            mmap,
            header,
        })
    }

    /// Get the number of interactions in this fixture
    #[must_use]
    pub fn interaction_count(&self) -> u64 {
        self.header.interaction_count
    }

    /// Get the fixture ID
    #[must_use]
    pub fn fixture_id(&self) -> [u8; 32] {
        self.header.fixture_id
    }

    /// Get the creation timestamp (Unix epoch nanoseconds)
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.header.created_at
    }

    /// Total size of the fixture in bytes
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.header.file_size()
    }

    /// Read the index entry at `index`
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<InteractionEntry> {
        if index as u64 >= self.header.interaction_count {
            return None;
        }
        let offset = self.header.index_offset as usize + index * INDEX_ENTRY_SIZE;
        Some(pod_read_unaligned(
            &self.mmap[offset..offset + INDEX_ENTRY_SIZE],
        ))
    }

    /// Iterate index entries in recording order
    pub fn entries_iter(&self) -> impl Iterator<Item = InteractionEntry> + '_ {
        (0..self.header.interaction_count as usize).filter_map(|i| self.entry(i))
    }

    /// Lookup the first interaction with a request fingerprint
    #[must_use]
    pub fn lookup(&self, request_hash: [u8; 32]) -> Option<InteractionEntry> {
        self.entries_iter()
            .find(|entry| entry.request_hash == request_hash)
    }

    /// Read request data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if the range is invalid or the CRC does not match
    pub fn read_request(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.read_block(entry.request_offset, entry.request_size, entry.request_crc)
    }

    /// Read response data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if the range is invalid or the CRC does not match
    pub fn read_response(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.read_block(entry.response_offset, entry.response_size, entry.response_crc)
    }

    fn read_block(&self, offset: u64, size: u32, crc: u32) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start + size as usize;

        if start < self.header.data_offset as usize || end > self.mmap.len() {
            return Err(TapedeckError::InvalidFormat(format!(
                "Block {start}..{end} outside data section"
            )));
        }

        let data = &self.mmap[start..end];
        let actual = crc32fast::hash(data);
        if actual != crc {
            return Err(TapedeckError::CorruptedData {
                offset,
                expected: crc,
                actual,
            });
        }

        Ok(data)
    }
}
