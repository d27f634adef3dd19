//! Fixture file writer

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bytemuck::bytes_of;
use crc32fast::Hasher;
use memmap2::MmapMut;
use tracing::debug;

use super::format::{
    FileHeader, InteractionEntry, HEADER_CRC_RANGE, HEADER_SIZE, INDEX_ENTRY_SIZE,
    MAX_INTERACTIONS,
};
use crate::{Result, TapedeckError};

/// Extra room added whenever the data section has to grow
const GROWTH_BYTES: u64 = 64 * 1024;

/// Writer for fixture files
///
/// Writes into a temporary sibling of the target path; [`finalize`]
/// renames it into place. A writer dropped before finalizing removes its
/// temporary file and leaves any existing fixture untouched.
///
/// [`finalize`]: FixtureWriter::finalize
pub struct FixtureWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    header: FileHeader,
    capacity: u64,
    index_offset: usize,
    finished: bool,
}

impl FixtureWriter {
    /// Create a new fixture file with room for `capacity` interactions
    ///
    /// # Errors
    ///
    /// Returns error if capacity is too large or the file cannot be created or mapped
    pub fn create(path: &Path, fixture_id: [u8; 32], capacity: usize) -> Result<Self> {
        let capacity = capacity as u64;
        if capacity > MAX_INTERACTIONS {
            return Err(TapedeckError::InvalidFormat(format!(
                "Fixture capacity {capacity} exceeds {MAX_INTERACTIONS}"
            )));
        }

        let tmp_path = tmp_path_for(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        // Header + index, data section grows on demand
        let data_offset = HEADER_SIZE as u64 + INDEX_ENTRY_SIZE as u64 * capacity;
        file.set_len(data_offset)?;

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut header = FileHeader::default();
        header.fixture_id = fixture_id;
        header.data_offset = data_offset;
        header.created_at = super::now_nanos();

        mmap[..HEADER_SIZE].copy_from_slice(bytes_of(&header));

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            file,
            mmap: Some(mmap),
            header,
            capacity,
            index_offset: HEADER_SIZE,
            finished: false,
        })
    }

    /// Number of interactions appended so far
    #[must_use]
    pub fn interaction_count(&self) -> u64 {
        self.header.interaction_count
    }

    /// Append an interaction to the fixture
    ///
    /// # Errors
    ///
    /// Returns error if write fails or the index is full
    pub fn append_interaction(
        &mut self,
        request_hash: [u8; 32],
        request_data: &[u8],
        response_data: &[u8],
        recorded_at: u64,
    ) -> Result<()> {
        if self.header.interaction_count >= self.capacity {
            return Err(TapedeckError::InvalidFormat(format!(
                "Fixture full: capacity {} reached",
                self.capacity
            )));
        }

        let request_size = u32::try_from(request_data.len()).map_err(|_| {
            TapedeckError::DataTooLarge {
                size: request_data.len(),
                limit: u32::MAX as usize,
            }
        })?;
        let response_size = u32::try_from(response_data.len()).map_err(|_| {
            TapedeckError::DataTooLarge {
                size: response_data.len(),
                limit: u32::MAX as usize,
            }
        })?;

        let data_end = self.header.file_size();
        let needed_size = data_end + u64::from(request_size) + u64::from(response_size);
        if needed_size > self.file.metadata()?.len() {
            // Unmap before resizing, then remap the larger file
            self.mmap = None;
            self.file.set_len(needed_size + GROWTH_BYTES)?;
            self.mmap = Some(unsafe { MmapMut::map_mut(&self.file)? });
        }

        let entry = InteractionEntry {
            request_hash,
            request_offset: data_end,
            response_offset: data_end + u64::from(request_size),
            recorded_at,
            request_size,
            response_size,
            request_crc: crc32fast::hash(request_data),
            response_crc: crc32fast::hash(response_data),
            reserved: [0; 32],
            reserved_tail: [0; 24],
        };

        let entry_offset = self.index_offset;
        let mmap = self.mapped()?;

        mmap[entry_offset..entry_offset + INDEX_ENTRY_SIZE].copy_from_slice(bytes_of(&entry));

        let request_offset = entry.request_offset as usize;
        mmap[request_offset..request_offset + request_data.len()].copy_from_slice(request_data);

        let response_offset = entry.response_offset as usize;
        mmap[response_offset..response_offset + response_data.len()]
            .copy_from_slice(response_data);

        self.header.interaction_count += 1;
        self.header.data_size += u64::from(request_size) + u64::from(response_size);
        self.index_offset += INDEX_ENTRY_SIZE;

        Ok(())
    }

    /// Finalize the fixture file and move it into place
    ///
    /// # Errors
    ///
    /// Returns error if flush, truncate or rename fails
    pub fn finalize(mut self) -> Result<()> {
        // Unused index slots are dropped by moving the data section down
        let used_index =
            HEADER_SIZE as u64 + INDEX_ENTRY_SIZE as u64 * self.header.interaction_count;
        if used_index < self.header.data_offset {
            let shift = self.header.data_offset - used_index;
            self.compact(shift)?;
        }

        self.header.header_crc = 0;
        let mut header_bytes = bytes_of(&self.header).to_vec();
        let mut hasher = Hasher::new();
        hasher.update(&header_bytes[..HEADER_CRC_RANGE.start]);
        hasher.update(&header_bytes[HEADER_CRC_RANGE.end..]);
        self.header.header_crc = hasher.finalize();
        header_bytes.copy_from_slice(bytes_of(&self.header));

        let mmap = self.mapped()?;
        mmap[..HEADER_SIZE].copy_from_slice(&header_bytes);
        mmap.flush()?;
        self.mmap = None;

        self.file.set_len(self.header.file_size())?;
        self.file.sync_all()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;

        debug!(
            "Finalized fixture {} ({} interactions, {} bytes)",
            self.path.display(),
            self.header.interaction_count,
            self.header.file_size()
        );

        Ok(())
    }

    /// Move the data section `shift` bytes towards the index
    fn compact(&mut self, shift: u64) -> Result<()> {
        let data_offset = self.header.data_offset as usize;
        let data_end = self.header.file_size() as usize;
        let shift_bytes = shift as usize;
        let count = self.header.interaction_count as usize;

        let mmap = self.mapped()?;
        mmap.copy_within(data_offset..data_end, data_offset - shift_bytes);

        for i in 0..count {
            let offset = HEADER_SIZE + i * INDEX_ENTRY_SIZE;
            let mut entry: InteractionEntry =
                bytemuck::pod_read_unaligned(&mmap[offset..offset + INDEX_ENTRY_SIZE]);
            entry.request_offset -= shift;
            entry.response_offset -= shift;
            mmap[offset..offset + INDEX_ENTRY_SIZE].copy_from_slice(bytes_of(&entry));
        }

        self.header.data_offset -= shift;
        Ok(())
    }

    fn mapped(&mut self) -> Result<&mut MmapMut> {
        self.mmap
            .as_mut()
            .ok_or_else(|| TapedeckError::InvalidFormat("Fixture writer is not mapped".to_string()))
    }
}

impl Drop for FixtureWriter {
    fn drop(&mut self) {
        if !self.finished {
            self.mmap = None;
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

/// Temporary sibling used while a fixture is being written
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TestCreate.tape");
        let fixture_id = [0u8; 32];

        let writer = FixtureWriter::create(&path, fixture_id, 4).unwrap();
        assert_eq!(writer.header.fixture_id, fixture_id);
        assert_eq!(writer.interaction_count(), 0);
        assert!(writer.tmp_path.exists());
        assert!(!path.exists(), "Target appears only after finalize");
    }

    #[test]
    fn test_append_interaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TestAppend.tape");

        let mut writer = FixtureWriter::create(&path, [1u8; 32], 1).unwrap();
        writer
            .append_interaction([2u8; 32], b"request", b"response", 7)
            .unwrap();
        assert_eq!(writer.interaction_count(), 1);

        let full = writer.append_interaction([3u8; 32], b"request", b"response", 8);
        assert!(full.is_err(), "Capacity must be enforced");
    }

    #[test]
    fn test_finalize_renames_into_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TestFinalize.tape");

        let mut writer = FixtureWriter::create(&path, [3u8; 32], 1).unwrap();
        writer
            .append_interaction([4u8; 32], b"request", b"response", 0)
            .unwrap();
        let tmp = writer.tmp_path.clone();
        writer.finalize().unwrap();

        assert!(path.exists());
        assert!(!tmp.exists());
        let expected = (HEADER_SIZE + INDEX_ENTRY_SIZE) as u64 + 15;
        assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
    }

    #[test]
    fn test_drop_without_finalize_keeps_existing_fixture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TestKeep.tape");
        std::fs::write(&path, b"committed").unwrap();

        {
            let mut writer = FixtureWriter::create(&path, [5u8; 32], 1).unwrap();
            writer
                .append_interaction([6u8; 32], b"request", b"response", 0)
                .unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), b"committed");
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn test_tmp_path() {
        let path = Path::new("/fixtures/TestFoo.tape");
        assert_eq!(tmp_path_for(path), PathBuf::from("/fixtures/TestFoo.tape.tmp"));
    }
}
