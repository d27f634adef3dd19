//! Binary format structures

use bytemuck::{Pod, Zeroable};

/// File magic bytes: "TAPE\x00\x01\x00\x00"
pub const FILE_MAGIC: [u8; 8] = [0x54, 0x41, 0x50, 0x45, 0x00, 0x01, 0x00, 0x00];

/// Current format version
pub const FILE_VERSION: u32 = 1;

/// File header size (cache-aligned to 128 bytes)
pub const HEADER_SIZE: usize = 128;

/// Index entry size (cache-aligned to 128 bytes)
pub const INDEX_ENTRY_SIZE: usize = 128;

/// Maximum interactions in one fixture
pub const MAX_INTERACTIONS: u64 = 65_536;

/// Byte range of the CRC field inside the header
pub const HEADER_CRC_RANGE: std::ops::Range<usize> = 12..16;

/// File header (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct FileHeader {
    /// Magic bytes for file format identification
    pub magic: [u8; 8],

    /// Format version
    pub version: u32,

    /// CRC32 of header (excluding this field)
    pub header_crc: u32,

    /// Fixture ID (SHA-256 of the test identity)
    pub fixture_id: [u8; 32],

    /// Number of interactions stored
    pub interaction_count: u64,

    /// Offset to start of index section
    pub index_offset: u64,

    /// Offset to start of data section
    pub data_offset: u64,

    /// Size of the data section in bytes
    pub data_size: u64,

    /// Creation timestamp (Unix epoch nanoseconds)
    pub created_at: u64,

    /// Reserved for future use
    pub reserved: [u8; 32],

    /// Reserved for future use
    pub reserved_tail: [u8; 8],
}

static_assertions::const_assert_eq!(std::mem::size_of::<FileHeader>(), HEADER_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<FileHeader>(), 128);

/// Index entry for a single interaction (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct InteractionEntry {
    /// Request fingerprint (SHA-256)
    pub request_hash: [u8; 32],

    /// Offset to request data
    pub request_offset: u64,

    /// Offset to response data
    pub response_offset: u64,

    /// Recording timestamp (Unix epoch nanoseconds)
    pub recorded_at: u64,

    /// Request data size
    pub request_size: u32,

    /// Response data size
    pub response_size: u32,

    /// CRC32 of request data
    pub request_crc: u32,

    /// CRC32 of response data
    pub response_crc: u32,

    /// Reserved for future use
    pub reserved: [u8; 32],

    /// Reserved for future use
    pub reserved_tail: [u8; 24],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InteractionEntry>(), INDEX_ENTRY_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<InteractionEntry>(), 128);

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            header_crc: 0,
            fixture_id: [0; 32],
            interaction_count: 0,
            index_offset: HEADER_SIZE as u64,
            data_offset: HEADER_SIZE as u64,
            data_size: 0,
            created_at: 0,
            reserved: [0; 32],
            reserved_tail: [0; 8],
        }
    }
}

impl FileHeader {
    /// Total file size described by this header
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.data_offset + self.data_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 128);
        assert_eq!(std::mem::align_of::<FileHeader>(), 128);
    }

    #[test]
    fn test_index_entry_size() {
        assert_eq!(std::mem::size_of::<InteractionEntry>(), 128);
        assert_eq!(std::mem::align_of::<InteractionEntry>(), 128);
    }

    #[test]
    fn test_default_header() {
        let header = FileHeader::default();
        assert_eq!(header.magic, FILE_MAGIC);
        assert_eq!(&header.magic[..4], b"TAPE");
        assert_eq!(header.version, FILE_VERSION);
        assert_eq!(header.interaction_count, 0);
        assert_eq!(header.file_size(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_entry_pod_roundtrip() {
        let entry = InteractionEntry {
            request_hash: [7; 32],
            request_offset: 256,
            response_offset: 300,
            recorded_at: 42,
            request_size: 44,
            response_size: 12,
            request_crc: 1,
            response_crc: 2,
            reserved: [0; 32],
            reserved_tail: [0; 24],
        };

        let bytes = bytemuck::bytes_of(&entry);
        assert_eq!(bytes.len(), INDEX_ENTRY_SIZE);
        assert!(bytes[72..].iter().all(|b| *b == 0));

        let decoded: InteractionEntry = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(decoded.request_hash, [7; 32]);
        assert_eq!(decoded.response_offset, 300);
        assert_eq!(decoded.response_crc, 2);
    }

    #[test]
    fn test_header_reserved_zeroed() {
        let header = FileHeader::default();
        let bytes = bytemuck::bytes_of(&header);
        assert!(bytes[88..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_crc_field_position() {
        let mut header = FileHeader::default();
        header.header_crc = 0xdead_beef;

        let bytes = bytemuck::bytes_of(&header);
        assert_eq!(&bytes[HEADER_CRC_RANGE], &0xdead_beef_u32.to_le_bytes());
    }
}
