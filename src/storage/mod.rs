//! Binary storage format for fixtures

mod format;
mod reader;
mod writer;

pub use format::{
    FileHeader, InteractionEntry, FILE_MAGIC, FILE_VERSION, HEADER_SIZE, INDEX_ENTRY_SIZE,
    MAX_INTERACTIONS,
};
pub use reader::FixtureReader;
pub use writer::FixtureWriter;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Result, TapedeckError};

/// File extension of fixture files
pub const FIXTURE_EXTENSION: &str = "tape";

/// Validate fixture file magic and version
///
/// # Errors
///
/// Returns error if magic or version is invalid
pub fn validate_header(header: &FileHeader) -> Result<()> {
    if header.magic != FILE_MAGIC {
        return Err(TapedeckError::InvalidFormat(format!(
            "Invalid magic bytes: expected {:?}, got {:?}",
            FILE_MAGIC, header.magic
        )));
    }

    if header.version != FILE_VERSION {
        return Err(TapedeckError::InvalidFormat(format!(
            "Unsupported version: {}, expected {}",
            header.version, FILE_VERSION
        )));
    }

    Ok(())
}

/// Deterministic fixture location for a test identity
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so `module::test_name`
/// maps to `module__test_name.tape`.
///
/// # Errors
///
/// Returns error if the identity is not a valid test name
pub fn fixture_path(fixtures_dir: &Path, identity: &str) -> Result<PathBuf> {
    validate_test_name(identity)?;

    let file_stem: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    Ok(fixtures_dir.join(format!("{file_stem}.{FIXTURE_EXTENSION}")))
}

/// Validate a test name
///
/// # Errors
///
/// Returns error if test name is invalid
pub fn validate_test_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TapedeckError::InvalidTestName(
            "Test name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(TapedeckError::InvalidTestName(format!(
            "Test name too long: {} > 255",
            name.len()
        )));
    }

    if name.starts_with('.') {
        return Err(TapedeckError::InvalidTestName(
            "Test name cannot start with dot".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(TapedeckError::InvalidTestName(
            "Test name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(TapedeckError::InvalidTestName(
            "Test name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}

/// Current time as Unix epoch nanoseconds
pub(crate) fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_test_name() {
        assert!(validate_test_name("TestFoo").is_ok());
        assert!(validate_test_name("test-123").is_ok());
        assert!(validate_test_name("tests::user_resource::create").is_ok());

        assert!(validate_test_name("").is_err());
        assert!(validate_test_name(".hidden").is_err());
        assert!(validate_test_name("test..name").is_err());
        assert!(validate_test_name("test\0name").is_err());
        assert!(validate_test_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_fixture_path() {
        let dir = Path::new("/fixtures");

        assert_eq!(
            fixture_path(dir, "TestFoo").unwrap(),
            PathBuf::from("/fixtures/TestFoo.tape")
        );
        assert_eq!(
            fixture_path(dir, "user::create").unwrap(),
            PathBuf::from("/fixtures/user__create.tape")
        );
        assert_eq!(
            fixture_path(dir, "TestAccUser/basic").unwrap(),
            PathBuf::from("/fixtures/TestAccUser_basic.tape")
        );
        assert!(fixture_path(dir, "../escape").is_err());
    }

    #[test]
    fn test_fixture_path_deterministic() {
        let dir = Path::new("fixtures");
        assert_eq!(
            fixture_path(dir, "TestFoo").unwrap(),
            fixture_path(dir, "TestFoo").unwrap()
        );
    }
}
