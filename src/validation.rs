//! Input validation at the library boundary (§7: malformed caller
//! input surfaces as `LciError::InvalidInput`, never a panic).
//!
//! Kept to what callers actually hand this crate — opaque path strings
//! and search patterns — unlike the teacher's document/transaction/page
//! validation, which had no counterpart here once storage moved to
//! an in-process content store with no filesystem or DB contracts.

use std::path::Path;

use crate::error::{LciError, Result};

const MAX_PATH_LENGTH: usize = 4096;

/// Validate an opaque path string handed to `ContentStore::load` or
/// the path-search index. The store never touches the filesystem, but
/// still rejects the same malformed shapes a real filesystem would:
/// empty, null bytes, `..` traversal, implausibly long.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(LciError::InvalidInput("path cannot be empty".into()));
    }
    if path.len() >= MAX_PATH_LENGTH {
        return Err(LciError::InvalidInput(format!("path exceeds maximum length of {MAX_PATH_LENGTH}")));
    }
    if path.contains('\0') {
        return Err(LciError::InvalidInput("path contains a null byte".into()));
    }
    for component in Path::new(path).components() {
        if let std::path::Component::ParentDir = component {
            return Err(LciError::InvalidInput("path contains a parent-directory (..) component".into()));
        }
    }
    Ok(())
}

/// Validate a non-empty search query/pattern string (§6 "Pattern
/// (required)").
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(LciError::InvalidInput("pattern cannot be empty".into()));
    }
    Ok(())
}

/// Validate a regex pattern compiles, surfacing the compiler's error
/// through `LciError::InvalidInput` (§6, §7).
pub fn validate_regex(pattern: &str) -> Result<()> {
    validate_pattern(pattern)?;
    regex::Regex::new(pattern)?;
    Ok(())
}

/// Validate a glob pattern compiles.
pub fn validate_glob(pattern: &str) -> Result<()> {
    validate_pattern(pattern)?;
    globset::Glob::new(pattern).map_err(|e| LciError::InvalidInput(format!("invalid glob: {e}")))?;
    Ok(())
}
