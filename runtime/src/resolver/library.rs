//! The set of native libraries the application bundles

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::canonical::canonical_path;
use crate::error::{Error, Result};

/// Shared-object file names of the form `lib<anything>.so`
const LIBRARY_NAME_PATTERN: &str = r"^lib.*\.so$";

pub(crate) fn library_name_pattern() -> Result<Regex> {
    Ok(Regex::new(LIBRARY_NAME_PATTERN)?)
}

/// Library file names and the canonical paths they may legitimately be mapped from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeLibraryDescriptor {
    pub names: BTreeSet<String>,
    pub paths: BTreeSet<PathBuf>,
}

impl NativeLibraryDescriptor {
    /// Scan `dir` for bundled libraries, skipping the helper's own file name.
    pub fn from_dir(dir: &Path, helper_library: &str) -> Result<Self> {
        let dir_error = |source| Error::LibraryDir {
            path: dir.to_path_buf(),
            source,
        };

        // walkdir reports a missing root lazily; fail before touching anything else
        fs::read_dir(dir).map_err(dir_error)?;

        let pattern = library_name_pattern()?;
        let mut descriptor = Self::default();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| dir_error(e.into()))?;
            let canonical = canonical_path(entry.path())?;

            let Some(name) = canonical.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == helper_library || !pattern.is_match(name) {
                continue;
            }

            descriptor.names.insert(name.to_string());
            descriptor.paths.insert(canonical);
        }

        Ok(descriptor)
    }

    /// True when `name` is bundled but `path` is not one of the bundled copies
    pub fn is_conflict(&self, name: &str, path: &Path) -> bool {
        self.names.contains(name) && !self.paths.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
