//! Canonical path resolution that tolerates vanished files

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `path` to its absolute, symlink-free form.
///
/// A mapping can outlive its file (the package was replaced after load), so a
/// missing tail is appended lexically to the deepest ancestor that resolves.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => resolve_missing(path),
        Err(source) => Err(Error::Canonicalize {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn resolve_missing(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| Error::Canonicalize {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    let mut ancestor = absolute.as_path();
    loop {
        match fs::canonicalize(ancestor) {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(Error::Canonicalize {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        match (ancestor.parent(), ancestor.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name);
                ancestor = parent;
            }
            // `..` as the last component or the root itself failed to resolve
            _ => {
                return Err(Error::Canonicalize {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no resolvable ancestor"),
                });
            }
        }
    }
}
