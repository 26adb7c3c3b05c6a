//! Memory-map snapshots

use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::canonical::canonical_path;
use crate::error::{Error, Result};

/// Mapping listing for the current process
pub const SELF_MAPS: &str = "/proc/self/maps";

/// Source of memory-map snapshots. Every call must return fresh data.
pub trait MapsSource {
    fn snapshot(&mut self) -> Result<String>;
}

/// Reads a `/proc/<pid>/maps` style file on every snapshot
#[derive(Debug, Clone)]
pub struct ProcMaps {
    path: PathBuf,
}

impl ProcMaps {
    /// Mappings of the calling process
    pub fn current() -> Self {
        Self::from_path(SELF_MAPS)
    }

    /// Mappings of another process, readable from a shell with the same uid
    pub fn for_pid(pid: u32) -> Self {
        Self::from_path(format!("/proc/{pid}/maps"))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MapsSource for ProcMaps {
    fn snapshot(&mut self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|source| Error::MemoryMap {
            path: self.path.clone(),
            source,
        })
    }
}

/// A shared object observed in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadedLibraryRecord {
    pub path: PathBuf,
    pub name: String,
}

/// Pulls file paths out of snapshot text
pub struct MapsParser {
    token: Regex,
}

impl MapsParser {
    pub fn new() -> Result<Self> {
        // Absolute path tokens; `[heap]`, `[anon:...]` and `(deleted)` never start with '/'
        let token = Regex::new(r"(?m)(?:^|\s)(/\S+)")?;
        Ok(Self { token })
    }

    /// Distinct path tokens in order of first appearance
    pub fn paths<'a>(&self, snapshot: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.token
            .captures_iter(snapshot)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Canonicalize every distinct path in `snapshot`.
    ///
    /// Two tokens that resolve to the same canonical path yield one record.
    pub fn records(&self, snapshot: &str) -> Result<Vec<LoadedLibraryRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for raw in self.paths(snapshot) {
            let path = canonical_path(Path::new(raw))?;
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.to_string();
            if seen.insert(path.clone()) {
                records.push(LoadedLibraryRecord { path, name });
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
5f3c2000-5f3c4000 r-xp 00000000 fd:01 1234      /system/bin/app_process64
7a1c000000-7a1c020000 rw-p 00000000 00:00 0     [anon:libc_malloc]
7a1d000000-7a1d100000 r-xp 00000000 fd:02 5678  /data/app/pkg/lib/arm64/libFoo.so
7a1d100000-7a1d101000 r--p 00100000 fd:02 5678  /data/app/pkg/lib/arm64/libFoo.so
7a1e000000-7a1e100000 r-xp 00000000 fd:02 9012  /data/app/other/lib/arm64/libFoo.so (deleted)
7ffd000000-7ffd021000 rw-p 00000000 00:00 0     [stack]
";

    #[test]
    fn test_paths_are_distinct_and_ordered() {
        let parser = MapsParser::new().unwrap();
        let paths = parser.paths(SAMPLE);
        assert_eq!(
            paths,
            vec![
                "/system/bin/app_process64",
                "/data/app/pkg/lib/arm64/libFoo.so",
                "/data/app/other/lib/arm64/libFoo.so",
            ]
        );
    }

    #[test]
    fn test_multiple_paths_on_one_line() {
        let parser = MapsParser::new().unwrap();
        let paths = parser.paths("/a/libOne.so /b/libTwo.so\n\t/c/libThree.so");
        assert_eq!(paths, vec!["/a/libOne.so", "/b/libTwo.so", "/c/libThree.so"]);
    }

    #[test]
    fn test_records_canonicalize() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("libFoo.so");
        fs::write(&lib, b"").unwrap();
        let dotted = dir.path().join(".").join("libFoo.so");
        let snapshot = format!("{}\n{}\n", lib.display(), dotted.display());

        let parser = MapsParser::new().unwrap();
        let records = parser.records(&snapshot).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "libFoo.so");
        assert_eq!(records[0].path, fs::canonicalize(&lib).unwrap());
    }

    #[test]
    fn test_proc_maps_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut maps = ProcMaps::from_path(dir.path().join("maps"));
        assert!(matches!(maps.snapshot(), Err(Error::MemoryMap { .. })));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_self_maps_is_readable() {
        let mut maps = ProcMaps::current();
        let snapshot = maps.snapshot().unwrap();
        let parser = MapsParser::new().unwrap();
        assert!(!parser.paths(&snapshot).is_empty());
    }
}
