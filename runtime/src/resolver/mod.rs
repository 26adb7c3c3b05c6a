//! Native library conflict resolution
//!
//! Several packages can ship a library under the same soname. When a foreign
//! copy is already mapped into the process, the dynamic linker binds our
//! engine against it. Before the engine is loaded, every mapping that shares a
//! file name with one of our bundled libraries but lives elsewhere is unloaded,
//! and the memory map is re-read until no such mapping remains.

mod canonical;
mod library;
mod maps;

pub use canonical::canonical_path;
pub use library::NativeLibraryDescriptor;
pub use maps::{LoadedLibraryRecord, MapsParser, MapsSource, ProcMaps, SELF_MAPS};

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{MAX_RESOLVE_ITERATIONS, ShimConfig};
use crate::error::{Error, Result};
use crate::unload::Unloader;

/// Outcome of a resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Snapshots taken
    pub iterations: usize,
    /// Every path handed to the unloader, in order
    pub unloaded: Vec<PathBuf>,
    /// Whether a snapshot with no conflicts was reached
    pub converged: bool,
    /// Conflicts from the last snapshot when the bound ran out
    pub remaining: Vec<PathBuf>,
}

/// Drives the snapshot → conflicts → unload loop
pub struct ConflictResolver {
    descriptor: NativeLibraryDescriptor,
    parser: MapsParser,
    max_iterations: usize,
    strict: bool,
}

impl ConflictResolver {
    /// Build a resolver for the libraries bundled in `lib_dir`
    pub fn new(lib_dir: &Path, config: &ShimConfig) -> Result<Self> {
        let descriptor = NativeLibraryDescriptor::from_dir(lib_dir, &config.helper_library)?;
        Self::with_descriptor(descriptor, config)
    }

    pub fn with_descriptor(
        descriptor: NativeLibraryDescriptor,
        config: &ShimConfig,
    ) -> Result<Self> {
        // Overrides may lower the bound but never disable it or raise it
        let max_iterations = config.max_iterations.clamp(1, MAX_RESOLVE_ITERATIONS);
        if max_iterations != config.max_iterations {
            warn!(
                "max_iterations {} out of range, using {}",
                config.max_iterations, max_iterations
            );
        }

        Ok(Self {
            descriptor,
            parser: MapsParser::new()?,
            max_iterations,
            strict: config.strict_convergence,
        })
    }

    pub fn descriptor(&self) -> &NativeLibraryDescriptor {
        &self.descriptor
    }

    /// Canonical paths in `snapshot` that conflict with a bundled library
    pub fn conflicts(&self, snapshot: &str) -> Result<BTreeSet<PathBuf>> {
        Ok(self
            .parser
            .records(snapshot)?
            .into_iter()
            .filter(|r| self.descriptor.is_conflict(&r.name, &r.path))
            .map(|r| r.path)
            .collect())
    }

    /// Unload conflicts until a snapshot shows none or the bound is reached
    pub fn resolve(
        &self,
        maps: &mut dyn MapsSource,
        unloader: &mut dyn Unloader,
    ) -> Result<ResolveReport> {
        let mut report = ResolveReport::default();

        if self.descriptor.is_empty() {
            debug!("No bundled libraries found, conflicts are impossible");
        }

        while report.iterations < self.max_iterations {
            report.iterations += 1;

            let snapshot = maps.snapshot()?;
            let conflicts = self.conflicts(&snapshot)?;
            if conflicts.is_empty() {
                report.converged = true;
                break;
            }

            info!(
                "Pass {}: unloading {} conflicting libraries: {:?}",
                report.iterations,
                conflicts.len(),
                conflicts
            );
            unloader.unload(&conflicts)?;
            report.unloaded.extend(conflicts.iter().cloned());
            report.remaining = conflicts.into_iter().collect();
        }

        if report.converged {
            report.remaining.clear();
            info!(
                "Library conflicts resolved after {} passes ({} unloaded)",
                report.iterations,
                report.unloaded.len()
            );
            return Ok(report);
        }

        warn!(
            "Library conflicts remain after {} passes: {:?}",
            report.iterations, report.remaining
        );
        if self.strict {
            return Err(Error::Unconverged {
                iterations: report.iterations,
                remaining: report.remaining,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;

    /// Replays snapshots; the last one repeats forever
    struct ScriptedMaps {
        snapshots: VecDeque<String>,
        reads: usize,
    }

    impl ScriptedMaps {
        fn new(snapshots: &[&str]) -> Self {
            Self {
                snapshots: snapshots.iter().map(|s| s.to_string()).collect(),
                reads: 0,
            }
        }
    }

    impl MapsSource for ScriptedMaps {
        fn snapshot(&mut self) -> Result<String> {
            self.reads += 1;
            if self.snapshots.len() > 1 {
                Ok(self.snapshots.pop_front().unwrap_or_default())
            } else {
                Ok(self.snapshots.front().cloned().unwrap_or_default())
            }
        }
    }

    #[derive(Default)]
    struct RecordingUnloader {
        calls: Vec<BTreeSet<PathBuf>>,
    }

    impl Unloader for RecordingUnloader {
        fn unload(&mut self, paths: &BTreeSet<PathBuf>) -> Result<usize> {
            self.calls.push(paths.clone());
            Ok(paths.len())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        bundled: PathBuf,
        resolver: ConflictResolver,
    }

    fn fixture(config: &ShimConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("pkg").join("lib");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join("libFoo.so"), b"").unwrap();
        fs::write(lib_dir.join(&config.helper_library), b"").unwrap();

        let resolver = ConflictResolver::new(&lib_dir, config).unwrap();
        let bundled = fs::canonicalize(lib_dir.join("libFoo.so")).unwrap();
        Fixture {
            _dir: dir,
            bundled,
            resolver,
        }
    }

    const FOREIGN: &str = "/data/app/otherpkg/lib/libFoo.so";

    fn line(path: &str) -> String {
        format!("7a1d000000-7a1d100000 r-xp 00000000 fd:02 5678  {path}\n")
    }

    #[test]
    fn test_foreign_copy_is_unloaded_once() {
        let config = ShimConfig::default();
        let f = fixture(&config);
        let bundled = f.bundled.display().to_string();

        let before = line(FOREIGN) + &line(&bundled);
        let after = line(&bundled);
        let mut maps = ScriptedMaps::new(&[before.as_str(), after.as_str()]);
        let mut unloader = RecordingUnloader::default();

        let report = f.resolver.resolve(&mut maps, &mut unloader).unwrap();

        assert!(report.converged);
        assert_eq!(report.iterations, 2);
        assert_eq!(unloader.calls.len(), 1);
        let expected: BTreeSet<PathBuf> = [canonical_path(Path::new(FOREIGN)).unwrap()].into();
        assert_eq!(unloader.calls[0], expected);
        assert_eq!(report.unloaded, expected.into_iter().collect::<Vec<_>>());
        assert!(report.remaining.is_empty());
    }

    #[test]
    fn test_own_copy_only_exits_first_pass() {
        let config = ShimConfig::default();
        let f = fixture(&config);
        let bundled = f.bundled.display().to_string();

        let mut maps = ScriptedMaps::new(&[line(&bundled).as_str()]);
        let mut unloader = RecordingUnloader::default();

        let report = f.resolver.resolve(&mut maps, &mut unloader).unwrap();

        assert!(report.converged);
        assert_eq!(report.iterations, 1);
        assert_eq!(maps.reads, 1);
        assert!(unloader.calls.is_empty());
    }

    #[test]
    fn test_unrelated_libraries_are_ignored() {
        let config = ShimConfig::default();
        let f = fixture(&config);

        let snapshot = line("/system/lib64/libc.so") + &line("/data/app/otherpkg/lib/libBar.so");
        let conflicts = f.resolver.conflicts(&snapshot).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_helper_library_is_never_a_conflict() {
        let config = ShimConfig::default();
        let f = fixture(&config);

        let snapshot = line("/data/app/otherpkg/lib/libcegui_droid.so");
        assert!(f.resolver.conflicts(&snapshot).unwrap().is_empty());
    }

    #[test]
    fn test_bound_is_respected() {
        let config = ShimConfig::default();
        let f = fixture(&config);

        let stuck = line(FOREIGN);
        let mut maps = ScriptedMaps::new(&[stuck.as_str()]);
        let mut unloader = RecordingUnloader::default();

        let report = f.resolver.resolve(&mut maps, &mut unloader).unwrap();

        assert!(!report.converged);
        assert_eq!(report.iterations, MAX_RESOLVE_ITERATIONS);
        assert_eq!(maps.reads, MAX_RESOLVE_ITERATIONS);
        assert_eq!(unloader.calls.len(), MAX_RESOLVE_ITERATIONS);
        assert_eq!(report.remaining, vec![canonical_path(Path::new(FOREIGN)).unwrap()]);
    }

    #[test]
    fn test_iteration_override_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        for (requested, expected) in [(0, 1), (1000, MAX_RESOLVE_ITERATIONS)] {
            let path = dir.path().join("shim.json");
            fs::write(&path, format!(r#"{{ "max_iterations": {requested} }}"#)).unwrap();
            let config = ShimConfig::load(&path).unwrap();
            assert_eq!(config.max_iterations, requested);

            let f = fixture(&config);
            let mut maps = ScriptedMaps::new(&[line(FOREIGN).as_str()]);
            let mut unloader = RecordingUnloader::default();

            let report = f.resolver.resolve(&mut maps, &mut unloader).unwrap();

            assert!(!report.converged);
            assert_eq!(maps.reads, expected);
            assert_eq!(unloader.calls.len(), expected);
        }
    }

    #[test]
    fn test_strict_bound_is_an_error() {
        let config = ShimConfig {
            max_iterations: 3,
            strict_convergence: true,
            ..ShimConfig::default()
        };
        let f = fixture(&config);

        let mut maps = ScriptedMaps::new(&[line(FOREIGN).as_str()]);
        let mut unloader = RecordingUnloader::default();

        let result = f.resolver.resolve(&mut maps, &mut unloader);
        assert!(matches!(result, Err(Error::Unconverged { iterations: 3, .. })));
        assert_eq!(unloader.calls.len(), 3);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let config = ShimConfig::default();
        let f = fixture(&config);
        let bundled = f.bundled.display().to_string();

        let first = line(FOREIGN) + &line(&bundled);
        let second = line(&bundled);
        let mut maps = ScriptedMaps::new(&[first.as_str(), second.as_str()]);
        let mut unloader = RecordingUnloader::default();

        f.resolver.resolve(&mut maps, &mut unloader).unwrap();
        assert_eq!(unloader.calls.len(), 1);

        let report = f.resolver.resolve(&mut maps, &mut unloader).unwrap();
        assert!(report.converged);
        assert!(report.unloaded.is_empty());
        assert_eq!(unloader.calls.len(), 1);
    }

    #[test]
    fn test_snapshot_failure_propagates() {
        struct Broken;
        impl MapsSource for Broken {
            fn snapshot(&mut self) -> Result<String> {
                Err(Error::MemoryMap {
                    path: PathBuf::from(SELF_MAPS),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                })
            }
        }

        let config = ShimConfig::default();
        let f = fixture(&config);
        let mut unloader = RecordingUnloader::default();

        let result = f.resolver.resolve(&mut Broken, &mut unloader);
        assert!(matches!(result, Err(Error::MemoryMap { .. })));
        assert!(unloader.calls.is_empty());
    }

    #[test]
    fn test_empty_descriptor_converges_first_pass() {
        let config = ShimConfig::default();
        let resolver =
            ConflictResolver::with_descriptor(NativeLibraryDescriptor::default(), &config)
                .unwrap();
        let mut maps = ScriptedMaps::new(&[line(FOREIGN).as_str()]);
        let mut unloader = RecordingUnloader::default();

        let report = resolver.resolve(&mut maps, &mut unloader).unwrap();
        assert!(report.converged);
        assert_eq!(maps.reads, 1);
        assert!(unloader.calls.is_empty());
    }
}
