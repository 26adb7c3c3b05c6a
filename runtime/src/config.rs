//! Shim configuration
//!
//! Defaults match the stock sample browser package. A JSON file with any
//! subset of the fields can override them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// Upper bound on resolver passes before giving up
pub const MAX_RESOLVE_ITERATIONS: usize = 256;

/// File name of this crate's own cdylib, which must never be treated as a conflict
pub const HELPER_LIBRARY: &str = "libcegui_droid.so";

/// Name passed to the dynamic loader for the engine (without `lib` / `.so`)
pub const ENGINE_LIBRARY: &str = "CEGUISampleFramework";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Engine library name as given to the loader
    pub engine_library: String,
    /// File name excluded from the expected library set
    pub helper_library: String,
    /// Resolver iteration bound, clamped to `1..=MAX_RESOLVE_ITERATIONS` when used
    pub max_iterations: usize,
    /// Treat leftover conflicts after the bound as a startup failure
    pub strict_convergence: bool,
    /// Directory created under the external data path
    pub base_dir_name: String,
    /// Engine log file name inside the base directory
    pub log_file_name: String,
    /// Engine data directory name inside the base directory
    pub data_dir_name: String,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            engine_library: ENGINE_LIBRARY.to_string(),
            helper_library: HELPER_LIBRARY.to_string(),
            max_iterations: MAX_RESOLVE_ITERATIONS,
            strict_convergence: false,
            base_dir_name: "cegui".to_string(),
            log_file_name: "CEGUI.log".to_string(),
            data_dir_name: "datafiles".to_string(),
        }
    }
}

impl ShimConfig {
    /// Load overrides from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(Error::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File name the loader will look for, e.g. `libCEGUISampleFramework.so`
    pub fn engine_file_name(&self) -> String {
        format!("lib{}.so", self.engine_library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShimConfig::default();
        assert_eq!(config.max_iterations, 256);
        assert_eq!(config.helper_library, "libcegui_droid.so");
        assert!(!config.strict_convergence);
        assert_eq!(config.engine_file_name(), "libCEGUISampleFramework.so");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShimConfig::load(&dir.path().join("shim.json")).unwrap();
        assert_eq!(config, ShimConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shim.json");
        fs::write(&path, r#"{ "strict_convergence": true, "max_iterations": 8 }"#).unwrap();

        let config = ShimConfig::load(&path).unwrap();
        assert!(config.strict_convergence);
        assert_eq!(config.max_iterations, 8);
        assert_eq!(config.engine_library, ENGINE_LIBRARY);
    }

    #[test]
    fn test_malformed_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shim.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(ShimConfig::load(&path), Err(Error::Config { .. })));
    }
}
