//! Error types for the runtime shim

use std::io;
use std::path::PathBuf;

/// Result alias used throughout the runtime
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort startup
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The bundled native library directory could not be listed
    #[error("failed to list native library directory {path:?}")]
    LibraryDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The memory-map snapshot could not be read
    #[error("failed to read memory map {path:?}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A path could not be resolved to canonical form
    #[error("failed to canonicalize {path:?}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The unload helper refused a path
    #[error("failed to unload {path:?}: {reason}")]
    Unload { path: PathBuf, reason: String },

    /// The engine library could not be loaded or is missing an entry point
    #[error("failed to load engine library {name}: {reason}")]
    EngineLoad { name: String, reason: String },

    /// The engine rejected its initialization
    #[error("engine initialization failed with status {0}")]
    EngineInit(i32),

    /// An engine entry point was called before the library was loaded
    #[error("engine entry point `{0}` called before the library was loaded")]
    EngineNotLoaded(&'static str),

    /// A path handed to the engine contains an interior NUL byte
    #[error("path {0:?} cannot be passed to the engine")]
    InvalidEnginePath(PathBuf),

    /// Conflicts remained after the iteration bound was spent
    #[error("native library conflicts remain after {iterations} iterations: {remaining:?}")]
    Unconverged {
        iterations: usize,
        remaining: Vec<PathBuf>,
    },

    /// A built-in pattern failed to compile
    #[error("invalid pattern")]
    Pattern(#[from] regex::Error),

    /// The configuration override file is malformed
    #[error("invalid configuration in {path:?}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration override file could not be read
    #[error("failed to read configuration {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
