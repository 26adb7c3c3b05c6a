//! cegui-droid - Android runtime shim for the CEGUI sample framework
//!
//! This crate boots the native CEGUI sample engine inside a NativeActivity.
//! Before the engine library is loaded, any foreign copy of a library we
//! bundle that is already mapped into the process is unloaded, so the
//! dynamic linker binds the engine against our own copies.
//!
//! The built cdylib is itself the unload helper (`libcegui_droid.so`); it also
//! exports `NativeLibraryGuard.unloadLibs(String[])` for Java callers.
//!
//! # Example
//!
//! ```rust,ignore
//! use cegui_droid::{ConflictResolver, DlUnloader, ProcMaps, ShimConfig};
//!
//! let config = ShimConfig::default();
//! let resolver = ConflictResolver::new(lib_dir, &config)?;
//! let report = resolver.resolve(&mut ProcMaps::current(), &mut DlUnloader::new())?;
//! assert!(report.converged);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod resolver;
pub mod unload;

#[cfg(target_os = "android")]
mod android;

#[cfg(target_os = "android")]
pub use android::jni_utils;

pub use config::ShimConfig;
pub use engine::NativeEngine;
pub use error::{Error, Result};
pub use frame::{EnginePaths, FrameDriver};
pub use lifecycle::{LifecycleEvent, LifecycleShim};
pub use resolver::{
    ConflictResolver, LoadedLibraryRecord, MapsParser, MapsSource, NativeLibraryDescriptor,
    ProcMaps, ResolveReport,
};
pub use unload::Unloader;

#[cfg(unix)]
pub use engine::DynamicEngine;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use unload::DlUnloader;
