//! Per-frame engine driver

use log::info;
use std::path::{Path, PathBuf};

use crate::config::ShimConfig;
use crate::engine::NativeEngine;
use crate::error::Result;

/// Paths handed to the engine's one-time initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub base_dir: PathBuf,
    pub log_file: PathBuf,
    pub data_dir: PathBuf,
}

impl EnginePaths {
    /// Lay the engine out under `storage_root`/`base_dir_name`
    pub fn under(storage_root: &Path, config: &ShimConfig) -> Self {
        let base_dir = storage_root.join(&config.base_dir_name);
        Self {
            log_file: base_dir.join(&config.log_file_name),
            data_dir: base_dir.join(&config.data_dir_name),
            base_dir,
        }
    }
}

/// Calls `init` once, then `render` on every frame
pub struct FrameDriver {
    paths: EnginePaths,
    initialized: bool,
}

impl FrameDriver {
    pub fn new(paths: EnginePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The engine sets up its own GL context
    pub fn on_surface_created(&mut self) {}

    /// The engine queries the surface size itself
    pub fn on_surface_changed(&mut self, _width: u32, _height: u32) {}

    pub fn on_draw_frame(&mut self, engine: &mut dyn NativeEngine) -> Result<()> {
        if !self.initialized {
            info!(
                "Initializing engine (log: {:?}, data: {:?})",
                self.paths.log_file, self.paths.data_dir
            );
            engine.init(&self.paths.log_file, &self.paths.data_dir)?;
            self.initialized = true;
        }
        engine.render()
    }
}
