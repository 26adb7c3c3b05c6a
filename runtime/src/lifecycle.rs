//! Activity lifecycle glue
//!
//! Startup order is fixed: resolve library conflicts, load the engine, then
//! wait for a surface. Frames are only driven while the activity is resumed
//! and a surface exists.

use log::{error, info, warn};
use std::path::Path;

use crate::config::ShimConfig;
use crate::engine::NativeEngine;
use crate::error::Result;
use crate::frame::{EnginePaths, FrameDriver};
use crate::resolver::{ConflictResolver, MapsSource, ResolveReport};
use crate::unload::Unloader;

/// Lifecycle callbacks forwarded by the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SurfaceCreated,
    SurfaceChanged { width: u32, height: u32 },
    SurfaceDestroyed,
    Pause,
    Resume,
    Destroy,
}

/// Owns the engine and the frame driver for one activity instance
pub struct LifecycleShim<E: NativeEngine> {
    engine: E,
    driver: FrameDriver,
    has_surface: bool,
    resumed: bool,
    destroyed: bool,
}

impl<E: NativeEngine> LifecycleShim<E> {
    /// Activity creation: resolve conflicts against `lib_dir`, then load the engine.
    ///
    /// Nothing is loaded if resolution fails.
    pub fn create(
        config: &ShimConfig,
        lib_dir: &Path,
        storage_root: &Path,
        mut engine: E,
        maps: &mut dyn MapsSource,
        unloader: &mut dyn Unloader,
    ) -> Result<(Self, ResolveReport)> {
        info!("Resolving native library conflicts in {:?}", lib_dir);
        let resolver = ConflictResolver::new(lib_dir, config)?;
        let report = resolver.resolve(maps, unloader)?;

        engine.load(&config.engine_library)?;

        let paths = EnginePaths::under(storage_root, config);
        let shim = Self {
            engine,
            driver: FrameDriver::new(paths),
            has_surface: false,
            resumed: false,
            destroyed: false,
        };
        Ok((shim, report))
    }

    pub fn handle(&mut self, event: LifecycleEvent) -> Result<()> {
        if self.destroyed {
            warn!("Ignoring {:?} after destroy", event);
            return Ok(());
        }

        match event {
            LifecycleEvent::SurfaceCreated => {
                self.has_surface = true;
                self.driver.on_surface_created();
            }
            LifecycleEvent::SurfaceChanged { width, height } => {
                self.driver.on_surface_changed(width, height);
            }
            LifecycleEvent::SurfaceDestroyed => self.has_surface = false,
            LifecycleEvent::Pause => self.resumed = false,
            LifecycleEvent::Resume => self.resumed = true,
            LifecycleEvent::Destroy => {
                self.destroyed = true;
                self.has_surface = false;
                info!("Shutting down engine");
                self.engine.finish()?;
            }
        }
        Ok(())
    }

    /// Drive one frame if possible. Returns whether a frame was drawn.
    pub fn frame(&mut self) -> Result<bool> {
        if !self.should_draw() {
            return Ok(false);
        }
        self.driver.on_draw_frame(&mut self.engine)?;
        Ok(true)
    }

    pub fn should_draw(&self) -> bool {
        self.has_surface && self.resumed && !self.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

}

/// Messages for `err` and each wrapped cause, outermost first
pub fn cause_chain(err: &anyhow::Error) -> Vec<String> {
    err.chain().map(|cause| cause.to_string()).collect()
}

/// Log a fatal startup error with every cause on its own line
pub fn log_cause_chain(err: &anyhow::Error) {
    for (depth, cause) in cause_chain(err).iter().enumerate() {
        if depth == 0 {
            error!("Fatal: {}", cause);
        } else {
            error!("  caused by: {}", cause);
        }
    }
}
