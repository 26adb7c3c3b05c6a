//! Boundary to the native CEGUI sample engine
//!
//! The engine is opaque. The shim only ever loads it and calls its three
//! C entry points; everything else happens on the other side.

use std::path::Path;

use crate::error::Result;

/// The four operations the shim needs from the engine
pub trait NativeEngine {
    /// Load the engine library by loader name
    /// (`CEGUISampleFramework` for `libCEGUISampleFramework.so`)
    fn load(&mut self, name: &str) -> Result<()>;

    /// One-time initialization with the engine log file and data directory
    fn init(&mut self, log_file: &Path, data_dir: &Path) -> Result<()>;

    /// Draw one frame
    fn render(&mut self) -> Result<()>;

    /// Tear the engine down
    fn finish(&mut self) -> Result<()>;
}

/// C symbol names exported by the engine library
pub const INIT_SYMBOL: &str = "cegui_android_init";
pub const RENDER_SYMBOL: &str = "cegui_android_render";
pub const FINISH_SYMBOL: &str = "cegui_android_finish";

#[cfg(unix)]
pub use self::dynamic::DynamicEngine;

#[cfg(unix)]
mod dynamic {
    use log::info;
    use std::ffi::{CString, c_char, c_int, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    use super::{FINISH_SYMBOL, INIT_SYMBOL, NativeEngine, RENDER_SYMBOL};
    use crate::error::{Error, Result};

    type InitFn = unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> c_int;
    type FrameFn = unsafe extern "C" fn(*mut c_void);

    struct EntryPoints {
        init: InitFn,
        render: FrameFn,
        finish: FrameFn,
    }

    /// Engine reached through `dlopen`/`dlsym`
    ///
    /// `host` is handed through to every entry point unchanged (the activity object on Android).
    pub struct DynamicEngine {
        host: *mut c_void,
        entry: Option<EntryPoints>,
    }

    impl DynamicEngine {
        pub fn new(host: *mut c_void) -> Self {
            Self { host, entry: None }
        }

        pub fn is_loaded(&self) -> bool {
            self.entry.is_some()
        }

        fn entry(&self, op: &'static str) -> Result<&EntryPoints> {
            self.entry.as_ref().ok_or(Error::EngineNotLoaded(op))
        }
    }

    fn last_dl_error() -> String {
        // SAFETY: dlerror returns either null or a thread-local NUL-terminated string
        unsafe {
            let msg = libc::dlerror();
            if msg.is_null() {
                "unknown dynamic loader error".to_string()
            } else {
                std::ffi::CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    fn symbol(handle: *mut c_void, lib: &str, name: &str) -> Result<*mut c_void> {
        let c_name = CString::new(name).map_err(|_| Error::EngineLoad {
            name: lib.to_string(),
            reason: format!("bad symbol name {name}"),
        })?;
        // SAFETY: `handle` is a live dlopen handle and `c_name` is NUL-terminated
        let sym = unsafe { libc::dlsym(handle, c_name.as_ptr()) };
        if sym.is_null() {
            return Err(Error::EngineLoad {
                name: lib.to_string(),
                reason: format!("missing symbol {name}: {}", last_dl_error()),
            });
        }
        Ok(sym)
    }

    fn c_path(path: &Path) -> Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::InvalidEnginePath(path.to_path_buf()))
    }

    impl NativeEngine for DynamicEngine {
        fn load(&mut self, name: &str) -> Result<()> {
            let file = format!("lib{name}.so");
            let c_file = CString::new(file.as_str()).map_err(|_| Error::EngineLoad {
                name: name.to_string(),
                reason: "name contains a NUL byte".to_string(),
            })?;

            // SAFETY: `c_file` is NUL-terminated; the handle is intentionally never closed
            let handle =
                unsafe { libc::dlopen(c_file.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
            if handle.is_null() {
                return Err(Error::EngineLoad {
                    name: name.to_string(),
                    reason: last_dl_error(),
                });
            }

            let init = symbol(handle, name, INIT_SYMBOL)?;
            let render = symbol(handle, name, RENDER_SYMBOL)?;
            let finish = symbol(handle, name, FINISH_SYMBOL)?;

            // SAFETY: the engine exports these symbols with exactly these C signatures
            self.entry = Some(unsafe {
                EntryPoints {
                    init: std::mem::transmute::<*mut c_void, InitFn>(init),
                    render: std::mem::transmute::<*mut c_void, FrameFn>(render),
                    finish: std::mem::transmute::<*mut c_void, FrameFn>(finish),
                }
            });
            info!("Loaded {}", file);
            Ok(())
        }

        fn init(&mut self, log_file: &Path, data_dir: &Path) -> Result<()> {
            let log_file = c_path(log_file)?;
            let data_dir = c_path(data_dir)?;
            let entry = self.entry("init")?;

            // SAFETY: pointers stay valid for the duration of the call
            let status = unsafe { (entry.init)(self.host, log_file.as_ptr(), data_dir.as_ptr()) };
            if status != 0 {
                return Err(Error::EngineInit(status));
            }
            Ok(())
        }

        fn render(&mut self) -> Result<()> {
            let entry = self.entry("render")?;
            // SAFETY: loaded entry point, host pointer owned by the caller
            unsafe { (entry.render)(self.host) };
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            let entry = self.entry("finish")?;
            // SAFETY: loaded entry point, host pointer owned by the caller
            unsafe { (entry.finish)(self.host) };
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_missing_library() {
            let mut engine = DynamicEngine::new(std::ptr::null_mut());
            let result = engine.load("definitely_not_a_real_engine");
            assert!(matches!(result, Err(Error::EngineLoad { .. })));
            assert!(!engine.is_loaded());
        }

        #[test]
        fn test_calls_before_load_fail() {
            let mut engine = DynamicEngine::new(std::ptr::null_mut());
            assert!(matches!(engine.render(), Err(Error::EngineNotLoaded("render"))));
            assert!(matches!(engine.finish(), Err(Error::EngineNotLoaded("finish"))));
            assert!(matches!(
                engine.init(Path::new("/tmp/CEGUI.log"), Path::new("/tmp/datafiles")),
                Err(Error::EngineNotLoaded("init"))
            ));
        }
    }
}
