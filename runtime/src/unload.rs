//! Forcible unloading of shared objects by path

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::Result;

/// Removes the shared objects mapped at the given canonical paths.
/// Returns how many were actually resident.
pub trait Unloader {
    fn unload(&mut self, paths: &BTreeSet<PathBuf>) -> Result<usize>;
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use self::dl::DlUnloader;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod dl {
    use log::{debug, warn};
    use std::collections::BTreeSet;
    use std::ffi::{CStr, CString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use super::Unloader;
    use crate::error::{Error, Result};

    /// Reference counts above this are treated as pinned objects
    const MAX_CLOSES_PER_OBJECT: usize = 64;

    /// `dlclose`s each object until the loader no longer knows it
    #[derive(Debug, Default)]
    pub struct DlUnloader;

    impl DlUnloader {
        pub fn new() -> Self {
            Self
        }

        fn unload_one(&self, path: &Path) -> Result<bool> {
            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::Unload {
                path: path.to_path_buf(),
                reason: "path contains a NUL byte".to_string(),
            })?;

            let mut closed = 0;
            while closed < MAX_CLOSES_PER_OBJECT {
                // SAFETY: `c_path` is a valid NUL-terminated string;
                // RTLD_NOLOAD never maps anything new
                let handle =
                    unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_NOLOAD) };
                if handle.is_null() {
                    break;
                }
                // One close drops the reference we just took, the second drops one held by
                // whoever loaded it originally.
                if let Err(reason) = close(handle).and_then(|()| close(handle)) {
                    debug!("dlclose({:?}) failed after {} rounds: {}", path, closed, reason);
                    break;
                }
                closed += 1;
            }

            if closed == MAX_CLOSES_PER_OBJECT {
                warn!("{:?} is still resident after {} closes", path, closed);
            } else {
                debug!("Closed {:?} {} times", path, closed);
            }
            Ok(closed > 0)
        }
    }

    /// `dlclose` one reference, reporting the loader's message on failure
    fn close(handle: *mut libc::c_void) -> std::result::Result<(), String> {
        // SAFETY: callers pass a handle returned by a successful dlopen
        if unsafe { libc::dlclose(handle) } == 0 {
            Ok(())
        } else {
            Err(last_dl_error())
        }
    }

    fn last_dl_error() -> String {
        // SAFETY: dlerror returns either null or a thread-local NUL-terminated string
        unsafe {
            let msg = libc::dlerror();
            if msg.is_null() {
                "unknown dynamic loader error".to_string()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }

    impl Unloader for DlUnloader {
        fn unload(&mut self, paths: &BTreeSet<PathBuf>) -> Result<usize> {
            let mut resident = 0;
            for path in paths {
                if self.unload_one(path)? {
                    resident += 1;
                }
            }
            Ok(resident)
        }
    }

}
