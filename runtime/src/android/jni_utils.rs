//! JNI utilities for the few Java calls the shim needs
//!
//! The JavaVM is cached on first use so repeated calls only pay for
//! thread attachment.

use anyhow::{Context, Result, anyhow};
use jni::objects::{JObject, JString};
use jni::sys::jobject;
use jni::{JNIEnv, JavaVM};
use log::{error, warn};
use ndk_context::android_context;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Global JavaVM cache
static JAVA_VM: OnceLock<JavaVM> = OnceLock::new();

/// Initialize the JavaVM cache
/// Should be called early in the application lifecycle
pub fn init_java_vm() -> Result<()> {
    get_java_vm().map(|_| ())
}

/// Get the cached JavaVM instance
pub fn get_java_vm() -> Result<&'static JavaVM> {
    if let Some(vm) = JAVA_VM.get() {
        return Ok(vm);
    }

    let vm_ptr = android_context().vm();
    if vm_ptr.is_null() {
        return Err(anyhow!("JavaVM pointer is null"));
    }

    // SAFETY: ndk-context hands out the process-wide JavaVM pointer
    let vm = unsafe { JavaVM::from_raw(vm_ptr as *mut _) }.context("Failed to create JavaVM")?;
    Ok(JAVA_VM.get_or_init(|| vm))
}

/// Execute a closure with a JNI environment attached to the current thread
pub fn with_jni_env<F, R>(f: F) -> Result<R>
where
    F: for<'local> FnOnce(&mut JNIEnv<'local>) -> Result<R>,
{
    let vm = get_java_vm()?;
    let mut env = vm.attach_current_thread().context("Failed to attach thread")?;
    f(&mut env)
}

/// Get the Android activity object
pub fn get_android_context() -> Result<jobject> {
    let context_obj = android_context().context();
    if context_obj.is_null() {
        return Err(anyhow!("Android context is null"));
    }
    Ok(context_obj as jobject)
}

/// Handle JNI exceptions and log them appropriately
pub fn handle_jni_exception(env: &mut JNIEnv<'_>, context: &str) -> bool {
    if env.exception_check().unwrap_or(false) {
        if let Err(desc_err) = env.exception_describe() {
            warn!("Failed to describe exception in {}: {:?}", context, desc_err);
        } else {
            error!("JNI exception in {}", context);
        }
        env.exception_clear().ok();
        return true;
    }
    false
}

/// `context.getApplicationInfo().nativeLibraryDir`
pub fn native_library_dir() -> Result<PathBuf> {
    with_jni_env(|env| {
        // SAFETY: the activity reference is a global ref owned by ndk-context
        let activity = unsafe { JObject::from_raw(get_android_context()?) };

        let info = env.call_method(
            &activity,
            "getApplicationInfo",
            "()Landroid/content/pm/ApplicationInfo;",
            &[],
        );
        if handle_jni_exception(env, "getApplicationInfo") {
            return Err(anyhow!("Exception in getApplicationInfo"));
        }
        let info = info?.l()?;

        let dir = env.get_field(&info, "nativeLibraryDir", "Ljava/lang/String;");
        if handle_jni_exception(env, "nativeLibraryDir") {
            return Err(anyhow!("Exception reading nativeLibraryDir"));
        }
        let dir = JString::from(dir?.l()?);
        if dir.is_null() {
            return Err(anyhow!("nativeLibraryDir is null"));
        }

        let dir: String = env.get_string(&dir)?.into();
        Ok(PathBuf::from(dir))
    })
}

/// Ask the activity to finish itself
pub fn finish_activity() -> Result<()> {
    with_jni_env(|env| {
        // SAFETY: the activity reference is a global ref owned by ndk-context
        let activity = unsafe { JObject::from_raw(get_android_context()?) };

        let result = env.call_method(&activity, "finish", "()V", &[]);
        if handle_jni_exception(env, "finish") {
            return Err(anyhow!("Exception in finish"));
        }
        result.context("Failed to call finish")?;
        Ok(())
    })
}
