//! NativeActivity entry point and JNI exports

pub mod jni_utils;

use android_activity::{AndroidApp, MainEvent, PollEvent};
use android_logger::Config as AndroidLoggerConfig;
use anyhow::Context;
use jni::JNIEnv;
use jni::objects::{JClass, JObjectArray, JString};
use jni::sys::jint;
use log::{error, info};
use std::collections::BTreeSet;
use std::ffi::c_void;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ShimConfig;
use crate::engine::DynamicEngine;
use crate::lifecycle::{LifecycleEvent, LifecycleShim, log_cause_chain};
use crate::resolver::ProcMaps;
use crate::unload::{DlUnloader, Unloader};

/// Optional overrides, read from the app's external files directory
const CONFIG_FILE: &str = "cegui-shim.json";

/// Poll timeout while nothing is being drawn
const IDLE_POLL: Duration = Duration::from_millis(16);

/// Android NativeActivity entry point
#[unsafe(no_mangle)]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn android_main(android_app: AndroidApp) {
    android_logger::init_once(
        AndroidLoggerConfig::default()
            .with_max_level(log::LevelFilter::Info)
            .with_tag("CEGUI"),
    );

    if let Err(e) = jni_utils::init_java_vm() {
        error!("Failed to initialize JavaVM: {:#}", e);
    }

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    match run(&android_app) {
        Ok(()) => info!("Activity exited normally"),
        Err(e) => {
            log_cause_chain(&e);
            if let Err(e) = jni_utils::finish_activity() {
                error!("Failed to finish activity: {:#}", e);
            }
        }
    }
}

fn run(android_app: &AndroidApp) -> anyhow::Result<()> {
    let storage_root = android_app
        .external_data_path()
        .or_else(|| android_app.internal_data_path())
        .context("No data directory available")?;
    let config = ShimConfig::load(&storage_root.join(CONFIG_FILE))?;

    let lib_dir = jni_utils::native_library_dir().context("Failed to query nativeLibraryDir")?;
    let host = jni_utils::get_android_context()? as *mut c_void;

    let (mut shim, report) = LifecycleShim::create(
        &config,
        &lib_dir,
        &storage_root,
        DynamicEngine::new(host),
        &mut ProcMaps::current(),
        &mut DlUnloader::new(),
    )
    .context("Failed to start the CEGUI sample engine")?;
    info!(
        "Startup complete ({} passes, {} libraries unloaded, converged: {})",
        report.iterations,
        report.unloaded.len(),
        report.converged
    );

    loop {
        let timeout = if shim.should_draw() { Duration::ZERO } else { IDLE_POLL };
        let mut pending = Vec::new();
        android_app.poll_events(Some(timeout), |event| {
            if let PollEvent::Main(main_event) = event {
                translate_event(android_app, &main_event, &mut pending);
            }
        });

        for event in pending {
            shim.handle(event).with_context(|| format!("Failed to handle {event:?}"))?;
        }
        if shim.is_destroyed() {
            return Ok(());
        }

        shim.frame().context("Failed to render frame")?;
    }
}

fn translate_event(android_app: &AndroidApp, event: &MainEvent<'_>, out: &mut Vec<LifecycleEvent>) {
    let size = || {
        android_app
            .native_window()
            .map(|w| LifecycleEvent::SurfaceChanged {
                width: w.width().max(0) as u32,
                height: w.height().max(0) as u32,
            })
    };

    match event {
        MainEvent::InitWindow { .. } => {
            info!("Lifecycle: InitWindow");
            out.push(LifecycleEvent::SurfaceCreated);
            out.extend(size());
        }
        MainEvent::WindowResized { .. } | MainEvent::ConfigChanged { .. } => {
            info!("Lifecycle: WindowResized/ConfigChanged");
            out.extend(size());
        }
        MainEvent::TerminateWindow { .. } => {
            info!("Lifecycle: TerminateWindow");
            out.push(LifecycleEvent::SurfaceDestroyed);
        }
        MainEvent::Pause => {
            info!("Lifecycle: Pause");
            out.push(LifecycleEvent::Pause);
        }
        MainEvent::Resume { .. } => {
            info!("Lifecycle: Resume");
            out.push(LifecycleEvent::Resume);
        }
        MainEvent::Destroy => {
            info!("Lifecycle: Destroy");
            out.push(LifecycleEvent::Destroy);
        }
        _ => {}
    }
}

fn read_paths(env: &mut JNIEnv<'_>, paths: &JObjectArray<'_>) -> anyhow::Result<BTreeSet<PathBuf>> {
    let len = env.get_array_length(paths)?;
    let mut out = BTreeSet::new();
    for i in 0..len {
        let element = JString::from(env.get_object_array_element(paths, i)?);
        if element.is_null() {
            continue;
        }
        let path: String = env.get_string(&element)?.into();
        out.insert(PathBuf::from(path));
    }
    Ok(out)
}

/// JNI export: unload the shared objects mapped at the given canonical paths
/// Java signature: static native int unloadLibs(String[] paths);
#[unsafe(no_mangle)]
pub extern "C" fn Java_org_cegui_samples_NativeLibraryGuard_unloadLibs<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    paths: JObjectArray<'local>,
) -> jint {
    let result = read_paths(&mut env, &paths)
        .and_then(|paths| DlUnloader::new().unload(&paths).map_err(anyhow::Error::from));

    match result {
        Ok(count) => count as jint,
        Err(e) => {
            error!("unloadLibs failed: {:#}", e);
            if env.throw_new("java/lang/RuntimeException", format!("{e:#}")).is_err() {
                error!("Failed to raise RuntimeException");
            }
            -1
        }
    }
}
