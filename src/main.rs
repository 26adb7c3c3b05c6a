//! Command‑line interface for the CEGUI Android shim.
//!
//! Runs the runtime's conflict classification against a native library
//! directory and a memory map, without unloading anything. Useful from an
//! `adb shell` (`run-as <package>`) to see why the engine bound against the
//! wrong library.

use cegui_droid::config::HELPER_LIBRARY;
use cegui_droid::{
    ConflictResolver, EnginePaths, MapsSource, NativeLibraryDescriptor, ProcMaps, ShimConfig,
};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// cegui-droid CLI top‑level arguments.
#[derive(Parser)]
#[command(
    name = "cegui-droid",
    version,
    about = "Inspect native library conflicts for the CEGUI Android shim",
    long_about = None
)]
struct Cli {
    /// Print runtime debug diagnostics.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands supported by the CLI.
#[derive(Subcommand)]
enum Commands {
    /// Classify one memory-map snapshot against a bundled library directory.
    Scan {
        /// Directory holding the application's bundled native libraries.
        #[arg(long)]
        lib_dir: PathBuf,
        /// Read /proc/<PID>/maps instead of this process's map.
        #[arg(long, conflicts_with = "maps")]
        pid: Option<u32>,
        /// Read a saved maps file.
        #[arg(long)]
        maps: Option<PathBuf>,
        /// Helper library file name to exclude.
        #[arg(long, default_value = HELPER_LIBRARY)]
        helper: String,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the libraries and canonical paths considered bundled.
    Libs {
        /// Directory holding the application's bundled native libraries.
        #[arg(long)]
        lib_dir: PathBuf,
        /// Helper library file name to exclude.
        #[arg(long, default_value = HELPER_LIBRARY)]
        helper: String,
        /// Emit the list as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the log file and data paths the engine would be initialized with.
    Paths {
        /// External files directory of the application.
        #[arg(long)]
        base: PathBuf,
        /// Optional shim configuration overrides (JSON).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Colored logging helpers for consistent CLI output
mod log {
    use colored::*;

    pub fn info(msg: &str) {
        println!("{}", msg.bright_blue());
    }

    pub fn success(msg: &str) {
        println!("{}", msg.bright_green());
    }

    pub fn warning(msg: &str) {
        println!("{}", msg.bright_yellow());
    }

    pub fn error(msg: &str) {
        eprintln!("{}", msg.bright_red());
    }

    pub fn step(msg: &str) {
        println!("{} {}", "→".bright_cyan(), msg.bright_white());
    }

    pub fn header(msg: &str) {
        println!("{}", msg.bright_cyan().bold());
    }
}

/// Result of a single classification pass
#[derive(Debug, Serialize)]
struct ScanReport {
    lib_dir: PathBuf,
    maps: PathBuf,
    expected: NativeLibraryDescriptor,
    conflicts: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = log_level(cli.verbose);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let result = match cli.command {
        Commands::Scan {
            lib_dir,
            pid,
            maps,
            helper,
            json,
        } => handle_scan(lib_dir, pid, maps, helper, json),
        Commands::Libs {
            lib_dir,
            helper,
            json,
        } => handle_libs(lib_dir, helper, json),
        Commands::Paths { base, config } => handle_paths(base, config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error(&format!("Error: {e}"));
            let mut source = e.source();
            while let Some(cause) = source {
                log::error(&format!("  caused by: {cause}"));
                source = cause.source();
            }
            ExitCode::from(2)
        }
    }
}

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

/// `-v` (or more) switches the runtime's log output to debug
fn log_level(verbose: u8) -> ::log::LevelFilter {
    match verbose {
        0 => ::log::LevelFilter::Warn,
        _ => ::log::LevelFilter::Debug,
    }
}

fn maps_source(pid: Option<u32>, maps: Option<PathBuf>) -> ProcMaps {
    match (pid, maps) {
        (Some(pid), _) => ProcMaps::for_pid(pid),
        (None, Some(path)) => ProcMaps::from_path(path),
        (None, None) => ProcMaps::current(),
    }
}

fn config_with_helper(helper: String) -> ShimConfig {
    ShimConfig {
        helper_library: helper,
        ..ShimConfig::default()
    }
}

fn scan(
    lib_dir: &Path,
    maps: &mut ProcMaps,
    config: &ShimConfig,
) -> Result<ScanReport, cegui_droid::Error> {
    let resolver = ConflictResolver::new(lib_dir, config)?;
    let snapshot = maps.snapshot()?;
    let conflicts = resolver.conflicts(&snapshot)?;

    Ok(ScanReport {
        lib_dir: lib_dir.to_path_buf(),
        maps: maps.path().to_path_buf(),
        expected: resolver.descriptor().clone(),
        conflicts: conflicts.into_iter().collect(),
    })
}

fn handle_scan(
    lib_dir: PathBuf,
    pid: Option<u32>,
    maps: Option<PathBuf>,
    helper: String,
    json: bool,
) -> CliResult {
    let mut source = maps_source(pid, maps);
    let report = scan(&lib_dir, &mut source, &config_with_helper(helper))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        log::header(&format!("Scanning {}", report.maps.display()));
        log::info(&format!(
            "{} bundled libraries in {}",
            report.expected.names.len(),
            report.lib_dir.display()
        ));

        if report.conflicts.is_empty() {
            log::success("No conflicting libraries mapped");
        } else {
            log::warning(&format!("{} conflicting libraries mapped:", report.conflicts.len()));
            for path in &report.conflicts {
                log::step(&path.display().to_string());
            }
        }
    }

    Ok(if report.conflicts.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_libs(lib_dir: PathBuf, helper: String, json: bool) -> CliResult {
    let descriptor = NativeLibraryDescriptor::from_dir(&lib_dir, &helper)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(ExitCode::SUCCESS);
    }

    log::header(&format!("Bundled libraries in {}", lib_dir.display()));
    if descriptor.is_empty() {
        log::warning("No lib*.so files found");
    }
    for path in &descriptor.paths {
        log::step(&path.display().to_string());
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_paths(base: PathBuf, config: Option<PathBuf>) -> CliResult {
    let config = match config {
        Some(path) => ShimConfig::load(&path)?,
        None => ShimConfig::default(),
    };
    let paths = EnginePaths::under(&base, &config);

    println!("{:>8} {}", "base".bright_cyan(), paths.base_dir.display());
    println!("{:>8} {}", "log".bright_cyan(), paths.log_file.display());
    println!("{:>8} {}", "data".bright_cyan(), paths.data_dir.display());
    println!("{:>8} {}", "engine".bright_cyan(), config.engine_file_name());
    Ok(ExitCode::SUCCESS)
}
