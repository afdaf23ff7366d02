//! Build script for headsign-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates headsign.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate headsign.toml at compile time
///
/// The firmware parser falls back to defaults on bad input, so mistakes
/// are caught here rather than on the sign.
fn validate_config() {
    println!("cargo:rerun-if-changed=headsign.toml");

    let config_path = Path::new("headsign.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: headsign.toml not found!                                 ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds headsign.toml as its configuration.         ║\n\
            ║  Please create one in the headsign-firmware directory.           ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read headsign.toml                             ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in headsign.toml                     ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    validate_controller(&config, &mut errors);
    validate_display(&config, &mut errors);
    validate_host(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid values in headsign.toml                          ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=headsign.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Look up a table section, recording an error if it is not a table
fn section<'a>(
    config: &'a toml::Value,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<&'a toml::value::Table> {
    match config.get(name) {
        Some(toml::Value::Table(t)) => Some(t),
        Some(_) => {
            errors.push(format!("[{}] must be a table", name));
            None
        }
        None => None,
    }
}

/// Check an optional integer key against an inclusive range
fn check_int(
    table: &toml::value::Table,
    section: &str,
    key: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
) {
    match table.get(key) {
        Some(toml::Value::Integer(v)) if *v < min || *v > max => {
            errors.push(format!("[{}] {} must be {}-{}", section, key, min, max));
        }
        Some(toml::Value::Integer(_)) | None => {}
        Some(_) => errors.push(format!("[{}] {} must be an integer", section, key)),
    }
}

fn check_bool(table: &toml::value::Table, section: &str, key: &str, errors: &mut Vec<String>) {
    if let Some(v) = table.get(key) {
        if !v.is_bool() {
            errors.push(format!("[{}] {} must be true or false", section, key));
        }
    }
}

fn validate_controller(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(t) = section(config, "controller", errors) else {
        return;
    };

    match t.get("database_path") {
        Some(toml::Value::String(path)) => {
            if path.is_empty() || path.len() > 64 {
                errors.push("[controller] database_path must be 1-64 bytes".to_string());
            }
        }
        Some(_) => errors.push("[controller] database_path must be a string".to_string()),
        None => {}
    }

    check_int(t, "controller", "transition_duration_s", 1, 65_535, errors);
    check_int(t, "controller", "time_sync_interval_s", 1, u32::MAX as i64, errors);
    check_int(t, "controller", "emergency_priority_threshold", 0, 100, errors);
    check_int(t, "controller", "min_seconds_between_repeats", 1, u32::MAX as i64, errors);
    check_int(t, "controller", "utc_offset_minutes", -840, 840, errors);
    check_int(t, "controller", "tick_budget_ms", 1, u32::MAX as i64, errors);
    check_bool(t, "controller", "run_tests_on_startup", errors);
    check_bool(t, "controller", "wipe_database_on_boot", errors);

    if t.get("wipe_database_on_boot").and_then(|v| v.as_bool()) == Some(true) {
        println!("cargo:warning=wipe_database_on_boot is set: every boot erases stored messages");
    }
}

fn validate_display(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(t) = section(config, "display", errors) else {
        return;
    };
    check_int(t, "display", "baudrate", 300, 921_600, errors);
    check_int(t, "display", "ack_window_ms", 0, 10_000, errors);
}

fn validate_host(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(t) = section(config, "host", errors) else {
        return;
    };
    check_int(t, "host", "baudrate", 300, 921_600, errors);
    check_int(t, "host", "time_max_age_s", 1, u32::MAX as i64, errors);
}
