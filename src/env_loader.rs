use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::period::Granularity;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first env file found. Variables already set in the process win.
pub fn load_env() {
    let mut loaded_env = false;
    for path in ENV_PATHS.iter() {
        if Path::new(path).exists() {
            if let Err(e) = load_env_from_file(path) {
                warn!("Failed to load environment from {}: {}", path, e);
            } else {
                info!("Loaded environment variables from {}", path);
                loaded_env = true;
                break;
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }
}

/// Splits a `KEY=value` line. Comments, blanks and lines without `=` yield `None`.
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') || trimmed.is_empty() {
        return None;
    }
    let idx = trimmed.find('=')?;
    let key = trimmed[..idx].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, trimmed[idx + 1..].trim().trim_matches('"')))
}

fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(file_path).with_context(|| format!("Could not open env file '{}'", file_path))?;
    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read line from env file")?;
        let Some((key, value)) = parse_env_line(&line) else {
            continue;
        };
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
            debug!(
                "Set env var from file: {} = {}",
                key,
                if key == "DB_PASSWORD" { "[hidden]" } else { value }
            );
        }
    }
    Ok(())
}

/// Initial bucket size for the interactive tool, from `TRENDS_DEFAULT_INTERVAL`.
pub fn default_granularity() -> Granularity {
    match std::env::var("TRENDS_DEFAULT_INTERVAL") {
        Ok(raw) => Granularity::from_str(&raw).unwrap_or_else(|e| {
            warn!("{}; falling back to month", e);
            Granularity::Month
        }),
        Err(_) => Granularity::Month,
    }
}

/// Directory exports are written to, from `TRENDS_OUTPUT_DIR`.
pub fn output_dir() -> PathBuf {
    std::env::var("TRENDS_OUTPUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
