use log::{debug, info};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tokio::time::Duration;

use crate::models::{Limits, ValidRange, PRESSURE_RANGE, TEMPERATURE_RANGE};
use crate::utils::default_data_file;

pub const SUPPORTED_BAUD_RATES: [u32; 2] = [9600, 115200];
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 30;
pub const MAX_SAVE_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_DELIMITER: char = ',';
pub const DEFAULT_DATA_DIR: &str = "logs";

/// A setting that could not be used; its default was substituted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {key}: {value:?}, using default {default}")]
pub struct ConfigWarning {
    pub key: &'static str,
    pub value: String,
    pub default: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub baud_rate: u32,
    pub save_interval: Duration,
    pub csv_delimiter: char,
    pub limits: Limits,
    pub data_dir: PathBuf,
    pub data_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            save_interval: Duration::from_secs(DEFAULT_SAVE_INTERVAL_SECS),
            csv_delimiter: DEFAULT_DELIMITER,
            limits: Limits::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            data_file: default_data_file(),
        }
    }
}

impl EngineConfig {
    /// Load settings from the process environment and an optional `.env` file
    pub fn from_env() -> (Self, Vec<ConfigWarning>) {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_vars(env::vars())
    }

    /// Build a config from `BARO_*` key/value pairs. Invalid values fall back
    /// to their defaults, each producing a warning.
    pub fn from_vars<I, K, V>(vars: I) -> (Self, Vec<ConfigWarning>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.as_ref().starts_with("BARO_"))
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        debug!("Found {} BARO_* settings", vars.len());

        let mut config = EngineConfig::default();
        let mut warnings = Vec::new();

        if let Some(value) = vars.get("BARO_BAUD_RATE") {
            match parse_baud(value) {
                Some(baud) => config.baud_rate = baud,
                None => warnings.push(warning("BARO_BAUD_RATE", value, DEFAULT_BAUD_RATE)),
            }
        }

        if let Some(value) = vars.get("BARO_SAVE_INTERVAL") {
            match value.trim().parse::<u64>() {
                Ok(secs) if (1..=MAX_SAVE_INTERVAL_SECS).contains(&secs) => {
                    config.save_interval = Duration::from_secs(secs)
                }
                _ => warnings.push(warning(
                    "BARO_SAVE_INTERVAL",
                    value,
                    DEFAULT_SAVE_INTERVAL_SECS,
                )),
            }
        }

        if let Some(value) = vars.get("BARO_CSV_DELIMITER") {
            match parse_delimiter(value) {
                Some(delimiter) => config.csv_delimiter = delimiter,
                None => warnings.push(warning("BARO_CSV_DELIMITER", value, DEFAULT_DELIMITER)),
            }
        }

        config.limits.temperature = parse_range(
            &vars,
            ("BARO_TEMP_MIN", "BARO_TEMP_MAX"),
            TEMPERATURE_RANGE,
            &mut warnings,
        );
        config.limits.pressure = parse_range(
            &vars,
            ("BARO_PRESS_MIN", "BARO_PRESS_MAX"),
            PRESSURE_RANGE,
            &mut warnings,
        );

        if let Some(dir) = vars.get("BARO_DATA_DIR").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = vars.get("BARO_DATA_FILE").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            config.data_file = file.to_string();
        }

        info!(
            "Configuration: baud={}, save_interval={}s, delimiter={:?}, temp={}..{}, press={}..{}",
            config.baud_rate,
            config.save_interval.as_secs(),
            config.csv_delimiter,
            config.limits.temperature.min,
            config.limits.temperature.max,
            config.limits.pressure.min,
            config.limits.pressure.max
        );

        (config, warnings)
    }

    /// Positional overrides `[data-file] [baud] [delimiter]`
    pub fn apply_args<I>(&mut self, args: I) -> Vec<ConfigWarning>
    where
        I: IntoIterator<Item = String>,
    {
        let mut warnings = Vec::new();
        let mut args = args.into_iter();

        if let Some(file) = args.next().filter(|f| !f.is_empty()) {
            self.data_file = file;
        }
        if let Some(value) = args.next() {
            match parse_baud(&value) {
                Some(baud) => self.baud_rate = baud,
                None => {
                    self.baud_rate = DEFAULT_BAUD_RATE;
                    warnings.push(warning("baud rate", &value, DEFAULT_BAUD_RATE));
                }
            }
        }
        if let Some(value) = args.next() {
            match parse_delimiter(&value) {
                Some(delimiter) => self.csv_delimiter = delimiter,
                None => {
                    self.csv_delimiter = DEFAULT_DELIMITER;
                    warnings.push(warning("delimiter", &value, DEFAULT_DELIMITER));
                }
            }
        }

        warnings
    }

    /// Full path of the history file
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }
}

pub fn parse_baud(value: &str) -> Option<u32> {
    value
        .trim()
        .parse()
        .ok()
        .filter(|baud| SUPPORTED_BAUD_RATES.contains(baud))
}

fn parse_delimiter(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '\n' && c != '.' && c != '-' && !c.is_ascii_digit() => Some(c),
        _ => None,
    }
}

/// Range limits must stay inside the defaults, with min below max
fn parse_range(
    vars: &HashMap<String, String>,
    (min_key, max_key): (&'static str, &'static str),
    default: ValidRange,
    warnings: &mut Vec<ConfigWarning>,
) -> ValidRange {
    let mut range = default;

    if let Some(value) = vars.get(min_key) {
        match value.trim().parse::<f32>() {
            Ok(min) if min >= default.min && min < default.max => range.min = min,
            _ => warnings.push(warning(min_key, value, default.min)),
        }
    }
    if let Some(value) = vars.get(max_key) {
        match value.trim().parse::<f32>() {
            Ok(max) if max > range.min && max <= default.max => range.max = max,
            _ => warnings.push(warning(max_key, value, default.max)),
        }
    }

    range
}

fn warning(key: &'static str, value: &str, default: impl ToString) -> ConfigWarning {
    ConfigWarning {
        key,
        value: value.to_string(),
        default: default.to_string(),
    }
}
