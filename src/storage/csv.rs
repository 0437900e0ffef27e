/// Delimited text persistence for the reading history
///
/// Each reading is one line `temperature<d>pressure<d>timestamp` with no
/// header. Saving writes a sibling `.tmp` file and renames it over the
/// target, so the target is either the previous complete file or the new
/// complete file.
use log::{info, warn};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistError;
use crate::models::{Limits, Reading};
use crate::storage::History;

/// Outcome of a load: how many lines were accepted and which were skipped
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub rejected: Vec<String>,
}

impl LoadSummary {
    pub fn any_loaded(&self) -> bool {
        self.loaded > 0
    }
}

/// Atomically replace `path` with the contents of `history`
pub fn save(path: &Path, history: &History, delimiter: char) -> Result<(), PersistError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let temp_path = temp_path_for(path);
    let file = File::create(&temp_path).map_err(|source| PersistError::OpenTemp {
        path: temp_path.clone(),
        source,
    })?;

    if let Err(source) = write_readings(file, history, delimiter) {
        let _ = fs::remove_file(&temp_path);
        return Err(PersistError::Write {
            path: temp_path,
            source,
        });
    }

    fs::rename(&temp_path, path).map_err(|source| PersistError::Rename {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    info!("Saved {} readings to {}", history.len(), path.display());
    Ok(())
}

/// Replace `history` with the readings stored at `path`
///
/// A missing file leaves the history untouched. Otherwise the history is
/// cleared first and every acceptable line is pushed in file order; bad
/// lines are skipped and listed in the summary.
pub fn load(
    path: &Path,
    history: &mut History,
    delimiter: char,
    limits: &Limits,
    now: i64,
) -> Result<LoadSummary, PersistError> {
    if !path.exists() {
        return Ok(LoadSummary::default());
    }

    history.clear();
    let file = File::open(path).map_err(|source| PersistError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    let mut summary = LoadSummary::default();
    loop {
        raw.clear();
        let n = reader
            .read_until(b'\n', &mut raw)
            .map_err(|source| PersistError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        if raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") {
                raw.pop();
            }
        }

        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line,
            Err(_) => {
                let line = String::from_utf8_lossy(&raw).into_owned();
                warn!("Invalid data line (not UTF-8): {}", line);
                summary.rejected.push(line);
                continue;
            }
        };

        match parse_line(line, delimiter, limits, now) {
            Some(reading) => {
                history.push(reading);
                summary.loaded += 1;
            }
            None => {
                warn!("Invalid data line: {}", line);
                summary.rejected.push(line.to_string());
            }
        }
    }

    info!(
        "Loaded {} readings from {} ({} rejected)",
        summary.loaded,
        path.display(),
        summary.rejected.len()
    );
    Ok(summary)
}

/// Format one reading as a persisted line, without the terminator
pub fn format_line(reading: &Reading, delimiter: char) -> String {
    format!(
        "{}{d}{}{d}{}",
        reading.temperature,
        reading.pressure,
        reading.timestamp,
        d = delimiter
    )
}

/// Parse a persisted line, applying range and timestamp checks
pub fn parse_line(line: &str, delimiter: char, limits: &Limits, now: i64) -> Option<Reading> {
    let mut fields = line.split(delimiter);
    let temperature: f32 = fields.next()?.trim().parse().ok()?;
    let pressure: f32 = fields.next()?.trim().parse().ok()?;
    let timestamp: i64 = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let reading = Reading::new(temperature, pressure, timestamp);
    (limits.accepts(&reading) && timestamp > 0 && timestamp <= now).then_some(reading)
}

fn write_readings(file: File, history: &History, delimiter: char) -> io::Result<()> {
    let mut out = BufWriter::new(file);
    for reading in history.iter() {
        writeln!(out, "{}", format_line(reading, delimiter))?;
    }
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
