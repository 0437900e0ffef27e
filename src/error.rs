/// Error types for the acquisition engine
///
/// None of these are fatal. Link errors drop the connection and schedule a
/// reconnect, protocol errors drop a single line, persistence errors leave
/// the previous file on disk untouched.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Quantity;

/// Serial link failures
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No serial port available")]
    NoDevice,
    #[error("Failed to open serial port {path} at {baud} baud: {source}")]
    Open {
        path: PathBuf,
        baud: u32,
        #[source]
        source: io::Error,
    },
    #[error("Failed to reconnect to {path} with any baud rate")]
    AllBaudRatesFailed { path: PathBuf },
    #[error("Giving up after {attempts} reconnect attempts")]
    Exhausted { attempts: u32 },
    #[error("Serial read error: {0}")]
    Read(#[source] io::Error),
    #[error("Serial port hung up ({reads} empty reads in a row)")]
    HungUp { reads: u32 },
    #[error("Serial port is not connected")]
    NotConnected,
}

/// A received line that did not contribute to a reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Unrecognized line: {0:?}")]
    UnrecognizedLine(String),
    #[error("No {quantity} value in line: {line:?}")]
    MissingValue { quantity: Quantity, line: String },
    #[error("Invalid {quantity}: {value} (expected {min}..={max})")]
    OutOfRange {
        quantity: Quantity,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("Line buffer overflow, discarded {discarded} bytes")]
    Overflow { discarded: usize },
}

/// Logical index outside the populated part of the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("History is empty")]
    Empty,
    #[error("Index {index} out of range for history of {len} readings")]
    OutOfBounds { index: usize, len: usize },
}

/// Save and load failures
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open temp file {path}: {source}")]
    OpenTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write data to temp file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to rename temp file {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open data file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read data file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
