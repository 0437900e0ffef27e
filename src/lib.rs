//! Acquisition engine for a serial temperature/pressure sensor.
//!
//! The device streams ASCII lines (`Temp: 23.5 C`, `Pres: 1012.3 hPa`) over a
//! serial port. The engine keeps the link alive, decodes lines into
//! timestamped readings, holds the newest `storage::CAPACITY` of them in a
//! ring buffer and persists that history as delimited text.

pub mod alerts;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod serial;
pub mod stats;
pub mod storage;
pub mod utils;

pub use config::EngineConfig;
pub use engine::{Command, Engine, LoopControl};
pub use models::{Quantity, Reading, Statistics};
