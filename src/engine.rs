/// Acquisition engine tying the serial link, decoder, history and storage together
///
/// The engine is a single owned value driven by one cooperative loop: each
/// `tick` makes at most one reconnect attempt, waits at most `READ_TIMEOUT`
/// for serial data and saves when the save interval has elapsed. Front ends
/// get read-only access to the history, statistics, link status and alerts,
/// and talk back through `Command`s.
use log::info;
use std::path::PathBuf;
use tokio::time::Instant;

use crate::alerts::{Alerts, Severity};
use crate::config::{EngineConfig, SUPPORTED_BAUD_RATES};
use crate::error::{LinkError, PersistError, ProtocolError};
use crate::models::{Reading, Statistics};
use crate::serial::{
    ConnectionStatus, LineDecoder, PortOpener, ReconnectOutcome, SerialLink, LINE_BUFFER_SIZE,
    READ_TIMEOUT,
};
use crate::stats;
use crate::storage::{self, History};

/// Operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SaveNow,
    ClearErrors,
    TogglePause,
    SetBaud(u32),
    Reconnect,
    Quit,
}

/// Whether the outer loop should keep running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Quit,
}

pub struct Engine<O: PortOpener> {
    config: EngineConfig,
    link: SerialLink<O>,
    decoder: LineDecoder,
    history: History,
    alerts: Alerts,
    paused: bool,
    last_save: Instant,
    read_buf: [u8; LINE_BUFFER_SIZE],
}

impl<O: PortOpener> Engine<O> {
    pub fn new(config: EngineConfig, opener: O, now: Instant) -> Self {
        Engine {
            link: SerialLink::new(opener, config.baud_rate),
            decoder: LineDecoder::new(config.limits),
            history: History::new(),
            alerts: Alerts::new(),
            paused: false,
            last_save: now,
            read_buf: [0; LINE_BUFFER_SIZE],
            config,
        }
    }

    /// Open the device, configured baud rate first, and reload saved history
    ///
    /// The startup open is the first reconnect attempt: it counts toward the
    /// retry budget and starts the cooldown.
    pub fn start(&mut self, now: Instant, wall: i64) {
        let outcome = self.link.try_connect(now);
        self.on_reconnect(outcome, now);
        self.reload(now, wall);
    }

    /// Replace the history with the contents of the data file, if present
    pub fn reload(&mut self, now: Instant, wall: i64) -> bool {
        let path = self.config.data_path();
        match storage::load(
            &path,
            &mut self.history,
            self.config.csv_delimiter,
            &self.config.limits,
            wall,
        ) {
            Ok(summary) => {
                if !summary.rejected.is_empty() {
                    self.alerts.push(
                        format!(
                            "Skipped {} invalid lines in {}",
                            summary.rejected.len(),
                            path.display()
                        ),
                        Severity::Transient,
                        now,
                    );
                }
                if summary.any_loaded() {
                    self.alerts.push(
                        format!("Loaded data from {}", path.display()),
                        Severity::Transient,
                        now,
                    );
                }
                summary.any_loaded()
            }
            Err(e) => {
                self.alerts.push(e.to_string(), Severity::Transient, now);
                false
            }
        }
    }

    /// One iteration of the acquisition loop
    pub async fn tick(&mut self, now: Instant, wall: i64) {
        self.reconnect(now);

        if !self.paused && self.link.is_connected() {
            self.read_serial(now, wall).await;
        }

        if !self.paused && now.saturating_duration_since(self.last_save) >= self.config.save_interval {
            if let Err(e) = self.save() {
                self.alerts.push(e.to_string(), Severity::Transient, now);
            }
            self.last_save = now;
        }

        self.alerts.expire(now);
    }

    pub fn handle(&mut self, command: Command, now: Instant) -> LoopControl {
        match command {
            Command::SaveNow => {
                let message = match self.save() {
                    Ok(path) => format!("Saved to {}", path.display()),
                    Err(e) => e.to_string(),
                };
                self.alerts.push(message, Severity::Transient, now);
            }
            Command::ClearErrors => self.alerts.clear(self.link.is_connected()),
            Command::TogglePause => {
                self.paused = !self.paused;
                info!("Acquisition {}", if self.paused { "paused" } else { "resumed" });
            }
            Command::SetBaud(baud) => {
                if SUPPORTED_BAUD_RATES.contains(&baud) {
                    self.config.baud_rate = baud;
                    self.link.set_baud(baud);
                    self.decoder.reset();
                    self.alerts
                        .push(format!("Set baud rate to: {}", baud), Severity::Transient, now);
                    if let Err(e) = self.link.connect() {
                        self.alerts.push(e.to_string(), Severity::Persistent, now);
                    }
                } else {
                    self.alerts.push(
                        format!("Unsupported baud rate: {}", baud),
                        Severity::Transient,
                        now,
                    );
                }
            }
            Command::Reconnect => {
                self.link.close();
                self.decoder.reset();
                self.link.reset_attempts();
                self.reconnect(now);
            }
            Command::Quit => return LoopControl::Quit,
        }
        LoopControl::Continue
    }

    /// Final save before exit; a partial line still in the decoder is dropped
    pub fn shutdown(&mut self) -> Result<PathBuf, PersistError> {
        self.decoder.reset();
        self.link.close();
        self.save()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.history.latest()
    }

    pub fn statistics(&self, wall: i64) -> Statistics {
        stats::compute(&self.history, wall)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.status()
    }

    pub fn alerts(&self) -> &Alerts {
        &self.alerts
    }

    /// Surface a message from outside the engine, e.g. a config warning
    pub fn alert(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        self.alerts.push(message, severity, now);
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn save(&self) -> Result<PathBuf, PersistError> {
        let path = self.config.data_path();
        storage::save(&path, &self.history, self.config.csv_delimiter)?;
        Ok(path)
    }

    fn reconnect(&mut self, now: Instant) {
        let outcome = self.link.try_reconnect(now);
        self.on_reconnect(outcome, now);
    }

    fn on_reconnect(&mut self, outcome: Result<ReconnectOutcome, LinkError>, now: Instant) {
        match outcome {
            Ok(ReconnectOutcome::Connected { baud, .. }) => {
                self.config.baud_rate = baud;
                self.decoder.reset();
                self.alerts.clear_all();
            }
            Ok(_) => {}
            Err(e) => {
                self.alerts.push(e.to_string(), Severity::Persistent, now);
                if self.link.gave_up() {
                    let exhausted = LinkError::Exhausted {
                        attempts: self.link.attempts(),
                    };
                    self.alerts
                        .push(exhausted.to_string(), Severity::Persistent, now);
                }
            }
        }
    }

    async fn read_serial(&mut self, now: Instant, wall: i64) {
        let n = match self.link.poll_readable(&mut self.read_buf, READ_TIMEOUT).await {
            Ok(n) => n,
            Err(e) => {
                self.decoder.reset();
                self.alerts.push(e.to_string(), Severity::Transient, now);
                return;
            }
        };
        if n == 0 {
            return;
        }

        let decoded = self.decoder.feed(&self.read_buf[..n], wall);
        for reading in decoded.readings {
            self.history.push(reading);
            info!(
                "Temp: {:.2} C, Press: {:.2} hPa, Alt: {:.1} m",
                reading.temperature,
                reading.pressure,
                reading.altitude()
            );
        }
        for e in decoded.rejected {
            if matches!(
                e,
                ProtocolError::OutOfRange { .. } | ProtocolError::Overflow { .. }
            ) {
                self.alerts.push(e.to_string(), Severity::Transient, now);
            }
        }
    }
}
