/// Serial link lifecycle: discovery, open, read, reconnect with backoff
///
/// The link is `Disconnected` at startup and after any read failure. While
/// disconnected, `try_reconnect` tries at most once per
/// `RECONNECT_COOLDOWN` and stops altogether after `MAX_RECONNECT_ATTEMPTS`
/// failures: the link then stays down until `reset_attempts` is called by a
/// user action (manual reconnect or baud change). The give-up is deliberate,
/// it keeps a missing device from being polled forever.
///
/// A tty whose device went away keeps reporting readiness and then reads
/// zero bytes. `MAX_EMPTY_READS` such reads in a row count as a hang-up and
/// drop the link like a read error. A read that simply times out is not
/// counted.
use log::{debug, error, info, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, Duration, Instant};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::LinkError;

/// Device path prefixes searched in order, each with indices 0..PORTS_PER_PREFIX
pub const PORT_PREFIXES: [&str; 2] = ["/dev/ttyACM", "/dev/ttyUSB"];
pub const PORTS_PER_PREFIX: usize = 10;
/// Baud rates tried, in order, on every reconnect attempt
pub const RECONNECT_BAUD_RATES: [u32; 2] = [9600, 115200];
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(5);
/// Bounded wait for the device to become readable
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Consecutive zero-byte reads treated as a hang-up
pub const MAX_EMPTY_READS: u32 = 3;
/// Inter-character timeout configured on the port
const CHAR_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens serial devices. Abstracted so the link can run against fake ports.
pub trait PortOpener {
    type Port: AsyncRead + Unpin;

    fn exists(&self, path: &Path) -> bool;

    fn open(&self, path: &Path, baud: u32) -> io::Result<Self::Port>;
}

/// Real serial devices through `tokio-serial`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    type Port = SerialStream;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Raw 8N1, no flow control, non-blocking
    fn open(&self, path: &Path, baud: u32) -> io::Result<SerialStream> {
        tokio_serial::new(path.to_string_lossy(), baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(CHAR_TIMEOUT)
            .open_native_async()
            .map_err(io::Error::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Probing,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => f.write_str("disconnected"),
            LinkState::Probing => f.write_str("probing"),
            LinkState::Connected => f.write_str("connected"),
        }
    }
}

/// What a call to `try_reconnect` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    AlreadyConnected,
    CoolingDown,
    GaveUp,
    Connected { path: PathBuf, baud: u32 },
}

/// Read-only view of the link for status displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub path: Option<PathBuf>,
    pub baud: u32,
    pub attempts: u32,
    pub gave_up: bool,
}

pub struct SerialLink<O: PortOpener> {
    opener: O,
    port: Option<O::Port>,
    state: LinkState,
    path: Option<PathBuf>,
    baud: u32,
    attempts: u32,
    last_attempt: Option<Instant>,
    empty_reads: u32,
}

impl<O: PortOpener> SerialLink<O> {
    pub fn new(opener: O, baud: u32) -> Self {
        SerialLink {
            opener,
            port: None,
            state: LinkState::Disconnected,
            path: None,
            baud,
            attempts: 0,
            last_attempt: None,
            empty_reads: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// True once the retry budget is spent
    pub fn gave_up(&self) -> bool {
        self.attempts >= MAX_RECONNECT_ATTEMPTS
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            path: self.path.clone(),
            baud: self.baud,
            attempts: self.attempts,
            gave_up: self.gave_up(),
        }
    }

    /// First existing candidate device path
    pub fn discover(&self) -> Option<PathBuf> {
        PORT_PREFIXES
            .iter()
            .flat_map(|prefix| (0..PORTS_PER_PREFIX).map(move |i| PathBuf::from(format!("{prefix}{i}"))))
            .find(|path| self.opener.exists(path))
    }

    /// Open `path` at `baud`, replacing any current connection
    pub fn open(&mut self, path: &Path, baud: u32) -> Result<(), LinkError> {
        self.close();
        match self.opener.open(path, baud) {
            Ok(port) => {
                info!("Connected to {} at {} baud", path.display(), baud);
                self.port = Some(port);
                self.state = LinkState::Connected;
                self.path = Some(path.to_path_buf());
                self.baud = baud;
                self.attempts = 0;
                Ok(())
            }
            Err(source) => Err(LinkError::Open {
                path: path.to_path_buf(),
                baud,
                source,
            }),
        }
    }

    /// Discover a device and open it at the configured baud rate
    pub fn connect(&mut self) -> Result<(), LinkError> {
        let path = self.discover().ok_or(LinkError::NoDevice)?;
        self.open(&path, self.baud)
    }

    /// Drop the port, if any
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port");
        }
        self.state = LinkState::Disconnected;
        self.empty_reads = 0;
    }

    /// Change the preferred baud rate, closing the port and restoring the
    /// retry budget so the next tick reconnects
    pub fn set_baud(&mut self, baud: u32) {
        self.baud = baud;
        self.close();
        self.reset_attempts();
    }

    /// Restore the retry budget and skip the cooldown
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    /// One reconnect attempt, if disconnected, not cooling down and not given up
    pub fn try_reconnect(&mut self, now: Instant) -> Result<ReconnectOutcome, LinkError> {
        self.attempt(now, None)
    }

    /// Startup attempt. Counted and rate limited like `try_reconnect`, but
    /// the configured baud rate is tried before the reconnect order.
    pub fn try_connect(&mut self, now: Instant) -> Result<ReconnectOutcome, LinkError> {
        self.attempt(now, Some(self.baud))
    }

    fn attempt(&mut self, now: Instant, preferred: Option<u32>) -> Result<ReconnectOutcome, LinkError> {
        if self.is_connected() {
            return Ok(ReconnectOutcome::AlreadyConnected);
        }
        if self.gave_up() {
            return Ok(ReconnectOutcome::GaveUp);
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < RECONNECT_COOLDOWN {
                return Ok(ReconnectOutcome::CoolingDown);
            }
        }

        self.last_attempt = Some(now);
        self.attempts += 1;
        self.state = LinkState::Probing;
        debug!("Reconnect attempt {}/{}", self.attempts, MAX_RECONNECT_ATTEMPTS);

        let result = self.open_any(preferred);
        if result.is_err() {
            self.state = LinkState::Disconnected;
            if self.gave_up() {
                error!(
                    "Giving up on serial port after {} reconnect attempts",
                    self.attempts
                );
            }
        }
        result
    }

    fn open_any(&mut self, preferred: Option<u32>) -> Result<ReconnectOutcome, LinkError> {
        let path = self.discover().ok_or(LinkError::NoDevice)?;

        let rest = RECONNECT_BAUD_RATES
            .into_iter()
            .filter(|&baud| Some(baud) != preferred);
        for baud in preferred.into_iter().chain(rest) {
            match self.open(&path, baud) {
                Ok(()) => {
                    info!("Reconnected to {} at baud rate {}", path.display(), baud);
                    return Ok(ReconnectOutcome::Connected { path, baud });
                }
                Err(e) => warn!("{}", e),
            }
        }
        Err(LinkError::AllBaudRatesFailed { path })
    }

    /// Wait up to `wait` for data and read what is available into `buf`
    ///
    /// Returns `Ok(0)` when nothing arrived in time. Any read failure, or a
    /// run of `MAX_EMPTY_READS` zero-byte reads, closes the port and leaves
    /// the link disconnected.
    pub async fn poll_readable(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;

        match timeout(wait, port.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) if !buf.is_empty() => {
                self.empty_reads += 1;
                if self.empty_reads < MAX_EMPTY_READS {
                    return Ok(0);
                }
                let reads = self.empty_reads;
                error!("Serial port returned no data {} times in a row, closing", reads);
                self.close();
                Err(LinkError::HungUp { reads })
            }
            Ok(Ok(n)) => {
                self.empty_reads = 0;
                Ok(n)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Ok(Err(e)) => {
                error!("Serial read error: {}", e);
                self.close();
                Err(LinkError::Read(e))
            }
        }
    }
}
