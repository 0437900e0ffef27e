use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tempfile::{tempdir, TempDir};
use tokio::io::{duplex, AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::time::{Duration, Instant};

use baro_logger::serial::{LinkState, PortOpener};
use baro_logger::storage::{self, History};
use baro_logger::{Command, Engine, EngineConfig, LoopControl, Quantity, Reading};

const WALL: i64 = 1_700_000_000;

/// Fake device directory: tests plug devices in and keep the far end of each opened port
#[derive(Clone, Default)]
struct Bench {
    present: Rc<RefCell<HashSet<PathBuf>>>,
    refuse: Rc<RefCell<HashSet<u32>>>,
    device: Rc<RefCell<Option<DuplexStream>>>,
    failing: Rc<Cell<bool>>,
}

/// Engine end of a fake port; reads fail while the bench is failing
struct BenchPort {
    stream: DuplexStream,
    failing: Rc<Cell<bool>>,
}

impl AsyncRead for BenchPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.failing.get() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "device removed")));
        }
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl Bench {
    fn plug(&self) {
        self.present
            .borrow_mut()
            .insert(PathBuf::from("/dev/ttyACM0"));
    }

    fn unplug(&self) {
        self.present.borrow_mut().clear();
        self.device.borrow_mut().take();
    }

    async fn send(&self, bytes: &[u8]) {
        let mut device = self.device.borrow_mut().take().expect("port not open");
        device.write_all(bytes).await.unwrap();
        *self.device.borrow_mut() = Some(device);
    }
}

impl PortOpener for Bench {
    type Port = BenchPort;

    fn exists(&self, path: &Path) -> bool {
        self.present.borrow().contains(path)
    }

    fn open(&self, path: &Path, baud: u32) -> io::Result<BenchPort> {
        if !self.exists(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unplugged"));
        }
        if self.refuse.borrow().contains(&baud) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unsupported baud"));
        }
        let (engine_end, device_end) = duplex(1024);
        *self.device.borrow_mut() = Some(device_end);
        Ok(BenchPort {
            stream: engine_end,
            failing: self.failing.clone(),
        })
    }
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        data_dir: dir.path().to_path_buf(),
        data_file: "data.csv".into(),
        save_interval: Duration::from_secs(30),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn readings_flow_from_port_into_history() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    assert_eq!(engine.status().state, LinkState::Connected);
    assert!(engine.alerts().is_empty());

    bench.send(b"Temp: 23.5 C\nPres: 10").await;
    engine.tick(start, WALL).await;
    assert!(engine.history().is_empty());

    bench.send(b"12.3 hPa\n").await;
    engine.tick(start, WALL + 1).await;
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.latest(), Some(&Reading::new(23.5, 1012.3, WALL + 1)));

    bench.send(b"Temp: 999 C\n").await;
    engine.tick(start, WALL + 2).await;
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.alerts().transient().count(), 1);

    let stats = engine.statistics(WALL + 2);
    assert_eq!(stats.count, 1);
    assert_eq!(stats.avg_press, 1012.3);
    assert_eq!(
        engine.history().smoothed(Quantity::Temperature, 0),
        Ok(23.5)
    );
}

#[tokio::test]
async fn pause_stops_reading_and_saving() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    assert_eq!(engine.handle(Command::TogglePause, start), LoopControl::Continue);
    assert!(engine.is_paused());

    bench.send(b"Temp: 20\nPres: 1000\n").await;
    engine.tick(start + Duration::from_secs(60), WALL).await;
    assert!(engine.history().is_empty());
    assert!(!dir.path().join("data.csv").exists());

    engine.handle(Command::TogglePause, start);
    engine.tick(start + Duration::from_secs(61), WALL).await;
    assert_eq!(engine.history().len(), 1);
    assert!(dir.path().join("data.csv").exists());
}

#[tokio::test]
async fn autosave_then_restart_restores_history() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    bench
        .send(b"Temp: 20\nPres: 1000\nTemp: 21\nPres: 1001\n")
        .await;
    engine.tick(start + Duration::from_secs(29), WALL).await;
    assert!(!dir.path().join("data.csv").exists());

    engine.tick(start + Duration::from_secs(30), WALL).await;
    let mut saved = History::new();
    let summary = storage::load(
        &dir.path().join("data.csv"),
        &mut saved,
        ',',
        &Default::default(),
        WALL,
    )
    .unwrap();
    assert_eq!(summary.loaded, 2);

    let mut restarted = Engine::new(config(&dir), bench.clone(), start);
    restarted.start(start, WALL + 10);
    let restored: Vec<_> = restarted.history().iter().copied().collect();
    assert_eq!(
        restored,
        [
            Reading::new(20.0, 1000.0, WALL),
            Reading::new(21.0, 1001.0, WALL)
        ]
    );
}

#[tokio::test]
async fn missing_device_gives_up_until_manual_reconnect() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    assert_eq!(engine.alerts().persistent().count(), 1);

    for i in 0..12u32 {
        engine.tick(start + Duration::from_secs(5) * i, WALL).await;
    }
    let status = engine.status();
    assert_eq!(status.attempts, 10);
    assert!(status.gave_up);
    assert_eq!(status.state, LinkState::Disconnected);
    assert!(engine
        .alerts()
        .persistent()
        .any(|m| m.contains("Giving up after 10")));

    bench.plug();
    engine.tick(start + Duration::from_secs(100), WALL).await;
    assert_eq!(engine.status().attempts, 10);

    engine.handle(Command::Reconnect, start + Duration::from_secs(101));
    let status = engine.status();
    assert_eq!(status.state, LinkState::Connected);
    assert_eq!(status.attempts, 0);
    assert!(engine.alerts().is_empty());
}

#[tokio::test]
async fn unplugged_device_drops_link_and_reconnects() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);

    bench.unplug();
    // Each tick reads end of stream once; the third in a row is a hang-up
    engine.tick(start, WALL).await;
    engine.tick(start, WALL).await;
    assert_eq!(engine.status().state, LinkState::Connected);
    engine.tick(start, WALL).await;
    assert_eq!(engine.status().state, LinkState::Disconnected);
    assert!(engine.alerts().transient().any(|m| m.contains("hung up")));

    engine.tick(start + Duration::from_secs(5), WALL).await;
    assert_eq!(engine.status().state, LinkState::Disconnected);
    assert_eq!(engine.status().attempts, 1);

    bench.plug();
    engine.tick(start + Duration::from_secs(10), WALL).await;
    assert_eq!(engine.status().state, LinkState::Connected);
    assert_eq!(engine.status().attempts, 0);
}

#[tokio::test]
async fn read_error_drops_link_until_cooldown_passes() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    assert_eq!(engine.status().state, LinkState::Connected);

    bench.failing.set(true);
    engine.tick(start + Duration::from_secs(1), WALL).await;
    assert_eq!(engine.status().state, LinkState::Disconnected);
    assert!(engine
        .alerts()
        .transient()
        .any(|m| m.starts_with("Serial read error")));

    bench.failing.set(false);
    engine.tick(start + Duration::from_secs(4), WALL).await;
    assert_eq!(engine.status().state, LinkState::Disconnected);

    engine.tick(start + Duration::from_secs(5), WALL).await;
    assert_eq!(engine.status().state, LinkState::Connected);
    bench.send(b"Temp: 20\nPres: 1000\n").await;
    engine.tick(start + Duration::from_secs(6), WALL).await;
    assert_eq!(engine.history().len(), 1);
}

#[tokio::test]
async fn missing_device_at_startup_raises_one_alert() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    engine.tick(start, WALL).await;
    engine.tick(start + Duration::from_secs(1), WALL).await;

    let persistent: Vec<_> = engine.alerts().persistent().collect();
    assert_eq!(persistent, ["No serial port available"]);
    assert_eq!(engine.status().attempts, 1);
}

#[tokio::test]
async fn reconnect_at_fallback_baud_updates_config() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    assert_eq!(engine.status().baud, 9600);

    bench.refuse.borrow_mut().insert(9600);
    bench.failing.set(true);
    engine.tick(start, WALL).await;
    bench.failing.set(false);
    engine.tick(start + Duration::from_secs(5), WALL).await;

    let status = engine.status();
    assert_eq!(status.state, LinkState::Connected);
    assert_eq!(status.baud, 115200);
    assert_eq!(engine.config().baud_rate, 115200);
}

#[tokio::test]
async fn baud_change_reopens_at_new_rate() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);

    engine.handle(Command::SetBaud(115200), start);
    assert_eq!(engine.status().baud, 115200);
    assert_eq!(engine.status().state, LinkState::Connected);

    engine.handle(Command::SetBaud(4800), start);
    assert_eq!(engine.status().baud, 115200);
    assert!(engine
        .alerts()
        .transient()
        .any(|m| m == "Unsupported baud rate: 4800"));
}

#[tokio::test]
async fn shutdown_saves_and_quit_is_a_value() {
    let dir = tempdir().unwrap();
    let bench = Bench::default();
    bench.plug();
    let start = Instant::now();

    let mut engine = Engine::new(config(&dir), bench.clone(), start);
    engine.start(start, WALL);
    bench.send(b"Temp: 20\nPres: 1000\nTemp: 2").await;
    engine.tick(start, WALL).await;

    assert_eq!(engine.handle(Command::Quit, start), LoopControl::Quit);
    let path = engine.shutdown().unwrap();
    assert_eq!(fs::read_to_string(path).unwrap(), "20,1000,1700000000\n");
}
