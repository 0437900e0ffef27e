use log::{error, info, warn};
use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};

use baro_logger::alerts::Severity;
use baro_logger::serial::{PortOpener, SystemPorts};
use baro_logger::utils::{format_timestamp, unix_now};
use baro_logger::{Command, Engine, EngineConfig, LoopControl};

const IDLE_WAIT_MS: u64 = 200;
const STATUS_INTERVAL_SECS: u64 = 60;

/// Map a console line to an engine command
fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "s" | "save" => Command::SaveNow,
        "p" | "pause" => Command::TogglePause,
        "c" | "clear" => Command::ClearErrors,
        "r" | "reconnect" => Command::Reconnect,
        "q" | "quit" => Command::Quit,
        "b" | "baud" => Command::SetBaud(words.next()?.parse().ok()?),
        _ => return None,
    };
    Some(command)
}

/// Forward console lines as commands until input closes or the engine is gone
fn console<R: BufRead>(input: R, tx: &mpsc::UnboundedSender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Some(command) => {
                if tx.send(command).is_err() {
                    break;
                }
            }
            None => warn!("Unknown command: {:?} (s, p, c, r, b <baud>, q)", line.trim()),
        }
    }
}

async fn main_loop<O: PortOpener>(
    engine: &mut Engine<O>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut last_status = Instant::now();

    loop {
        engine.tick(Instant::now(), unix_now()).await;

        while let Ok(command) = commands.try_recv() {
            if engine.handle(command, Instant::now()) == LoopControl::Quit {
                info!("Quit requested");
                return;
            }
        }

        if last_status.elapsed() >= Duration::from_secs(STATUS_INTERVAL_SECS) {
            last_status = Instant::now();
            let status = engine.status();
            let stats = engine.statistics(unix_now());
            info!(
                "Link {} ({} attempts) | {} readings | 5min: T(min/max/avg)={:.1}/{:.1}/{:.1} C, P(min/max/avg)={:.1}/{:.1}/{:.1} hPa",
                status.state,
                status.attempts,
                engine.history().len(),
                stats.min_temp,
                stats.max_temp,
                stats.avg_temp,
                stats.min_press,
                stats.max_press,
                stats.avg_press
            );
            if let Some(latest) = engine.latest() {
                info!("Last reading at {}", format_timestamp(latest.timestamp));
            }
            for message in engine.alerts().persistent() {
                warn!("Active error: {}", message);
            }
        }

        sleep(Duration::from_millis(IDLE_WAIT_MS)).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration; bad values are replaced by defaults
    let (mut config, mut warnings) = EngineConfig::from_env();
    warnings.extend(config.apply_args(std::env::args().skip(1)));

    let mut engine = Engine::new(config, SystemPorts, Instant::now());
    for warning in &warnings {
        engine.alert(warning.to_string(), Severity::Transient, Instant::now());
    }
    engine.start(Instant::now(), unix_now());

    // Console input on its own thread, outside the runtime
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || console(io::stdin().lock(), &tx));

    // Handle Ctrl+C gracefully
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = stop_tx.send(());
    });

    tokio::select! {
        _ = main_loop(&mut engine, rx) => {}
        Ok(()) = &mut stop_rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    match engine.shutdown() {
        Ok(path) => info!("Final save to {}", path.display()),
        Err(e) => error!("Final save failed: {}", e),
    }

    Ok(())
}
