use clap::{Parser, Subcommand};
use midi_port_driver::config::ConfigLoader;
use midi_port_driver::{Direction, Driver, InPort, OutPort, Port};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "List, monitor and drive MIDI ports.",
    long_about = "Small front end for the midi_port_driver library. Every port opened by a command is closed through the driver on exit, including on Ctrl+C."
)]
struct Args {
    /// Configuration file to use instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, overrides the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List input and output ports.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print inbound messages of an input port until Ctrl+C.
    Monitor {
        /// Port number or part of its name.
        #[arg(short, long)]
        port: String,
        /// Stop after this many seconds.
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Send one message to an output port.
    Send {
        /// Port number or part of its name.
        #[arg(short, long)]
        port: String,
        /// Message bytes in hex, e.g. `90 3c 64`.
        #[arg(required = true)]
        bytes: Vec<String>,
    },
    /// Play notes on an output and read them back from an input.
    ///
    /// The two ports must be connected, either physically or through a
    /// virtual MIDI through port.
    Loopback {
        /// Input port number or part of its name.
        #[arg(short, long, default_value = "0")]
        input: String,
        /// Output port number or part of its name.
        #[arg(short, long, default_value = "0")]
        output: String,
    },
    /// Write the effective configuration, after env overrides, to a TOML file.
    WriteConfig {
        /// Destination file. Parent directories are created.
        path: PathBuf,
    },
}

#[derive(Serialize)]
struct PortInfo {
    direction: Direction,
    number: usize,
    name: String,
}

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> AppResult<()> {
    let args = Args::parse();
    let mut loader = load_config(args.config.as_ref())?;
    if let Some(level) = args.log_level.clone() {
        loader.config_mut().logging.level = level;
    }
    let config = loader.config();
    midi_port_driver::logging::init(&config.logging);

    let driver = Driver::midir(&config.driver);
    info!(driver = %driver, client = driver.client_name(), "MIDI driver ready");

    let outcome = run(&driver, &loader, args.command).await;

    // Closes whatever the command left open.
    if let Err(e) = driver.close() {
        warn!(error = %e, "errors while closing MIDI ports");
    }
    outcome
}

fn load_config(path: Option<&PathBuf>) -> AppResult<ConfigLoader> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader)
}

async fn run(driver: &Driver, loader: &ConfigLoader, command: Command) -> AppResult<()> {
    match command {
        Command::List { json } => list(driver, json),
        Command::Monitor { port, seconds } => monitor(driver, &port, seconds).await,
        Command::Send { port, bytes } => {
            let message = parse_hex(&bytes)?;
            let out = resolve_out(driver, &port)?;
            out.open()?;
            out.send(&message)?;
            println!("sent {} byte(s) to {}", message.len(), out);
            Ok(())
        }
        Command::Loopback { input, output } => loopback(driver, &input, &output).await,
        Command::WriteConfig { path } => {
            loader.save_to(&path)?;
            println!("wrote configuration to {}", path.display());
            Ok(())
        }
    }
}

fn list(driver: &Driver, json: bool) -> AppResult<()> {
    let ins = driver.ins()?;
    let outs = driver.outs()?;
    let ports: Vec<PortInfo> = ins
        .iter()
        .map(|p| port_info(p))
        .chain(outs.iter().map(|p| port_info(p)))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No MIDI ports found.");
    }
    for port in &ports {
        println!("{:>3}  {:<3}  {}", port.number, port.direction, port.name);
    }
    Ok(())
}

fn port_info(port: &dyn Port) -> PortInfo {
    PortInfo {
        direction: port.direction(),
        number: port.number(),
        name: port.name().to_string(),
    }
}

async fn monitor(driver: &Driver, query: &str, seconds: Option<u64>) -> AppResult<()> {
    let port = resolve_in(driver, query)?;
    port.open()?;
    let rx = port.subscribe(1024)?;
    println!("Monitoring {} (Ctrl+C to stop)", port);

    // Ends when the port is closed and drops the sending side.
    let printer = tokio::task::spawn_blocking(move || {
        for message in rx.iter() {
            println!("{:>10} us  {}", message.delta_micros, to_hex(&message.bytes));
        }
    });

    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {},
                _ = shutdown_signal() => {},
            }
        }
        None => shutdown_signal().await,
    }

    port.close()?;
    printer.await?;
    Ok(())
}

async fn loopback(driver: &Driver, input: &str, output: &str) -> AppResult<()> {
    let port_in = resolve_in(driver, input)?;
    let port_out = resolve_out(driver, output)?;
    port_in.open()?;
    port_out.open()?;
    let rx = port_in.subscribe(64)?;

    let messages: [[u8; 3]; 4] = [
        [0x90, 60, 100],
        [0x80, 60, 0],
        // channel 2
        [0x91, 70, 100],
        [0x81, 70, 0],
    ];
    for message in &messages {
        port_out.send(message)?;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let received: Vec<_> = rx.try_iter().collect();
    for message in &received {
        println!("{:>10} us  {}", message.delta_micros, to_hex(&message.bytes));
    }
    println!(
        "received {} of {} message(s) on {}",
        received.len(),
        messages.len(),
        port_in
    );
    Ok(())
}

fn resolve_in(driver: &Driver, query: &str) -> AppResult<InPort> {
    if let Ok(number) = query.parse::<usize>() {
        return driver
            .ins()?
            .into_iter()
            .nth(number)
            .ok_or_else(|| format!("no MIDI in port {}", number).into());
    }
    Ok(driver.find_in(query)?)
}

fn resolve_out(driver: &Driver, query: &str) -> AppResult<OutPort> {
    if let Ok(number) = query.parse::<usize>() {
        return driver
            .outs()?
            .into_iter()
            .nth(number)
            .ok_or_else(|| format!("no MIDI out port {}", number).into());
    }
    Ok(driver.find_out(query)?)
}

/// Parse hex bytes given as separate words or run together (`903c64`).
fn parse_hex(words: &[String]) -> AppResult<Vec<u8>> {
    let digits: String = words
        .iter()
        .flat_map(|w| w.split(|c: char| c == ',' || c.is_whitespace()))
        .map(|w| w.trim_start_matches("0x"))
        .collect();
    if digits.is_empty() || !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(format!("expected an even number of hex digits, got '{}'", digits).into());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = &digits[i..i + 2];
            u8::from_str_radix(pair, 16)
                .map_err(|e| format!("invalid hex byte '{}': {}", pair, e).into())
        })
        .collect::<AppResult<Vec<u8>>>()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, closing ports");
}
