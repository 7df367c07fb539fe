#[cfg(any(windows, test))]
mod demo;

use anyhow::{Context, Result};
use ble_ir_sender::domain::settings::{DriverConfig, SettingsService};
use ble_ir_sender::infrastructure::logging::init_logger;
use ble_ir_sender::BleAddress;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

/// Interactive test harness for a BLE infrared blaster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device address (AA:BB:CC:DD:EE:FF); saved as the default for later runs
    #[arg(short, long)]
    address: Option<String>,

    /// Settings file to use instead of the per-user one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "ble_ir_sender=trace"
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings_service = match &args.config {
        Some(path) => SettingsService::from_path(path.clone()),
        None => SettingsService::new()?,
    };
    let _logging = init_logger(
        &settings_service.get().log_settings,
        args.log_level.as_deref(),
    )?;
    info!("Starting BLE IR sender {}", env!("CARGO_PKG_VERSION"));
    info!("Settings: {}", settings_service.path().display());

    let address: BleAddress = match &args.address {
        Some(given) => {
            let address: BleAddress = given.parse()?;
            // An explicit address becomes the default for later runs
            match settings_service.set_device_address(&address.to_string()) {
                Ok(true) => info!("Saved {} as the default device", address),
                Ok(false) => {}
                Err(e) => warn!("Could not save device address: {}", e),
            }
            address
        }
        None => settings_service
            .get()
            .device_address
            .as_deref()
            .context("no device address; pass --address or set device_address in the settings file")?
            .parse()?,
    };

    run(address, settings_service.get().driver_config()).await
}

#[cfg(windows)]
async fn run(address: BleAddress, config: DriverConfig) -> Result<()> {
    use ble_ir_sender::infrastructure::bluetooth::WinRtTransport;
    use ble_ir_sender::BleIrDriver;

    println!("connecting to {} (Ctrl-C to abort)...", address);
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let driver = BleIrDriver::connect(WinRtTransport::new(), address, config, cancel).await?;
    println!("connected");

    let result = repl(&driver).await;
    driver.shutdown().await;
    println!("bye");
    result
}

#[cfg(not(windows))]
async fn run(address: BleAddress, _config: DriverConfig) -> Result<()> {
    tracing::error!("No Bluetooth backend is available on this platform");
    anyhow::bail!(
        "cannot connect to {}: only the Windows backend is bundled",
        address
    )
}

#[cfg(windows)]
async fn repl(driver: &ble_ir_sender::BleIrDriver) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("commands: send, version, state, exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "send" => {
                println!("sending...");
                match driver.send_infrared(&demo::demo_pulses_ns()).await {
                    Ok(()) => println!("sent"),
                    Err(e) => println!("error: {}", e),
                }
            }
            "version" => match driver.get_firmware_version().await {
                Ok(version) => println!("version: {}", version),
                Err(e) => println!("error: {}", e),
            },
            "state" => println!("state: {}", driver.connection_state()),
            "exit" | "quit" => {
                println!("shutting down...");
                break;
            }
            other => println!("unknown command: {}", other),
        }
    }
    Ok(())
}
