use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use power_indicator_link::config::DaemonConfig;
use power_indicator_link::serial::SerialInterface;

#[derive(Debug, Parser)]
#[command(name = "power-indicator-link", version, about = "Suspend the host when the power indicator reports mains loss")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to use instead of USB discovery
    #[arg(short, long)]
    port: Option<String>,

    /// Log suspend requests instead of suspending
    #[arg(long)]
    dry_run: bool,

    /// Print matching serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `power_indicator_link=trace`
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.port = Some(port.clone());
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    Ok(config)
}

fn list_ports(config: &DaemonConfig) -> anyhow::Result<()> {
    let interface = SerialInterface::new(config.usb_vid, config.usb_pid, config.baud_rate);
    let devices = interface.discover_devices().context("enumerating serial ports")?;

    if devices.is_empty() {
        println!("No power indicator found (USB {:04X}:{:04X})", config.usb_vid, config.usb_pid);
    }
    for device in devices {
        println!(
            "{}\t{:04X}:{:04X}\t{}\t{}",
            device.port_name,
            device.vid,
            device.pid,
            device.product.as_deref().unwrap_or("-"),
            device.serial_number.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &cli.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.list_ports {
        return match list_ports(&config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    match power_indicator_link::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            if power_indicator_link::is_device_missing(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
