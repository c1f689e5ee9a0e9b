//! # Power Indicator Link
//!
//! Background service that connects a USB-serial mains power indicator to
//! host power management. After a reset handshake the device reports power
//! loss and restore; on loss the host is suspended after a short debounce
//! unless someone is using it.
//!
//! - [`serial`]: discovery, wire constants, line protocol, line reassembly
//!   and the ordered dispatch queue
//! - [`device`]: handshake, line handling and the service lifecycle
//! - [`power`]: host collaborators and the suspend state machine
//! - [`config`]: the daemon configuration file

pub mod config;
pub mod device;
pub mod power;
pub mod serial;

use anyhow::Context;

use config::DaemonConfig;
use device::{DeviceError, LinkService};

/// Run the service until a shutdown signal arrives or the device goes away
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    log::info!("Started Power Indicator Link Service.");

    let mut service = match LinkService::start(&config).await {
        Ok(service) => service,
        Err(e) => {
            log::info!("Stopped Power Indicator Link Service.");
            return Err(anyhow::Error::new(e)).context(startup_context(&config));
        }
    };

    let link_lost = tokio::select! {
        _ = shutdown_signal() => false,
        _ = service.wait_link_lost() => true,
    };

    service.stop().await;
    log::info!("Stopped Power Indicator Link Service.");

    if link_lost {
        anyhow::bail!("lost connection to the power indicator on {}", service.port_name());
    }
    Ok(())
}

fn startup_context(config: &DaemonConfig) -> String {
    match &config.port {
        Some(port) => format!("failed to start power indicator link on {}", port),
        None => format!(
            "failed to start power indicator link (USB {:04X}:{:04X})",
            config.usb_vid, config.usb_pid
        ),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Whether a startup error means the device was simply absent
pub fn is_device_missing(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<DeviceError>(), Some(DeviceError::NotFound))
}
