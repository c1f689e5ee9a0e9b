use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{DeviceError, HandshakeController, LineHandler, LinkState, Result};
use crate::config::DaemonConfig;
use crate::power::{
    create_host_power, create_power_mode_monitor, HostPower, PowerModeEvent, PowerModeMonitor,
    SuspendController,
};
use crate::serial::dispatch::{dispatch_queue, ConsumerExit, LineAssembler};
use crate::serial::SerialInterface;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A running link to the power indicator.
///
/// Exists only after a successful handshake. [`LinkService::stop`] tears
/// everything down in order: dispatch consumer, power notifications, suspend
/// timer, serial port.
pub struct LinkService {
    port_name: String,
    state: Arc<LinkState>,
    suspend: Arc<SuspendController>,
    cancel_tx: watch::Sender<bool>,
    consumer: Option<JoinHandle<ConsumerExit>>,
    power_monitor: Option<Box<dyn PowerModeMonitor>>,
    resume_task: Option<JoinHandle<()>>,
    writer: Option<BoxedWriter>,
    pump: Option<JoinHandle<()>>,
}

impl LinkService {
    /// Find the device, open it and bring the link up
    pub async fn start(config: &DaemonConfig) -> Result<Self> {
        let interface = SerialInterface::new(config.usb_vid, config.usb_pid, config.baud_rate);

        let port_name = match &config.port {
            Some(port) => port.clone(),
            None => match interface.find_device_port()? {
                Some(port) => port,
                None => {
                    log::error!("Could not find the serial port.");
                    return Err(DeviceError::NotFound);
                }
            },
        };
        log::info!("Found serial port: {}.", port_name);

        let stream = interface.open(&port_name).map_err(|e| DeviceError::Unavailable {
            port: port_name.clone(),
            reason: e.to_string(),
        })?;

        Self::start_with(
            port_name,
            stream,
            create_host_power(config),
            create_power_mode_monitor(config),
            config,
        )
        .await
    }

    /// Bring the link up over an already open byte stream
    pub async fn start_with<S>(
        port_name: String,
        stream: S,
        host: Arc<dyn HostPower>,
        mut power_monitor: Box<dyn PowerModeMonitor>,
        config: &DaemonConfig,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = Arc::new(LinkState::new());
        let suspend = SuspendController::new(host, config.suspend_policy());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let resume_task = power_monitor.get_receiver().map(|mut events| {
            let suspend = suspend.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        PowerModeEvent::Resume => {
                            log::info!("Host resumed, cancelling pending suspend");
                            suspend.disarm();
                        }
                    }
                }
            })
        });
        if let Err(e) = power_monitor.start().await {
            log::warn!("Host resume notifications unavailable: {}", e);
        }

        let handler = Arc::new(LineHandler::new(state.clone(), suspend.clone()));
        let (chunks, consumer) = dispatch_queue(
            LineAssembler::with_limit(config.max_pending_bytes),
            handler,
            cancel_rx,
        );
        let consumer = consumer.spawn();

        let (reader, mut writer) = tokio::io::split(stream);
        let pump = chunks.spawn_pump(reader);

        let outcome = HandshakeController::new(&mut writer, &state, config.handshake_timing())
            .run(config.query_power_state)
            .await;

        let mut service = Self {
            port_name,
            state,
            suspend,
            cancel_tx,
            consumer: Some(consumer),
            power_monitor: Some(power_monitor),
            resume_task,
            writer: Some(Box::new(writer)),
            pump: Some(pump),
        };

        if let Err(e) = outcome {
            match &e {
                DeviceError::Unresponsive => log::error!("Device not responding."),
                DeviceError::MonitorEnableFailed => log::error!("Could not start power monitoring."),
                other => log::error!("Device startup failed: {}", other),
            }
            service.stop().await;
            return Err(e);
        }

        log::info!("Power indicator link up on {}", service.port_name);
        Ok(service)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn state(&self) -> &Arc<LinkState> {
        &self.state
    }

    pub fn suspend_controller(&self) -> &Arc<SuspendController> {
        &self.suspend
    }

    /// Resolves when the serial read side ends, e.g. the device was unplugged
    pub async fn wait_link_lost(&mut self) {
        match self.pump.as_mut() {
            Some(pump) => {
                if let Err(e) = pump.await {
                    log::warn!("Serial reader ended abnormally: {}", e);
                }
                self.pump = None;
            }
            None => std::future::pending().await,
        }
    }

    /// Tear the link down; safe to call more than once
    pub async fn stop(&mut self) {
        self.cancel_tx.send_replace(true);
        if let Some(consumer) = self.consumer.take() {
            match consumer.await {
                Ok(exit) => log::debug!("Dispatch consumer finished: {:?}", exit),
                Err(e) => log::warn!("Dispatch consumer ended abnormally: {}", e),
            }
        }

        if let Some(mut monitor) = self.power_monitor.take() {
            if let Err(e) = monitor.stop().await {
                log::warn!("Failed to stop resume notifications: {}", e);
            }
        }
        if let Some(task) = self.resume_task.take() {
            task.abort();
        }

        self.suspend.dispose();

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                log::debug!("Closing serial writer: {}", e);
            }
        }

        log::info!("Stopped power indicator link on {}", self.port_name);
    }
}
