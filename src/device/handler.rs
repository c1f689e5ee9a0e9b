use std::sync::Arc;

use super::LinkState;
use crate::power::SuspendController;
use crate::serial::dispatch::LineSink;
use crate::serial::protocol::{parse_line, DeviceEvent, DeviceResponse, ProtocolMessage};

/// Applies decoded device lines to the link state and the suspend timer
pub struct LineHandler {
    state: Arc<LinkState>,
    suspend: Arc<SuspendController>,
}

impl LineHandler {
    pub fn new(state: Arc<LinkState>, suspend: Arc<SuspendController>) -> Self {
        Self { state, suspend }
    }

    pub fn handle(&self, line: &str) {
        // Every line clears the reset flag; only START sets it again.
        self.state.clear_reset();

        let Some(message) = parse_line(line) else {
            log::debug!("Ignoring device line {:?}", line);
            return;
        };

        match message {
            ProtocolMessage::Event(event) => self.handle_event(event),
            ProtocolMessage::Response(response) => self.handle_response(response),
        }
    }

    fn handle_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Start => {
                log::debug!("Device reports START");
                self.state.confirm_reset();
            }
            DeviceEvent::PowerLost => {
                log::info!("Mains power has been lost.");
                self.state.set_mains_power(false);
                self.suspend.arm();
            }
            DeviceEvent::PowerRestored => {
                log::info!("Mains power has been restored.");
                self.state.set_mains_power(true);
                self.suspend.disarm();
            }
            DeviceEvent::RequestBlocking => {
                log::debug!("Device stopped reading requests");
            }
        }
    }

    fn handle_response(&self, response: DeviceResponse) {
        match response {
            DeviceResponse::PowerMonitorOn => {
                log::debug!("Device confirmed power monitoring");
                self.state.enable_monitor();
            }
            DeviceResponse::PowerOn => self.state.set_mains_power(true),
            DeviceResponse::PowerOff => self.state.set_mains_power(false),
            DeviceResponse::BlinkOn => log::debug!("Device blinking"),
            DeviceResponse::RequestUnrecognised | DeviceResponse::RequestError => {
                log::debug!("Device rejected a request: {:?}", response);
            }
        }
    }
}

impl LineSink for LineHandler {
    fn handle_line(&self, line: &str) {
        self.handle(line);
    }
}
