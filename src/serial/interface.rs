use std::time::Duration;
use serialport::SerialPortType;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{ClearBuffer, Parity, SerialPort, SerialPortBuilderExt, SerialStream};

use super::{Result, SerialDeviceInfo, SerialError};

// Power indicator identifiers (SAMD21-based CircuitPython board)
pub const POWER_INDICATOR_VID: u16 = 0x239A; // Adafruit
pub const POWER_INDICATOR_PID: u16 = 0x8021;
pub const BAUD_RATE: u32 = 9600;

/// Discovery and opening of the power indicator's serial port
pub struct SerialInterface {
    vid: u16,
    pid: u16,
    baud_rate: u32,
}

impl SerialInterface {
    pub fn new(vid: u16, pid: u16, baud_rate: u32) -> Self {
        Self { vid, pid, baud_rate }
    }

    /// Discover all ports whose USB identifier matches the indicator
    pub fn discover_devices(&self) -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                if usb_info.vid == self.vid && usb_info.pid == self.pid {
                    devices.push(SerialDeviceInfo {
                        port_name: port.port_name.clone(),
                        vid: usb_info.vid,
                        pid: usb_info.pid,
                        serial_number: usb_info.serial_number.clone(),
                        manufacturer: usb_info.manufacturer.clone(),
                        product: usb_info.product.clone(),
                    });
                }
            }
        }

        Ok(devices)
    }

    /// Port name of the first matching device, if any
    pub fn find_device_port(&self) -> Result<Option<String>> {
        let devices = self.discover_devices()?;
        if devices.len() > 1 {
            log::warn!(
                "{} power indicators found, using {}",
                devices.len(),
                devices[0].port_name
            );
        }
        Ok(devices.into_iter().next().map(|d| d.port_name))
    }

    /// Open the port, assert DTR and drop anything already buffered
    pub fn open(&self, port_name: &str) -> Result<SerialStream> {
        let mut stream = tokio_serial::new(port_name, self.baud_rate)
            .parity(Parity::None)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        stream
            .write_data_terminal_ready(true)
            .map_err(|e| SerialError::ConnectionFailed(e.to_string()))?;
        stream
            .clear(ClearBuffer::All)
            .map_err(|e| SerialError::ConnectionFailed(e.to_string()))?;

        log::info!("Opened {} at {} baud", port_name, self.baud_rate);
        Ok(stream)
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new(POWER_INDICATOR_VID, POWER_INDICATOR_PID, BAUD_RATE)
    }
}

/// Write raw bytes to the device and flush them out
pub async fn send_data<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    log::trace!("tx {}", hex::encode(data));
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}
