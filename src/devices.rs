use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::error::Error;

/// The kind of bus a serial device sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// USB, e.g. a CDC ACM device or a USB-serial adapter.
    Usb,

    /// PCI.
    Pci,

    /// Bluetooth.
    Bluetooth,

    /// The platform could not tell.
    Unknown,
}

/// A serial device available on the host.
///
/// Fields the platform does not know about are left out when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// The path used to open the device, e.g. `/dev/ttyACM0` or `COM3`.
    pub path: String,

    /// See [`PortType`].
    pub port_type: PortType,

    /// The manufacturer as reported by USB descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// The product as reported by USB descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,

    /// The USB serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// USB vendor id, as four lowercase hex digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,

    /// USB product id, as four lowercase hex digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl DeviceInfo {
    /// A device only known by its path.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.into(),
            port_type: PortType::Unknown,
            manufacturer: None,
            product: None,
            serial_number: None,
            vendor_id: None,
            product_id: None,
        }
    }
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl From<SerialPortInfo> for DeviceInfo {
    fn from(info: SerialPortInfo) -> Self {
        let mut device = DeviceInfo::new(&info.port_name);

        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                device.port_type = PortType::Usb;
                device.manufacturer = usb.manufacturer;
                device.product = usb.product;
                device.serial_number = usb.serial_number;
                device.vendor_id = Some(format!("{:04x}", usb.vid));
                device.product_id = Some(format!("{:04x}", usb.pid));
            }
            SerialPortType::PciPort => device.port_type = PortType::Pci,
            SerialPortType::BluetoothPort => device.port_type = PortType::Bluetooth,
            SerialPortType::Unknown => {}
        }

        device
    }
}

/// Something able to list the serial devices of the host.
///
/// Listing may block, so callers should not call this from within async code directly.
pub trait DeviceEnumerator: Send + Sync {
    /// List the devices.
    /// Having no devices is not an error.
    fn list(&self) -> Result<Vec<DeviceInfo>, Error>;
}

/// Lists the actual serial devices on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEnumerator;

impl DeviceEnumerator for NativeEnumerator {
    fn list(&self) -> Result<Vec<DeviceInfo>, Error> {
        let devices = serialport::available_ports()
            .map_err(|e| Error::Enumeration(e.to_string()))?
            .into_iter()
            .map(DeviceInfo::from)
            .collect::<Vec<_>>();

        debug!(devices = %devices.iter().join(", "), "Listed serial devices");

        Ok(devices)
    }
}
