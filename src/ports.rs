//! Serial port listing for the ADB tab.
//!
//! Port descriptions reported by Windows drivers often repeat the device name
//! (`USB-SERIAL CH340 (COM3COM3)`), so each entry is cleaned before display.

use serialport::{SerialPortInfo, SerialPortType};

use crate::process::ScriptKind;
use crate::sink::{LogChannel, LogSink};

/// The fields of a serial port that end up in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub device: String,
    pub description: String,
    /// USB vendor and product id.
    pub usb_id: Option<(u16, u16)>,
}

impl From<SerialPortInfo> for PortEntry {
    fn from(info: SerialPortInfo) -> Self {
        let (description, usb_id) = match info.port_type {
            SerialPortType::UsbPort(usb) => (
                usb.product.or(usb.manufacturer).unwrap_or_default(),
                Some((usb.vid, usb.pid)),
            ),
            SerialPortType::PciPort => ("PCI".to_string(), None),
            SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
            _ => (String::new(), None),
        };
        Self {
            device: info.port_name,
            description,
            usb_id,
        }
    }
}

/// Enumerates the serial ports of this machine.
pub fn list_ports() -> serialport::Result<Vec<PortEntry>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortEntry::from)
        .collect())
}

/// Scans the serial ports and logs the result to the ADB view. Blocks while
/// the system is queried.
pub fn scan_ports(sink: &LogSink) {
    let channel = LogChannel::named(ScriptKind::AdbCheck.channel());
    sink.info(&channel, "Scan COM ports...");
    let ports = list_ports();
    report_ports(sink, &channel, ports);
}

fn report_ports(sink: &LogSink, channel: &LogChannel, ports: serialport::Result<Vec<PortEntry>>) {
    match ports {
        Ok(ports) if ports.is_empty() => sink.warning(channel, "No COM ports found"),
        Ok(ports) => {
            sink.info(channel, &format!("Found {} COM ports:", ports.len()));
            for port in &ports {
                sink.info(channel, &format!("  {}", format_port_line(port)));
            }
        }
        Err(err) => {
            tracing::debug!("serial port enumeration failed: {:?}", err);
            sink.error(channel, &format!("Scan COM ports failed: {}", err));
        }
    }
}

/// Formats one port as `DEVICE - description  [VID:PID xxxx:xxxx]`.
///
/// The description is cut after a second mention of the device, before a
/// second ` - ` section and before the first `)`.
pub fn format_port_line(port: &PortEntry) -> String {
    let device = if port.device.is_empty() {
        "?"
    } else {
        port.device.as_str()
    };

    let doubled = format!("{device}{device}");
    let mut desc = port
        .description
        .replace(&format!("({doubled}"), &format!("({device}"));
    while desc.contains(&doubled) {
        desc = desc.replace(&doubled, device);
    }

    // ASCII lowercasing keeps byte offsets valid for `desc`.
    let lower_desc = desc.to_ascii_lowercase();
    let lower_dev = device.to_ascii_lowercase();
    if let Some(first) = lower_desc.find(&lower_dev) {
        let after_first = first + device.len();
        if let Some(second) = lower_desc[after_first..].find(&lower_dev) {
            desc.truncate(after_first + second + device.len());
        }
    }

    if let Some(first) = desc.find(" - ") {
        if let Some(second) = desc[first + 3..].find(" - ") {
            desc.truncate(first + 3 + second);
        }
    }
    if let Some(paren) = desc.find(')') {
        desc.truncate(paren);
    }

    let mut line = device.to_string();
    let desc = desc.trim();
    if !desc.is_empty() && !desc.eq_ignore_ascii_case(device) {
        line.push_str(" - ");
        line.push_str(desc);
    }
    if let Some((vid, pid)) = port.usb_id {
        line.push_str(&format!("  [VID:PID {vid:04X}:{pid:04X}]"));
    }
    line
}
