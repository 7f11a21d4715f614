use core::fmt::Write as _;

use embassy_net::Stack;
use embassy_time::Instant;
use heapless::String;

use super::link::LinkMonitor;
use crate::{
    config::DeviceIdentity,
    domain::{
        dto::{DeviceInfo, IpString, MacString},
        ports::DeviceInfoReader,
    },
};

/// Device info assembled from the network stack, efuses and the link monitor.
pub struct EspDeviceInfo {
    stack: Stack<'static>,
    identity: DeviceIdentity,
    link: &'static LinkMonitor,
}

impl EspDeviceInfo {
    pub fn new(stack: Stack<'static>, identity: DeviceIdentity, link: &'static LinkMonitor) -> Self {
        Self {
            stack,
            identity,
            link,
        }
    }

    fn ip(&self) -> IpString {
        let mut ip = String::new();
        let _ = match self.stack.config_v4() {
            Some(config) => write!(ip, "{}", config.address.address()),
            None => ip.push_str("0.0.0.0").map_err(|()| core::fmt::Error),
        };
        ip
    }
}

impl DeviceInfoReader for EspDeviceInfo {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.identity.name,
            version: self.identity.version,
            ip: self.ip(),
            mac: format_mac(&esp_hal::efuse::Efuse::mac_address()),
            uptime: Instant::now().as_secs(),
            rssi: self.link.rssi(),
        }
    }
}

fn format_mac(mac: &[u8]) -> MacString {
    let mut out = String::new();
    for (i, byte) in mac.iter().enumerate() {
        let sep = if i == 0 { "" } else { ":" };
        let _ = write!(out, "{sep}{byte:02X}");
    }
    out
}
