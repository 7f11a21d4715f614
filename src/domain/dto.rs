use heapless::String;
use serde::Serialize;

/// Textual IPv4 address, `0.0.0.0` while no lease is held.
pub type IpString = String<15>;

/// Colon separated station MAC address.
pub type MacString = String<17>;

/// Snapshot served by `GET /info`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub ip: IpString,
    pub mac: MacString,
    /// Seconds since boot.
    pub uptime: u64,
    /// Signal strength of the access point in dBm, `0` when not associated.
    pub rssi: i32,
}
