use embassy_time::Duration;

pub(crate) const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Credentials of the Wi-Fi network to join.
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

/// How the device presents itself on the network.
#[derive(Debug, Clone, Copy)]
pub struct DeviceIdentity {
    pub name: &'static str,
    pub hostname: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct OtaConfig {
    pub http_port: u16,
    /// Delay between the success response and the restart.
    pub restart_delay: Duration,
}

/// Build-time configuration handed to the composition root.
#[derive(Debug, Clone, Copy)]
pub struct AppConfig {
    pub wifi: WifiConfig,
    pub device: DeviceIdentity,
    pub ota: OtaConfig,
}
