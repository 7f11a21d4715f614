use embassy_time::Duration;

use crate::config::{AppConfig, BUILD_VERSION, DeviceIdentity, OtaConfig, WifiConfig};

pub const APP: AppConfig = AppConfig {
    wifi: WifiConfig {
        ssid: env!("WIFI_SSID"),
        password: env!("WIFI_PASSWORD"),
    },
    device: DeviceIdentity {
        name: "MyrtIO OTA",
        hostname: "myrtio-ota",
        version: BUILD_VERSION,
    },
    ota: OtaConfig {
        http_port: 80,
        restart_delay: Duration::from_secs(1),
    },
};
