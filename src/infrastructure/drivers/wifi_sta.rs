use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::peripherals::WIFI;
use esp_radio::wifi::{
    AuthMethod,
    ClientConfig,
    Config,
    ModeConfig,
    WifiController,
    WifiDevice,
    WifiError,
    WifiEvent,
    WifiStaState,
};
use log::{info, warn};
use static_cell::make_static;

use super::random::get_seed;
use crate::{config::WifiConfig, infrastructure::services::LinkMonitor};

/// Maximum length of the hostname
const MAX_HOSTNAME_LEN: usize = 32;

/// Two HTTP workers plus DHCP and headroom
const MAX_NETWORK_CONNECTIONS: usize = 4;

const RECONNECT_DELAY: Duration = Duration::from_millis(5000);
const RSSI_INTERVAL: Duration = Duration::from_secs(10);

/// Type alias for the hostname
pub type Hostname = heapless::String<MAX_HOSTNAME_LEN>;

#[derive(Debug)]
pub enum WifiStartError {
    Radio(esp_radio::InitializationError),
    Wifi(WifiError),
    Hostname,
}

/// Start the Wi-Fi STA (Station) mode
///
/// It connects to the `WiFi` network and waits for the connection to be established.
/// If the connection is lost, it tries to reconnect.
pub async fn start_wifi_sta(
    spawner: Spawner,
    wifi_device: WIFI<'static>,
    wifi: WifiConfig,
    hostname: &str,
    link: &'static LinkMonitor,
) -> Result<Stack<'static>, WifiStartError> {
    let radio = esp_radio::init().map_err(WifiStartError::Radio)?;
    let esp_radio_ctrl = &*make_static!(radio);
    let (controller, interfaces) =
        esp_radio::wifi::new(esp_radio_ctrl, wifi_device, Config::default())
            .map_err(WifiStartError::Wifi)?;

    let mut dhcp_config = DhcpConfig::default();
    dhcp_config.hostname =
        Some(Hostname::try_from(hostname).map_err(|()| WifiStartError::Hostname)?);
    let net_config = embassy_net::Config::dhcpv4(dhcp_config);

    let network_resources =
        make_static!(StackResources::<{ MAX_NETWORK_CONNECTIONS }>::new());
    let (stack, runner) =
        embassy_net::new(interfaces.sta, net_config, network_resources, get_seed());

    spawner
        .spawn(wifi_connection_task(controller, wifi, link))
        .ok();
    spawner.spawn(network_runner_task(runner)).ok();

    let ip = wait_for_connection(stack).await;
    info!("network: got address {}", ip.address);

    Ok(stack)
}

fn client_config(wifi: &WifiConfig) -> ClientConfig {
    let config = ClientConfig::default().with_ssid(wifi.ssid.into());
    if wifi.password.is_empty() {
        config.with_auth_method(AuthMethod::None)
    } else {
        config.with_password(wifi.password.into())
    }
}

/// Background task for connecting to the `WiFi` network and reconnecting if needed
///
/// While associated it samples the signal strength into `link`.
#[embassy_executor::task]
async fn wifi_connection_task(
    mut controller: WifiController<'static>,
    wifi: WifiConfig,
    link: &'static LinkMonitor,
) {
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            link.set_connected(true);
            // Wait until we're no longer connected
            loop {
                match select(
                    controller.wait_for_event(WifiEvent::StaDisconnected),
                    Timer::after(RSSI_INTERVAL),
                )
                .await
                {
                    Either::First(()) => break,
                    Either::Second(()) => {
                        if let Ok(rssi) = controller.rssi() {
                            link.set_rssi(rssi);
                        }
                    }
                }
            }
            link.set_connected(false);
            warn!("network: disconnected");
            Timer::after(Duration::from_millis(2000)).await;
        }
        if !matches!(controller.is_started(), Ok(true)) {
            let mode_config = ModeConfig::Client(client_config(&wifi));
            if let Err(e) = controller.set_config(&mode_config) {
                warn!("network: invalid client config: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            if let Err(e) = controller.start_async().await {
                warn!("network: error starting: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
        }

        info!("network: connecting to {}", wifi.ssid);
        match controller.connect_async().await {
            Ok(()) => {
                if let Ok(rssi) = controller.rssi() {
                    link.set_rssi(rssi);
                }
            }
            Err(e) => {
                warn!("network: error connecting: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Background task for running the network stack
#[embassy_executor::task]
async fn network_runner_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Wait for full network connectivity (link + IP address)
/// Returns the obtained IPv4 configuration
async fn wait_for_connection(stack: Stack<'_>) -> embassy_net::StaticConfigV4 {
    // Wait for the network link to become active
    loop {
        if stack.is_link_up() {
            break;
        }
        Timer::after(Duration::from_millis(100)).await;
    }

    // Wait for the network stack to obtain an IPv4 address via DHCP
    loop {
        if let Some(config) = stack.config_v4() {
            return config;
        }
        Timer::after(Duration::from_millis(100)).await;
    }
}
