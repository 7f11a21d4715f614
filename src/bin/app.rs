//! OTA Firmware
//!
//! Joins the configured Wi-Fi network and serves the update endpoint:
//! - `POST /update` streams a new image into the inactive OTA slot
//! - `GET /info` and `GET /status` report device state
//! - restarts into the new image once it is committed

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(target_os = "none")]
mod firmware {
    use embassy_executor::Spawner;
    use embassy_time::{Duration, Timer};
    use esp_alloc as _;
    use esp_backtrace as _;
    use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
    use esp_storage::FlashStorage;
    use log::{error, info, warn};
    use myrtio_esp_ota::{
        app::{DeviceUsecases, FirmwareUsecases},
        controllers::OtaHttpController,
        infrastructure::{
            config::APP,
            drivers::start_wifi_sta,
            services::{EspDeviceInfo, EspOtaPartitions, LINK, init_restart_service},
            tasks::{HTTP_WORKERS, http_server_task},
            types::{
                DeviceUsecasesImpl,
                FirmwareUsecasesImpl,
                OtaController,
                OtaUpdateController,
            },
        },
        mk_static,
    };
    use myrtio_ota::FlashStagingStore;

    esp_bootloader_esp_idf::esp_app_desc!();

    #[esp_rtos::main]
    async fn main(spawner: Spawner) -> ! {
        esp_println::logger::init_logger_from_env();
        info!("{} {}", APP.device.name, APP.device.version);

        // Initialize hardware
        let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
        let peripherals = esp_hal::init(config);

        // Allocate heap memory for the Wi-Fi driver (64 + 32 KB)
        esp_alloc::heap_allocator!(
            #[unsafe(link_section = ".dram2_uninit")] size: 64 * 1024
        );
        esp_alloc::heap_allocator!(size: 32 * 1024);

        // Start rtos
        let timg0 = TimerGroup::new(peripherals.TIMG0);
        esp_rtos::start(timg0.timer0);

        // Update controller owns the flash
        let mut partitions = EspOtaPartitions::new(FlashStorage::new(peripherals.FLASH));
        match partitions.adopt_running_slot() {
            Ok(slot) => info!("ota: running from {:?}", slot),
            Err(e) => warn!("ota: running slot unknown: {:?}", e),
        }
        let controller = mk_static!(
            OtaController,
            OtaController::new(OtaUpdateController::new(FlashStagingStore::new(partitions)))
        );

        let restart = init_restart_service(spawner);

        // Wait for network connection before serving requests
        let stack = match start_wifi_sta(
            spawner,
            peripherals.WIFI,
            APP.wifi,
            APP.device.hostname,
            &LINK,
        )
        .await
        {
            Ok(stack) => stack,
            Err(e) => {
                error!("network: failed to start: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
                esp_hal::system::software_reset();
            }
        };

        let firmware = mk_static!(
            FirmwareUsecasesImpl,
            FirmwareUsecases::new(controller, restart, APP.ota.restart_delay)
        );
        let device = mk_static!(
            DeviceUsecasesImpl,
            DeviceUsecases::new(EspDeviceInfo::new(stack, APP.device, &LINK))
        );
        let handler = mk_static!(OtaHttpController, OtaHttpController::new(firmware, device));

        for _ in 0..HTTP_WORKERS {
            spawner
                .spawn(http_server_task(stack, APP.ota.http_port, handler))
                .ok();
        }
        info!("http: listening on port {}", APP.ota.http_port);

        loop {
            Timer::after(Duration::from_secs(60)).await;
        }
    }
}
