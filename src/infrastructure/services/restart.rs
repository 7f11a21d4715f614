use embassy_executor::Spawner;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Timer};
use log::{info, warn};

use crate::domain::ports::{RestartError, RestartScheduler};

static RESTART_CHANNEL: Channel<CriticalSectionRawMutex, Duration, 1> = Channel::new();

/// Restart service
///
/// Requests are handed to a background task so the caller can finish its
/// response before the chip resets.
#[derive(Default, Clone, Copy)]
pub struct RestartService;

/// Spawn the restart task and return a handle to it.
pub fn init_restart_service(spawner: Spawner) -> RestartService {
    if spawner.spawn(restart_task()).is_err() {
        warn!("restart: task already running");
    }

    RestartService
}

impl RestartScheduler for RestartService {
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError> {
        RESTART_CHANNEL
            .try_send(delay)
            .map_err(|_| RestartError::AlreadyScheduled)
    }
}

#[embassy_executor::task]
async fn restart_task() {
    let delay = RESTART_CHANNEL.receive().await;
    Timer::after(delay).await;
    info!("restart: resetting the chip");
    esp_hal::system::software_reset();
}
