use embassy_time::Duration;

use crate::domain::dto::DeviceInfo;

/// Error type for restart requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartError {
    /// A restart is already pending
    AlreadyScheduled,
}

/// Schedules a software reset of the chip
pub trait RestartScheduler {
    /// Restart after `delay`. Only the first request is honoured.
    fn schedule_restart(&self, delay: Duration) -> Result<(), RestartError>;
}

/// Reader interface for the live device state
pub trait DeviceInfoReader {
    fn device_info(&self) -> DeviceInfo;
}
