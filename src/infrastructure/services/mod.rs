mod device_info;
mod link;
mod ota;
mod restart;

pub use device_info::EspDeviceInfo;
pub use link::{LINK, LinkMonitor};
pub use ota::{EspOtaPartitions, PartitionError};
pub use restart::{RestartService, init_restart_service};
