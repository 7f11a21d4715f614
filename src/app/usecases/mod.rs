mod device;
mod firmware;

pub use device::DeviceUsecases;
pub use firmware::FirmwareUsecases;
