use crate::domain::{dto::DeviceInfo, ports::DeviceInfoReader};

pub struct DeviceUsecases<R: DeviceInfoReader> {
    reader: R,
}

impl<R: DeviceInfoReader> DeviceUsecases<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Assemble the info snapshot from live state.
    pub fn device_info(&self) -> DeviceInfo {
        self.reader.device_info()
    }
}
