use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use myrtio_ota::{EspImageVerifier, FlashStagingStore, SharedController, UpdateController};

use crate::{
    app::{DeviceUsecases, FirmwareUsecases},
    infrastructure::services::{EspDeviceInfo, EspOtaPartitions, RestartService},
};

pub type OtaStore = FlashStagingStore<EspOtaPartitions, EspImageVerifier>;
pub type OtaUpdateController = UpdateController<OtaStore>;
pub type OtaController = SharedController<CriticalSectionRawMutex, OtaStore>;

pub type FirmwareUsecasesImpl = FirmwareUsecases<CriticalSectionRawMutex, OtaStore, RestartService>;
pub type DeviceUsecasesImpl = DeviceUsecases<EspDeviceInfo>;
