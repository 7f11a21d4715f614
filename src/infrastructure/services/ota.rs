//! ESP-IDF partition table access for the update controller.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use esp_bootloader_esp_idf::{
    ota::OtaImageState,
    ota_updater::OtaUpdater,
    partitions::{
        AppPartitionSubType,
        PARTITION_TABLE_MAX_LEN,
        PartitionType,
        read_partition_table,
    },
};
use esp_storage::FlashStorage;
use log::{debug, info, warn};
use myrtio_ota::{BootSlot, PartitionTable};

const WRITE_SIZE: usize = 4;
const ERASE_SECTOR: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// Partition table or OTA data could not be read
    InvalidPartitionTable,
    Erase,
    Write,
    Activate,
    /// Boot slot outside the `ota_0` / `ota_1` layout
    UnsupportedSlot,
}

/// Partition table of the running chip.
///
/// The staging partition is the OTA slot after the one selected in the OTA
/// data, the same one the bootloader would start after activation.
pub struct EspOtaPartitions {
    flash: FlashStorage<'static>,
    table: [u8; PARTITION_TABLE_MAX_LEN],
    running: Option<BootSlot>,
}

impl EspOtaPartitions {
    pub fn new(flash: FlashStorage<'static>) -> Self {
        Self {
            flash,
            table: [0; PARTITION_TABLE_MAX_LEN],
            running: None,
        }
    }

    /// Resolve the slot the running image was started from.
    ///
    /// Without a factory partition the bootloader starts `ota_0` from blank
    /// OTA data, which still reads as factory. The OTA data is then written
    /// to select `ota_0`, so the next staging slot is `ota_1`.
    pub fn adopt_running_slot(&mut self) -> Result<BootSlot, PartitionError> {
        let selected = self.with_updater(|updater| {
            updater
                .selected_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)
        })?;
        let blank = matches!(selected, AppPartitionSubType::Factory) && !self.has_factory()?;
        let running = if blank {
            info!("ota: blank OTA data, selecting the running ota_0");
            self.with_updater(|updater| {
                updater
                    .activate_next_partition()
                    .map_err(|_| PartitionError::Activate)?;
                if updater.set_current_ota_state(OtaImageState::Valid).is_err() {
                    warn!("ota: image state of ota_0 not written");
                }
                Ok(())
            })?;
            BootSlot::Ota0
        } else {
            slot_of(selected)?
        };
        self.running = Some(running);
        Ok(running)
    }

    fn has_factory(&mut self) -> Result<bool, PartitionError> {
        let table = read_partition_table(&mut self.flash, &mut self.table)
            .map_err(|_| PartitionError::InvalidPartitionTable)?;
        let factory = table
            .find_partition(PartitionType::App(AppPartitionSubType::Factory))
            .map_err(|_| PartitionError::InvalidPartitionTable)?;
        Ok(factory.is_some())
    }

    fn with_updater<R>(
        &mut self,
        op: impl FnOnce(&mut OtaUpdater<'_, FlashStorage<'static>>) -> Result<R, PartitionError>,
    ) -> Result<R, PartitionError> {
        let mut updater = OtaUpdater::new(&mut self.flash, &mut self.table)
            .map_err(|_| PartitionError::InvalidPartitionTable)?;
        op(&mut updater)
    }
}

fn slot_of(sub_type: AppPartitionSubType) -> Result<BootSlot, PartitionError> {
    match sub_type {
        AppPartitionSubType::Factory => Ok(BootSlot::Factory),
        AppPartitionSubType::Ota0 => Ok(BootSlot::Ota0),
        AppPartitionSubType::Ota1 => Ok(BootSlot::Ota1),
        _ => Err(PartitionError::UnsupportedSlot),
    }
}

impl PartitionTable for EspOtaPartitions {
    type Error = PartitionError;

    const WRITE_SIZE: usize = WRITE_SIZE;
    const ERASE_SIZE: u32 = ERASE_SECTOR;

    #[allow(clippy::cast_possible_truncation)]
    fn staging_capacity(&mut self) -> Result<u32, Self::Error> {
        self.with_updater(|updater| {
            let (partition, sub_type) = updater
                .next_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)?;
            let capacity = partition.capacity() as u32;
            info!("ota: staging partition {:?}, {} bytes", sub_type, capacity);
            Ok(capacity)
        })
    }

    fn erase_staging(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.with_updater(|updater| {
            let (mut partition, _) = updater
                .next_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)?;
            debug!("ota: erasing {:#x}..{:#x}", from, to);
            partition.erase(from, to).map_err(|_| PartitionError::Erase)
        })
    }

    fn write_staging(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.with_updater(|updater| {
            let (mut partition, _) = updater
                .next_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)?;
            partition
                .write(offset, bytes)
                .map_err(|_| PartitionError::Write)
        })
    }

    fn activate_staging(&mut self) -> Result<(), Self::Error> {
        self.with_updater(|updater| {
            updater
                .activate_next_partition()
                .map_err(|_| PartitionError::Activate)?;
            // Boot target already switched, the image state is advisory
            if updater.set_current_ota_state(OtaImageState::New).is_err() {
                warn!("ota: image state of the new slot not written");
            }
            Ok(())
        })
    }

    fn boot_slot(&mut self) -> Result<BootSlot, Self::Error> {
        self.with_updater(|updater| {
            updater
                .selected_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)
                .and_then(slot_of)
        })
    }

    fn running_slot(&mut self) -> Result<BootSlot, Self::Error> {
        match self.running {
            Some(slot) => Ok(slot),
            None => self.adopt_running_slot(),
        }
    }

    fn staging_slot(&mut self) -> Result<BootSlot, Self::Error> {
        self.with_updater(|updater| {
            let (_, sub_type) = updater
                .next_partition()
                .map_err(|_| PartitionError::InvalidPartitionTable)?;
            slot_of(sub_type)
        })
    }
}
