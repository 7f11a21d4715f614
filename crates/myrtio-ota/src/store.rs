//! Staging of an incoming image in the inactive app partition.

use core::fmt::Debug;

use log::{debug, error, info, warn};

use crate::{
    error::UpdateError,
    image::ImageVerifier,
};

/// Largest flash write granularity the store can buffer for.
pub const MAX_WRITE_SIZE: usize = 16;

/// App partition the bootloader selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSlot {
    Factory,
    Ota0,
    Ota1,
}

/// Access to the partition table of the device.
///
/// All offsets are relative to the start of the staging partition, which is
/// never the partition the running image was booted from.
pub trait PartitionTable {
    type Error: Debug;

    /// Write granularity of the flash, in bytes.
    const WRITE_SIZE: usize;
    /// Erase granularity of the flash, in bytes.
    const ERASE_SIZE: u32;

    fn staging_capacity(&mut self) -> Result<u32, Self::Error>;
    fn erase_staging(&mut self, from: u32, to: u32) -> Result<(), Self::Error>;
    fn write_staging(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Make the staging partition the next boot target.
    fn activate_staging(&mut self) -> Result<(), Self::Error>;

    /// Partition the bootloader will start next.
    fn boot_slot(&mut self) -> Result<BootSlot, Self::Error>;

    /// Partition the running image was started from.
    fn running_slot(&mut self) -> Result<BootSlot, Self::Error>;

    /// Partition the staging offsets refer to.
    fn staging_slot(&mut self) -> Result<BootSlot, Self::Error>;
}

/// Exclusive writer for the staging region.
pub trait StagingStore {
    type Handle;

    /// Reserve the staging region. `expected_size` is `None` when the total
    /// length is not known ahead of time.
    fn open(&mut self, expected_size: Option<u32>) -> Result<Self::Handle, UpdateError>;

    /// Append `bytes` at the write cursor.
    fn append(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), UpdateError>;

    /// Validate the staged image and mark it as the next boot target.
    ///
    /// This is the only call that changes boot selection. On error the handle
    /// must still be passed to [`StagingStore::abandon`].
    fn finalize(&mut self, handle: &mut Self::Handle) -> Result<(), UpdateError>;

    /// Release the region without touching boot selection.
    fn abandon(&mut self, handle: Self::Handle);
}

/// Write session over the staging partition.
pub struct StagingHandle<V> {
    capacity: u32,
    cursor: u32,
    erased_to: u32,
    tail: [u8; MAX_WRITE_SIZE],
    tail_len: usize,
    verifier: V,
}

impl<V> StagingHandle<V> {
    /// Bytes accepted so far, including the unflushed tail.
    #[allow(clippy::cast_possible_truncation)]
    pub fn received(&self) -> u32 {
        self.cursor + self.tail_len as u32
    }
}

/// [`StagingStore`] over a [`PartitionTable`].
///
/// Sectors are erased lazily just ahead of the write cursor, since the
/// final image size is unknown. After a commit, or an activation whose
/// outcome is unknown, the store stays sealed until the device restarts.
pub struct FlashStagingStore<P, V> {
    partitions: P,
    reserved: bool,
    sealed: bool,
    _verifier: core::marker::PhantomData<fn() -> V>,
}

impl<P: PartitionTable, V: ImageVerifier + Default> FlashStagingStore<P, V> {
    pub fn new(partitions: P) -> Self {
        debug_assert!(P::WRITE_SIZE > 0 && P::WRITE_SIZE <= MAX_WRITE_SIZE);
        Self {
            partitions,
            reserved: false,
            sealed: false,
            _verifier: core::marker::PhantomData,
        }
    }

    pub fn partitions(&self) -> &P {
        &self.partitions
    }

    pub fn partitions_mut(&mut self) -> &mut P {
        &mut self.partitions
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Refuse to stage into the partition the device is running from.
    fn check_staging_slot(&mut self) -> Result<(), UpdateError> {
        let slots = self.partitions.staging_slot().and_then(|staging| {
            self.partitions
                .running_slot()
                .map(|running| (staging, running))
        });
        match slots {
            Ok((staging, running)) if staging != running => Ok(()),
            Ok((staging, _)) => {
                error!("ota: staging slot {:?} is the running image", staging);
                Err(UpdateError::NoSpace)
            }
            Err(e) => {
                error!("ota: boot slots unreadable: {:?}", e);
                Err(UpdateError::NoSpace)
            }
        }
    }

    /// Erase enough sectors to cover writes up to `end`.
    fn ensure_erased(
        &mut self,
        handle: &mut StagingHandle<V>,
        end: u32,
    ) -> Result<(), UpdateError> {
        if end <= handle.erased_to {
            return Ok(());
        }
        let target = end
            .div_ceil(P::ERASE_SIZE)
            .saturating_mul(P::ERASE_SIZE)
            .min(handle.capacity);
        debug!("ota: erasing {:#x}..{:#x}", handle.erased_to, target);
        self.partitions
            .erase_staging(handle.erased_to, target)
            .map_err(|e| {
                error!("ota: erase failed: {:?}", e);
                UpdateError::WriteFailure
            })?;
        handle.erased_to = target;
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write(
        &mut self,
        handle: &mut StagingHandle<V>,
        bytes: &[u8],
    ) -> Result<(), UpdateError> {
        let end = handle.cursor + bytes.len() as u32;
        self.ensure_erased(handle, end)?;
        self.partitions
            .write_staging(handle.cursor, bytes)
            .map_err(|e| {
                error!("ota: write at {:#x} failed: {:?}", handle.cursor, e);
                UpdateError::WriteFailure
            })?;
        handle.cursor = end;
        Ok(())
    }

    /// Write `data` keeping partial words in the handle tail.
    fn write_aligned(
        &mut self,
        handle: &mut StagingHandle<V>,
        data: &[u8],
    ) -> Result<(), UpdateError> {
        let word = P::WRITE_SIZE;
        let mut rest = data;

        // Complete partial word
        if handle.tail_len > 0 {
            let take = (word - handle.tail_len).min(rest.len());
            handle.tail[handle.tail_len..handle.tail_len + take]
                .copy_from_slice(&rest[..take]);
            handle.tail_len += take;
            rest = &rest[take..];

            if handle.tail_len < word {
                return Ok(());
            }
            let tail = handle.tail;
            self.write(handle, &tail[..word])?;
            handle.tail_len = 0;
        }

        // Write aligned bulk
        let aligned_len = rest.len() - rest.len() % word;
        if aligned_len > 0 {
            self.write(handle, &rest[..aligned_len])?;
        }

        // Keep trailing bytes
        let remainder = &rest[aligned_len..];
        handle.tail[..remainder.len()].copy_from_slice(remainder);
        handle.tail_len = remainder.len();
        Ok(())
    }
}

impl<P: PartitionTable, V: ImageVerifier + Default> StagingStore for FlashStagingStore<P, V> {
    type Handle = StagingHandle<V>;

    fn open(&mut self, expected_size: Option<u32>) -> Result<Self::Handle, UpdateError> {
        if self.sealed {
            warn!("ota: staging sealed until restart");
            return Err(UpdateError::NoSpace);
        }
        if self.reserved {
            warn!("ota: staging already reserved");
            return Err(UpdateError::NoSpace);
        }
        self.check_staging_slot()?;
        let capacity = self.partitions.staging_capacity().map_err(|e| {
            error!("ota: no staging partition: {:?}", e);
            UpdateError::NoSpace
        })?;
        if expected_size.is_some_and(|size| size > capacity) {
            warn!(
                "ota: image of {:?} bytes exceeds capacity {}",
                expected_size, capacity
            );
            return Err(UpdateError::NoSpace);
        }

        self.reserved = true;
        info!("ota: staging opened, capacity {} bytes", capacity);
        Ok(StagingHandle {
            capacity,
            cursor: 0,
            erased_to: 0,
            tail: [0xFF; MAX_WRITE_SIZE],
            tail_len: 0,
            verifier: V::default(),
        })
    }

    fn append(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), UpdateError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let fits = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| handle.received().checked_add(len))
            .is_some_and(|end| end <= handle.capacity);
        if !fits {
            warn!(
                "ota: {} more bytes would exceed capacity {}",
                bytes.len(),
                handle.capacity
            );
            return Err(UpdateError::CapacityExceeded);
        }

        handle.verifier.update(bytes);
        self.write_aligned(handle, bytes)
    }

    fn finalize(&mut self, handle: &mut Self::Handle) -> Result<(), UpdateError> {
        let received = handle.received();
        if let Err(e) = handle.verifier.verify() {
            warn!("ota: rejecting {} byte image: {}", received, e);
            return Err(UpdateError::ValidationFailed);
        }

        // Write final tail
        if handle.tail_len > 0 {
            let word = P::WRITE_SIZE;
            let mut tail = handle.tail;
            tail[handle.tail_len..word].fill(0xFF);
            handle.tail_len = 0;
            self.write(handle, &tail[..word])?;
        }

        if let Err(e) = self.partitions.activate_staging() {
            // Boot selection may be half written, no slot is safe to stage into
            error!("ota: activation failed: {:?}", e);
            self.sealed = true;
            return Err(UpdateError::WriteFailure);
        }

        self.reserved = false;
        self.sealed = true;
        info!("ota: {} byte image committed", received);
        Ok(())
    }

    fn abandon(&mut self, handle: Self::Handle) {
        info!("ota: staging abandoned after {} bytes", handle.received());
        self.reserved = false;
    }
}
