//! Shared fixtures: RAM partition table and image builders.

#![allow(dead_code)]

use myrtio_ota::{
    BootSlot,
    FlashStagingStore,
    ImageError,
    ImageVerifier,
    PartitionTable,
    UpdateController,
    UploadBody,
};
use sha2::{Digest as _, Sha256};

pub const SECTOR: usize = 4096;

/// Two app slots in RAM behaving like NOR flash: erase sets `0xFF`,
/// writes can only clear bits.
pub struct RamPartitions {
    pub slots: [Vec<u8>; 2],
    pub active: usize,
    pub writes: usize,
    pub erases: usize,
    /// Fail the n-th write call (1-based)
    pub fail_write: Option<usize>,
    /// Boot record never written, as after a serial flash without a
    /// factory slot. The bootloader starts `ota_0`, the record reads as
    /// factory and the slot after it is `ota_0` again.
    pub blank_record: bool,
}

fn slot(index: usize) -> BootSlot {
    if index == 0 { BootSlot::Ota0 } else { BootSlot::Ota1 }
}

impl RamPartitions {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [vec![0x5A; capacity], vec![0x00; capacity]],
            active: 0,
            writes: 0,
            erases: 0,
            fail_write: None,
            blank_record: false,
        }
    }

    pub fn blank_record(capacity: usize) -> Self {
        Self {
            blank_record: true,
            ..Self::new(capacity)
        }
    }

    pub fn failing_write(capacity: usize, call: usize) -> Self {
        Self {
            fail_write: Some(call),
            ..Self::new(capacity)
        }
    }

    pub fn staging(&self) -> &[u8] {
        &self.slots[self.staging_index()]
    }

    fn staging_index(&self) -> usize {
        if self.blank_record { 0 } else { 1 - self.active }
    }

    pub fn flash_io(&self) -> usize {
        self.writes + self.erases
    }
}

impl PartitionTable for RamPartitions {
    type Error = &'static str;
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: u32 = SECTOR as u32;

    fn staging_capacity(&mut self) -> Result<u32, Self::Error> {
        Ok(self.staging().len() as u32)
    }

    fn erase_staging(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert_eq!(from as usize % SECTOR, 0, "unaligned erase");
        self.erases += 1;
        let index = self.staging_index();
        self.slots[index][from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write_staging(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(offset % 4, 0, "unaligned write offset");
        assert_eq!(bytes.len() % 4, 0, "unaligned write length");
        self.writes += 1;
        if self.fail_write == Some(self.writes) {
            return Err("simulated flash fault");
        }
        let index = self.staging_index();
        let start = offset as usize;
        for (dst, src) in self.slots[index][start..start + bytes.len()]
            .iter_mut()
            .zip(bytes)
        {
            *dst &= *src;
        }
        Ok(())
    }

    fn activate_staging(&mut self) -> Result<(), Self::Error> {
        self.active = self.staging_index();
        self.blank_record = false;
        Ok(())
    }

    fn boot_slot(&mut self) -> Result<BootSlot, Self::Error> {
        if self.blank_record {
            return Ok(BootSlot::Factory);
        }
        Ok(slot(self.active))
    }

    fn running_slot(&mut self) -> Result<BootSlot, Self::Error> {
        Ok(slot(self.active))
    }

    fn staging_slot(&mut self) -> Result<BootSlot, Self::Error> {
        Ok(slot(self.staging_index()))
    }
}

/// Request body served from memory in fixed-size reads.
pub struct MemoryBody {
    data: Vec<u8>,
    read: usize,
    chunk: usize,
    content_type: Option<String>,
    /// Reads fail once this many bytes were delivered
    cut_at: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLost;

impl MemoryBody {
    pub fn raw(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            read: 0,
            chunk,
            content_type: Some("application/octet-stream".into()),
            cut_at: None,
        }
    }

    pub fn multipart(boundary: &str, file: &[u8], chunk: usize) -> Self {
        Self {
            content_type: Some(format!("multipart/form-data; boundary={boundary}")),
            ..Self::raw(multipart_body(boundary, file), chunk)
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn cut_at(mut self, bytes: usize) -> Self {
        self.cut_at = Some(bytes);
        self
    }

    pub fn unread(&self) -> usize {
        self.data.len() - self.read
    }
}

impl UploadBody for MemoryBody {
    type Error = ConnectionLost;

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn content_length(&self) -> Option<u32> {
        Some(self.data.len() as u32)
    }

    async fn read_and_then<R>(
        &mut self,
        op: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, ConnectionLost> {
        if self.cut_at.is_some_and(|cut| self.read >= cut) {
            return Err(ConnectionLost);
        }
        let end = (self.read + self.chunk).min(self.data.len());
        let start = self.read;
        self.read = end;
        Ok(op(&self.data[start..end]))
    }
}

/// Accepts any image of at least one byte.
#[derive(Default)]
pub struct NonEmpty {
    seen: usize,
}

impl ImageVerifier for NonEmpty {
    fn update(&mut self, bytes: &[u8]) {
        self.seen += bytes.len();
    }

    fn verify(&self) -> Result<(), ImageError> {
        if self.seen == 0 {
            Err(ImageError::Empty)
        } else {
            Ok(())
        }
    }
}

pub type RamStore = FlashStagingStore<RamPartitions, NonEmpty>;

pub fn controller(partitions: RamPartitions) -> UpdateController<RamStore> {
    UpdateController::new(FlashStagingStore::new(partitions))
}

pub fn partitions(controller: &UpdateController<RamStore>) -> &RamPartitions {
    controller.store().partitions()
}

pub fn boot_slot(controller: &mut UpdateController<RamStore>) -> BootSlot {
    controller
        .store_mut()
        .partitions_mut()
        .boot_slot()
        .expect("ram partitions always report a slot")
}

/// Build an ESP application image from segment payloads.
pub fn esp_image(segments: &[&[u8]], with_digest: bool) -> Vec<u8> {
    let mut image = vec![0u8; 24];
    image[0] = 0xE9;
    image[1] = segments.len() as u8;
    image[23] = u8::from(with_digest);

    let mut checksum = 0xEFu8;
    for (index, data) in segments.iter().enumerate() {
        let load_addr = 0x3F40_0020u32 + (index as u32) * 0x1_0000;
        image.extend_from_slice(&load_addr.to_le_bytes());
        image.extend_from_slice(&(data.len() as u32).to_le_bytes());
        image.extend_from_slice(data);
        checksum = data.iter().fold(checksum, |acc, b| acc ^ b);
    }
    while image.len() % 16 != 15 {
        image.push(0);
    }
    image.push(checksum);

    if with_digest {
        let digest = Sha256::digest(&image);
        image.extend_from_slice(&digest);
    }
    image
}

/// Body of a `multipart/form-data` request carrying `file`.
pub fn multipart_body(boundary: &str, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"firmware.bin\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
