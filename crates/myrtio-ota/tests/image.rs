//! Integration tests for ESP application image validation.

mod common;

use common::{RamPartitions, SECTOR, esp_image};
use myrtio_ota::{
    BootSlot,
    EspImageVerifier,
    FlashStagingStore,
    ImageError,
    ImageVerifier,
    PartitionTable as _,
    UpdateController,
    UpdateError,
};

fn verify(image: &[u8]) -> Result<(), ImageError> {
    let mut verifier = EspImageVerifier::new();
    verifier.update(image);
    verifier.verify()
}

fn segments() -> (Vec<u8>, Vec<u8>) {
    let text: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    let data: Vec<u8> = (0..333u32).map(|i| (i * 13 % 256) as u8).collect();
    (text, data)
}

// -----------------------------------------------------------------------------
// Verifier
// -----------------------------------------------------------------------------

#[test]
fn well_formed_image_without_digest_is_accepted() {
    let (text, data) = segments();
    assert_eq!(verify(&esp_image(&[&text, &data], false)), Ok(()));
}

#[test]
fn well_formed_image_with_digest_is_accepted() {
    let (text, data) = segments();
    assert_eq!(verify(&esp_image(&[&text, &data], true)), Ok(()));
}

#[test]
fn image_fed_in_odd_chunks_is_accepted() {
    let (text, data) = segments();
    let image = esp_image(&[&text, &data], true);
    let mut verifier = EspImageVerifier::new();
    for chunk in image.chunks(7) {
        verifier.update(chunk);
    }
    assert_eq!(verifier.verify(), Ok(()));
}

#[test]
fn trailing_bytes_after_image_are_ignored() {
    let (text, _) = segments();
    let mut image = esp_image(&[&text], false);
    image.extend_from_slice(&[0xFF; 12]);
    let mut verifier = EspImageVerifier::new();
    verifier.update(&image);
    assert_eq!(verifier.verify(), Ok(()));
    assert_eq!(verifier.trailing_bytes(), 12);
}

#[test]
fn empty_image_is_rejected() {
    assert_eq!(verify(&[]), Err(ImageError::Empty));
}

#[test]
fn wrong_magic_is_rejected() {
    let (text, _) = segments();
    let mut image = esp_image(&[&text], false);
    image[0] = 0x7F;
    assert_eq!(verify(&image), Err(ImageError::BadMagic));
}

#[test]
fn corrupted_segment_fails_checksum() {
    let (text, data) = segments();
    let mut image = esp_image(&[&text, &data], false);
    image[24 + 8 + 10] ^= 0x01;
    assert_eq!(verify(&image), Err(ImageError::ChecksumMismatch));
}

#[test]
fn corrupted_digest_is_rejected() {
    let (text, _) = segments();
    let mut image = esp_image(&[&text], true);
    let last = image.len() - 1;
    image[last] ^= 0xFF;
    assert_eq!(verify(&image), Err(ImageError::DigestMismatch));
}

#[test]
fn truncated_image_is_rejected() {
    let (text, data) = segments();
    let image = esp_image(&[&text, &data], true);
    assert_eq!(verify(&image[..image.len() - 1]), Err(ImageError::Truncated));
    assert_eq!(verify(&image[..100]), Err(ImageError::Truncated));
}

// -----------------------------------------------------------------------------
// Through the store
// -----------------------------------------------------------------------------

type EspStore = FlashStagingStore<RamPartitions, EspImageVerifier>;

#[test]
fn valid_image_commits_and_corrupt_image_keeps_boot_slot() {
    let (text, data) = segments();
    let image = esp_image(&[&text, &data], true);

    let mut ota: UpdateController<EspStore> =
        UpdateController::new(FlashStagingStore::new(RamPartitions::new(8 * SECTOR)));
    ota.begin(0).unwrap();
    for chunk in image.chunks(500) {
        ota.write_chunk(chunk).unwrap();
    }
    ota.finish().unwrap();
    assert_eq!(
        ota.store_mut().partitions_mut().boot_slot(),
        Ok(BootSlot::Ota1)
    );

    let mut corrupt = image.clone();
    corrupt[40] ^= 0x80;
    let mut ota: UpdateController<EspStore> =
        UpdateController::new(FlashStagingStore::new(RamPartitions::new(8 * SECTOR)));
    ota.begin(0).unwrap();
    ota.write_chunk(&corrupt).unwrap();
    assert_eq!(ota.finish(), Err(UpdateError::ValidationFailed));
    assert_eq!(
        ota.store_mut().partitions_mut().boot_slot(),
        Ok(BootSlot::Ota0)
    );
}
