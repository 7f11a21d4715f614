//! Integration tests for the update state machine over RAM flash.

mod common;

use common::{RamPartitions, SECTOR, boot_slot, controller, partitions};
use myrtio_ota::{BootSlot, StagingStore as _, UpdateError, UpdateState};

const CAPACITY: usize = 16 * SECTOR;

// -----------------------------------------------------------------------------
// Committing
// -----------------------------------------------------------------------------

#[test]
fn ten_chunks_commit_and_switch_boot_slot() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    assert_eq!(boot_slot(&mut ota), BootSlot::Ota0);

    ota.begin(1_500).unwrap();
    for _ in 0..10 {
        ota.write_chunk(&[0xAA; 1024]).unwrap();
    }
    let report = ota.finish().unwrap();

    assert_eq!(ota.state(), UpdateState::Committed);
    assert_eq!(report.bytes_written, 10_240);
    assert_eq!(report.started_at_ms, 1_500);
    assert_eq!(ota.bytes_written(), 10_240);
    assert_eq!(boot_slot(&mut ota), BootSlot::Ota1);
}

#[test]
fn staged_bytes_are_the_concatenation_of_chunks() {
    let chunks: [&[u8]; 4] = [b"abc", b"", b"defgh", b"ijklmnopq"];
    let mut ota = controller(RamPartitions::new(CAPACITY));

    ota.begin(0).unwrap();
    for chunk in chunks {
        ota.write_chunk(chunk).unwrap();
    }
    let report = ota.finish().unwrap();

    let expected = chunks.concat();
    assert_eq!(report.bytes_written as usize, expected.len());
    // After activation the staged image is the booted slot
    let flash = partitions(&ota);
    let booted = &flash.slots[flash.active];
    assert_eq!(&booted[..expected.len()], expected.as_slice());
    // Final partial word is padded with erased bytes
    assert_eq!(&booted[expected.len()..20], &[0xFF; 3]);
}

#[test]
fn committed_store_refuses_new_sessions_until_restart() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    ota.begin(0).unwrap();
    ota.write_chunk(&[1; 64]).unwrap();
    ota.finish().unwrap();

    ota.reset();
    assert_eq!(ota.state(), UpdateState::Idle);
    assert_eq!(ota.begin(10), Err(UpdateError::NoSpace));
    assert_eq!(ota.state(), UpdateState::Aborted);
    assert!(ota.store().is_sealed());
}

#[test]
fn blank_boot_record_never_stages_over_the_running_image() {
    let mut ota = controller(RamPartitions::blank_record(CAPACITY));
    assert_eq!(boot_slot(&mut ota), BootSlot::Factory);

    assert_eq!(ota.begin(0), Err(UpdateError::NoSpace));
    ota.reset();

    assert_eq!(ota.state(), UpdateState::Idle);
    assert!(!ota.store().is_reserved());
    let flash = partitions(&ota);
    assert_eq!(flash.flash_io(), 0);
    assert!(flash.slots[flash.active].iter().all(|&b| b == 0x5A));
}

// -----------------------------------------------------------------------------
// Sequencing
// -----------------------------------------------------------------------------

#[test]
fn begin_while_receiving_is_busy_and_keeps_session() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    ota.begin(7).unwrap();
    ota.write_chunk(&[0x11; 100]).unwrap();
    let before = ota.session();

    assert_eq!(ota.begin(99), Err(UpdateError::Busy));
    assert_eq!(ota.session(), before);
    assert_eq!(ota.state(), UpdateState::Receiving);

    // Session continues normally
    ota.write_chunk(&[0x22; 100]).unwrap();
    assert_eq!(ota.finish().unwrap().bytes_written, 200);
}

#[test]
fn chunk_and_finish_while_idle_touch_no_flash() {
    let mut ota = controller(RamPartitions::new(CAPACITY));

    assert_eq!(ota.write_chunk(&[0xAA; 32]), Err(UpdateError::InvalidState));
    assert_eq!(ota.finish(), Err(UpdateError::InvalidState));

    assert_eq!(ota.state(), UpdateState::Idle);
    assert_eq!(partitions(&ota).flash_io(), 0);
}

#[test]
fn terminal_states_reject_begin_and_finish() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    ota.begin(0).unwrap();
    assert_eq!(ota.finish(), Err(UpdateError::ValidationFailed));
    assert_eq!(ota.state(), UpdateState::Aborted);

    assert_eq!(ota.begin(1), Err(UpdateError::InvalidState));
    assert_eq!(ota.finish(), Err(UpdateError::InvalidState));

    ota.reset();
    assert_eq!(ota.state(), UpdateState::Idle);
    assert!(ota.begin(2).is_ok());
}

// -----------------------------------------------------------------------------
// Failures leave the boot selection alone
// -----------------------------------------------------------------------------

#[test]
fn zero_length_update_is_rejected_by_validation() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    let slot = boot_slot(&mut ota);

    ota.begin(0).unwrap();
    assert_eq!(ota.finish(), Err(UpdateError::ValidationFailed));

    assert_eq!(ota.state(), UpdateState::Aborted);
    assert_eq!(ota.last_error(), Some(UpdateError::ValidationFailed));
    assert_eq!(boot_slot(&mut ota), slot);
    assert!(!ota.store().is_reserved());
}

#[test]
fn flash_fault_on_third_chunk_aborts_session() {
    let mut ota = controller(RamPartitions::failing_write(CAPACITY, 3));
    let slot = boot_slot(&mut ota);

    ota.begin(0).unwrap();
    ota.write_chunk(&[0xAA; 1024]).unwrap();
    ota.write_chunk(&[0xAA; 1024]).unwrap();
    assert_eq!(
        ota.write_chunk(&[0xAA; 1024]),
        Err(UpdateError::WriteFailure)
    );

    assert_eq!(ota.state(), UpdateState::Aborted);
    assert_eq!(ota.bytes_written(), 2048);
    assert_eq!(ota.last_error(), Some(UpdateError::WriteFailure));
    assert!(!ota.store().is_reserved());
    assert_eq!(boot_slot(&mut ota), slot);

    // Aborted sessions accept nothing more
    assert_eq!(ota.write_chunk(&[0xAA; 4]), Err(UpdateError::InvalidState));
}

#[test]
fn capacity_overrun_is_a_clean_abort() {
    let mut ota = controller(RamPartitions::new(2 * SECTOR));
    let slot = boot_slot(&mut ota);

    ota.begin(0).unwrap();
    ota.write_chunk(&[0x01; SECTOR]).unwrap();
    ota.write_chunk(&[0x02; SECTOR - 1]).unwrap();
    assert_eq!(ota.write_chunk(&[0x03; 2]), Err(UpdateError::CapacityExceeded));

    assert_eq!(ota.state(), UpdateState::Aborted);
    assert_eq!(ota.bytes_written() as usize, 2 * SECTOR - 1);
    assert_eq!(boot_slot(&mut ota), slot);
    assert!(!ota.store().is_reserved());
}

#[test]
fn image_filling_the_partition_exactly_commits() {
    let mut ota = controller(RamPartitions::new(2 * SECTOR));
    ota.begin(0).unwrap();
    ota.write_chunk(&[0x01; SECTOR]).unwrap();
    ota.write_chunk(&[0x02; SECTOR]).unwrap();
    assert_eq!(ota.finish().map(|r| r.bytes_written as usize), Ok(2 * SECTOR));
}

#[test]
fn reset_releases_outstanding_handle() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    ota.begin(0).unwrap();
    ota.write_chunk(&[0xAA; 512]).unwrap();
    assert!(ota.store().is_reserved());

    ota.reset();

    assert_eq!(ota.state(), UpdateState::Idle);
    assert_eq!(ota.bytes_written(), 0);
    assert!(!ota.store().is_reserved());
    assert_eq!(boot_slot(&mut ota), BootSlot::Ota0);
}

#[test]
fn second_open_on_reserved_store_has_no_space() {
    let mut ota = controller(RamPartitions::new(CAPACITY));
    ota.begin(0).unwrap();

    assert!(matches!(
        ota.store_mut().open(None),
        Err(UpdateError::NoSpace)
    ));
}
