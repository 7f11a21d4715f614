//! Over-the-air firmware update core.
//!
//! A request body is streamed by [`receive_upload`], de-framed by
//! [`UploadFraming`], tracked by [`UploadReassembler`] and applied by
//! [`UpdateController`], which stages the image through a [`StagingStore`].
//! Only a validated image ever becomes the next boot target.

#![cfg_attr(not(test), no_std)]

pub mod controller;
pub mod error;
pub mod framing;
pub mod image;
pub mod reassembler;
pub mod receive;
pub mod shared;
pub mod store;
pub mod verdict;

pub use controller::{UpdateController, UpdateReport, UpdateSession, UpdateState};
pub use error::{FramingError, UpdateError, UploadFailure};
pub use framing::UploadFraming;
pub use image::{EspImageVerifier, ImageError, ImageVerifier};
pub use reassembler::{UpdateSink, UploadPhase, UploadReassembler};
pub use receive::{UploadBody, receive_upload};
pub use shared::SharedController;
pub use store::{BootSlot, FlashStagingStore, PartitionTable, StagingHandle, StagingStore};
pub use verdict::UploadVerdict;
