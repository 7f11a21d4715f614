//! Streaming integrity check of an ESP application image.
//!
//! Image layout:
//!
//! ```text
//! header (24 bytes)  magic 0xE9, segment count at [1], hash flag at [23]
//! segment * count    load address (u32 LE), length (u32 LE), data
//! padding            up to the last byte of a 16-byte block
//! checksum (1 byte)  XOR of all segment data, seeded with 0xEF
//! digest (32 bytes)  SHA-256 of everything above, only if hash flag is set
//! ```

use core::fmt;

use log::debug;
use sha2::{Digest as _, Sha256};

pub const IMAGE_MAGIC: u8 = 0xE9;
pub const IMAGE_HEADER_LEN: usize = 24;
pub const SEGMENT_HEADER_LEN: usize = 8;
pub const MAX_SEGMENTS: u8 = 16;
pub const CHECKSUM_SEED: u8 = 0xEF;
pub const DIGEST_LEN: usize = 32;

const HASH_APPENDED_OFFSET: usize = 23;

/// Reason an image was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    Empty,
    BadMagic,
    BadSegmentCount,
    Truncated,
    ChecksumMismatch,
    DigestMismatch,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ImageError::Empty => "empty image",
            ImageError::BadMagic => "bad magic byte",
            ImageError::BadSegmentCount => "bad segment count",
            ImageError::Truncated => "image truncated",
            ImageError::ChecksumMismatch => "checksum mismatch",
            ImageError::DigestMismatch => "digest mismatch",
        };
        f.write_str(text)
    }
}

/// Integrity check fed with every staged byte.
pub trait ImageVerifier {
    /// Consume the next bytes of the image, in order.
    fn update(&mut self, bytes: &[u8]);

    /// Decide over everything consumed so far.
    fn verify(&self) -> Result<(), ImageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    SegmentHeader,
    SegmentData,
    Padding,
    Checksum,
    Digest,
    Done,
}

/// [`ImageVerifier`] for the ESP-IDF application image format.
#[derive(Clone)]
pub struct EspImageVerifier {
    stage: Stage,
    field: [u8; DIGEST_LEN],
    field_len: usize,
    consumed: u32,
    remaining: u32,
    segments_left: u8,
    checksum: u8,
    hash_appended: bool,
    hasher: Sha256,
    expected_digest: [u8; DIGEST_LEN],
    trailing: u32,
    error: Option<ImageError>,
}

impl Default for EspImageVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EspImageVerifier {
    pub fn new() -> Self {
        Self {
            stage: Stage::Header,
            field: [0; DIGEST_LEN],
            field_len: 0,
            consumed: 0,
            remaining: 0,
            segments_left: 0,
            checksum: CHECKSUM_SEED,
            hash_appended: false,
            hasher: Sha256::new(),
            expected_digest: [0; DIGEST_LEN],
            trailing: 0,
            error: None,
        }
    }

    /// Bytes received after the end of the image.
    pub fn trailing_bytes(&self) -> u32 {
        self.trailing
    }

    /// Number of bytes the current stage still needs.
    fn wanted(&self) -> usize {
        match self.stage {
            Stage::Header => IMAGE_HEADER_LEN - self.field_len,
            Stage::SegmentHeader => SEGMENT_HEADER_LEN - self.field_len,
            Stage::SegmentData | Stage::Padding => self.remaining as usize,
            Stage::Checksum => 1,
            Stage::Digest => DIGEST_LEN - self.field_len,
            Stage::Done => usize::MAX,
        }
    }

    fn collect(&mut self, bytes: &[u8]) {
        self.field[self.field_len..self.field_len + bytes.len()].copy_from_slice(bytes);
        self.field_len += bytes.len();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn step(&mut self, bytes: &[u8]) {
        if self.stage == Stage::Done {
            self.trailing = self.trailing.saturating_add(bytes.len() as u32);
            return;
        }
        if self.stage != Stage::Digest {
            self.hasher.update(bytes);
        }
        self.consumed = self.consumed.saturating_add(bytes.len() as u32);

        match self.stage {
            Stage::Header => {
                self.collect(bytes);
                if self.field_len == IMAGE_HEADER_LEN {
                    self.parse_header();
                }
            }
            Stage::SegmentHeader => {
                self.collect(bytes);
                if self.field_len == SEGMENT_HEADER_LEN {
                    let length = u32::from_le_bytes([
                        self.field[4],
                        self.field[5],
                        self.field[6],
                        self.field[7],
                    ]);
                    self.field_len = 0;
                    self.remaining = length;
                    self.stage = Stage::SegmentData;
                    if length == 0 {
                        self.end_segment();
                    }
                }
            }
            Stage::SegmentData => {
                self.checksum = bytes.iter().fold(self.checksum, |acc, b| acc ^ b);
                self.remaining -= bytes.len() as u32;
                if self.remaining == 0 {
                    self.end_segment();
                }
            }
            Stage::Padding => {
                self.remaining -= bytes.len() as u32;
                if self.remaining == 0 {
                    self.stage = Stage::Checksum;
                }
            }
            Stage::Checksum => {
                if bytes[0] != self.checksum {
                    self.error = Some(ImageError::ChecksumMismatch);
                    return;
                }
                if self.hash_appended {
                    let hasher = core::mem::replace(&mut self.hasher, Sha256::new());
                    self.expected_digest.copy_from_slice(&hasher.finalize());
                    self.stage = Stage::Digest;
                } else {
                    self.stage = Stage::Done;
                }
            }
            Stage::Digest => {
                self.collect(bytes);
                if self.field_len == DIGEST_LEN {
                    if self.field != self.expected_digest {
                        self.error = Some(ImageError::DigestMismatch);
                        return;
                    }
                    self.stage = Stage::Done;
                }
            }
            Stage::Done => {}
        }
    }

    fn parse_header(&mut self) {
        if self.field[0] != IMAGE_MAGIC {
            self.error = Some(ImageError::BadMagic);
            return;
        }
        let segments = self.field[1];
        if segments == 0 || segments > MAX_SEGMENTS {
            self.error = Some(ImageError::BadSegmentCount);
            return;
        }
        self.segments_left = segments;
        self.hash_appended = self.field[HASH_APPENDED_OFFSET] == 1;
        self.field_len = 0;
        self.stage = Stage::SegmentHeader;
        debug!(
            "ota: image header ok, {} segments, digest appended: {}",
            segments, self.hash_appended
        );
    }

    fn end_segment(&mut self) {
        self.segments_left -= 1;
        if self.segments_left > 0 {
            self.stage = Stage::SegmentHeader;
            return;
        }
        // The checksum occupies the last byte of a 16-byte block
        let checksum_at = ((self.consumed + 16) & !15) - 1;
        self.remaining = checksum_at - self.consumed;
        self.stage = if self.remaining == 0 {
            Stage::Checksum
        } else {
            Stage::Padding
        };
    }
}

impl ImageVerifier for EspImageVerifier {
    fn update(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() && self.error.is_none() {
            let take = self.wanted().min(bytes.len());
            let (head, rest) = bytes.split_at(take);
            self.step(head);
            bytes = rest;
        }
    }

    fn verify(&self) -> Result<(), ImageError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.consumed == 0 {
            return Err(ImageError::Empty);
        }
        if self.stage != Stage::Done {
            return Err(ImageError::Truncated);
        }
        if self.trailing > 0 {
            debug!("ota: {} bytes after image end ignored", self.trailing);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(segments: u8, hash: bool) -> [u8; IMAGE_HEADER_LEN] {
        let mut header = [0u8; IMAGE_HEADER_LEN];
        header[0] = IMAGE_MAGIC;
        header[1] = segments;
        header[HASH_APPENDED_OFFSET] = u8::from(hash);
        header
    }

    #[test]
    fn zero_length_segment_is_accepted() {
        let mut image = std::vec::Vec::new();
        image.extend_from_slice(&header(1, false));
        image.extend_from_slice(&0x4000_0000u32.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes());
        // 32 bytes consumed so far; checksum sits at offset 47
        image.extend_from_slice(&[0u8; 15]);
        image.push(CHECKSUM_SEED);

        let mut verifier = EspImageVerifier::new();
        verifier.update(&image);
        assert_eq!(verifier.verify(), Ok(()));
    }

    #[test]
    fn header_split_across_updates() {
        let header = header(1, false);
        let mut verifier = EspImageVerifier::new();
        verifier.update(&header[..5]);
        verifier.update(&header[5..]);
        assert_eq!(verifier.stage, Stage::SegmentHeader);
        assert_eq!(verifier.verify(), Err(ImageError::Truncated));
    }

    #[test]
    fn rejects_too_many_segments() {
        let mut verifier = EspImageVerifier::new();
        verifier.update(&header(MAX_SEGMENTS + 1, false));
        assert_eq!(verifier.verify(), Err(ImageError::BadSegmentCount));
    }
}
