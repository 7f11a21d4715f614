//! De-framing of an upload request body into upload events.
//!
//! A `multipart/form-data` body carries the image as its first part:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="file"; filename="app.bin"\r\n
//! Content-Type: application/octet-stream\r\n
//! \r\n
//! <image bytes>
//! \r\n--<boundary>--\r\n
//! ```
//!
//! Any other body is taken verbatim as the image.

use heapless::{String, Vec};
use log::{info, warn};

use crate::{
    controller::UpdateReport,
    error::{FramingError, UploadFailure},
    reassembler::{UpdateSink, UploadReassembler},
};

/// Longest boundary RFC 2046 allows.
pub const MAX_BOUNDARY_LEN: usize = 70;
/// Capacity for part headers, and the size of chunks handed to the sink.
pub const PART_BUFFER_LEN: usize = 1024;

const DELIMITER_PREFIX: &[u8] = b"\r\n--";
const MAX_DELIMITER_LEN: usize = MAX_BOUNDARY_LEN + DELIMITER_PREFIX.len();
const HEADERS_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartStage {
    Headers,
    Body,
    Epilogue,
}

struct Multipart {
    /// `\r\n--<boundary>`
    delimiter: Vec<u8, MAX_DELIMITER_LEN>,
    stage: PartStage,
    buffer: Vec<u8, PART_BUFFER_LEN>,
    filename: String<64>,
}

enum Mode {
    Raw { started: bool },
    Multipart(Multipart),
}

/// Body de-framer feeding an [`UploadReassembler`].
pub struct UploadFraming {
    mode: Mode,
}

impl UploadFraming {
    /// Body taken verbatim.
    pub const fn raw() -> Self {
        Self {
            mode: Mode::Raw { started: false },
        }
    }

    /// Multipart body with the given boundary.
    pub fn multipart(boundary: &str) -> Result<Self, FramingError> {
        if boundary.is_empty() {
            return Err(FramingError::MissingBoundary);
        }
        if boundary.len() > MAX_BOUNDARY_LEN {
            return Err(FramingError::BoundaryTooLong);
        }
        let mut delimiter = Vec::new();
        delimiter
            .extend_from_slice(DELIMITER_PREFIX)
            .and_then(|()| delimiter.extend_from_slice(boundary.as_bytes()))
            .map_err(|()| FramingError::BoundaryTooLong)?;

        Ok(Self {
            mode: Mode::Multipart(Multipart {
                delimiter,
                stage: PartStage::Headers,
                buffer: Vec::new(),
                filename: String::new(),
            }),
        })
    }

    /// Pick the framing from the request `Content-Type`.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, FramingError> {
        let Some(content_type) = content_type else {
            return Ok(Self::raw());
        };
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        if !media_type.eq_ignore_ascii_case("multipart/form-data") {
            return Ok(Self::raw());
        }
        let boundary = find_boundary(content_type).ok_or(FramingError::MissingBoundary)?;
        Self::multipart(boundary)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.mode, Mode::Multipart(_))
    }

    /// Feed the next body bytes.
    ///
    /// On error the upload is abandoned and no further input is accepted.
    pub fn feed<T: UpdateSink>(
        &mut self,
        input: &[u8],
        upload: &mut UploadReassembler<T>,
    ) -> Result<(), UploadFailure> {
        let result = match &mut self.mode {
            Mode::Raw { started } => feed_raw(started, input, upload),
            Mode::Multipart(part) => part.feed(input, upload),
        };
        if result.is_err() {
            upload.abort();
        }
        result
    }

    /// Signal the end of the body and commit the upload.
    pub fn finish<T: UpdateSink>(
        &mut self,
        upload: &mut UploadReassembler<T>,
    ) -> Result<UpdateReport, UploadFailure> {
        match &mut self.mode {
            Mode::Raw { started } => {
                if !*started {
                    *started = true;
                    upload.on_start()?;
                }
                Ok(upload.on_end()?)
            }
            Mode::Multipart(part) if part.stage == PartStage::Epilogue => Ok(upload.on_end()?),
            Mode::Multipart(part) => {
                warn!("ota: body ended in {:?} stage", part.stage);
                upload.abort();
                Err(FramingError::Truncated.into())
            }
        }
    }
}

fn feed_raw<T: UpdateSink>(
    started: &mut bool,
    input: &[u8],
    upload: &mut UploadReassembler<T>,
) -> Result<(), UploadFailure> {
    if !*started {
        *started = true;
        upload.on_start()?;
    }
    if !input.is_empty() {
        upload.on_data(input)?;
    }
    Ok(())
}

impl Multipart {
    fn feed<T: UpdateSink>(
        &mut self,
        mut input: &[u8],
        upload: &mut UploadReassembler<T>,
    ) -> Result<(), UploadFailure> {
        while !input.is_empty() {
            if self.stage == PartStage::Epilogue {
                return Ok(());
            }
            let room = self.buffer.capacity() - self.buffer.len();
            let take = room.min(input.len());
            // Cannot fail, `take` fits the free capacity
            let _ = self.buffer.extend_from_slice(&input[..take]);
            input = &input[take..];

            match self.stage {
                PartStage::Headers => self.scan_headers(upload)?,
                PartStage::Body => self.scan_body(upload)?,
                PartStage::Epilogue => {}
            }
        }
        Ok(())
    }

    fn scan_headers<T: UpdateSink>(
        &mut self,
        upload: &mut UploadReassembler<T>,
    ) -> Result<(), UploadFailure> {
        let Some(end) = find_subsequence(&self.buffer, HEADERS_END) else {
            if self.buffer.is_full() {
                return Err(FramingError::HeadersTooLarge.into());
            }
            return Ok(());
        };

        let headers = &self.buffer[..end];
        // Opening delimiter is the closing one without the leading CRLF
        if find_subsequence(headers, &self.delimiter[2..]).is_none() {
            return Err(FramingError::Malformed.into());
        }
        if let Some(name) = extract_filename(headers) {
            for ch in name.chars() {
                if self.filename.push(ch).is_err() {
                    break;
                }
            }
        }
        info!(
            "ota: receiving file '{}'",
            if self.filename.is_empty() { "-" } else { self.filename.as_str() }
        );

        let body_start = end + HEADERS_END.len();
        let len = self.buffer.len();
        self.buffer.copy_within(body_start..len, 0);
        self.buffer.truncate(len - body_start);
        self.stage = PartStage::Body;
        upload.on_start()?;
        self.scan_body(upload)
    }

    fn scan_body<T: UpdateSink>(
        &mut self,
        upload: &mut UploadReassembler<T>,
    ) -> Result<(), UploadFailure> {
        if let Some(pos) = find_subsequence(&self.buffer, &self.delimiter) {
            if pos > 0 {
                upload.on_data(&self.buffer[..pos])?;
            }
            self.buffer.clear();
            self.stage = PartStage::Epilogue;
            return Ok(());
        }

        // Hold back a possible delimiter prefix split across reads
        let holdback = self.delimiter.len() - 1;
        let len = self.buffer.len();
        if len > holdback {
            let safe = len - holdback;
            upload.on_data(&self.buffer[..safe])?;
            self.buffer.copy_within(safe..len, 0);
            self.buffer.truncate(holdback);
        }
        Ok(())
    }
}

/// Extract the boundary parameter from a `Content-Type` value.
fn find_boundary(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then_some(value)
    })
}

/// Extract `filename="..."` from part headers.
fn extract_filename(headers: &[u8]) -> Option<&str> {
    const MARKER: &[u8] = b"filename=\"";
    let pos = headers
        .windows(MARKER.len())
        .position(|w| w.eq_ignore_ascii_case(MARKER))?;
    let rest = &headers[pos + MARKER.len()..];
    let end = rest.iter().position(|&b| b == b'"')?;
    core::str::from_utf8(&rest[..end]).ok().filter(|name| !name.is_empty())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
