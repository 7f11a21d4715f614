use core::fmt;

/// Failure of an update session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// A session is already in flight
    Busy,
    /// Operation called out of sequence
    InvalidState,
    /// Flash append or commit failed
    WriteFailure,
    /// Staging region exhausted
    CapacityExceeded,
    /// Staged image failed the integrity check
    ValidationFailed,
    /// Staging region cannot be reserved
    NoSpace,
}

impl UpdateError {
    pub const fn as_str(self) -> &'static str {
        match self {
            UpdateError::Busy => "update already in progress",
            UpdateError::InvalidState => "operation out of sequence",
            UpdateError::WriteFailure => "flash write failed",
            UpdateError::CapacityExceeded => "image exceeds staging partition",
            UpdateError::ValidationFailed => "image validation failed",
            UpdateError::NoSpace => "staging partition unavailable",
        }
    }
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to de-frame an upload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    MissingBoundary,
    BoundaryTooLong,
    HeadersTooLarge,
    Malformed,
    /// Body ended before the closing delimiter
    Truncated,
}

impl FramingError {
    pub const fn as_str(self) -> &'static str {
        match self {
            FramingError::MissingBoundary => "missing multipart boundary",
            FramingError::BoundaryTooLong => "multipart boundary too long",
            FramingError::HeadersTooLarge => "part headers too large",
            FramingError::Malformed => "malformed multipart body",
            FramingError::Truncated => "upload truncated",
        }
    }
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an upload did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailure {
    Framing(FramingError),
    Update(UpdateError),
}

impl From<FramingError> for UploadFailure {
    fn from(err: FramingError) -> Self {
        UploadFailure::Framing(err)
    }
}

impl From<UpdateError> for UploadFailure {
    fn from(err: UpdateError) -> Self {
        UploadFailure::Update(err)
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadFailure::Framing(err) => err.fmt(f),
            UploadFailure::Update(err) => err.fmt(f),
        }
    }
}
