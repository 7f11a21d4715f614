use core::fmt::Write as _;

use heapless::String;

use crate::{
    controller::UpdateReport,
    error::{UpdateError, UploadFailure},
};

pub const SUCCESS_MESSAGE: &str = "Update successful. Rebooting...";

/// HTTP answer to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadVerdict {
    pub status: u16,
    pub body: String<96>,
    /// Restart into the new image after responding
    pub reboot: bool,
}

impl UploadVerdict {
    pub fn from_outcome(outcome: &Result<UpdateReport, UploadFailure>) -> Self {
        let mut body = String::new();
        match outcome {
            Ok(_) => {
                let _ = body.push_str(SUCCESS_MESSAGE);
                Self {
                    status: 200,
                    body,
                    reboot: true,
                }
            }
            Err(failure) => {
                let _ = write!(body, "Update failed: {failure}");
                Self {
                    status: status_code(*failure),
                    body,
                    reboot: false,
                }
            }
        }
    }
}

fn status_code(failure: UploadFailure) -> u16 {
    match failure {
        UploadFailure::Framing(_) => 400,
        UploadFailure::Update(err) => match err {
            UpdateError::Busy | UpdateError::InvalidState => 409,
            UpdateError::CapacityExceeded => 413,
            UpdateError::ValidationFailed => 422,
            UpdateError::WriteFailure | UpdateError::NoSpace => 500,
        },
    }
}
