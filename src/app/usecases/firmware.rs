use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use log::{info, warn};
use myrtio_ota::{SharedController, StagingStore, UploadBody, UploadVerdict, receive_upload};

use crate::{
    core::net::http::{AsyncChunkedReader, Error as HttpError},
    domain::ports::RestartScheduler,
};

/// Firmware upload usecases.
///
/// Turns a request body into start, data and end events for the shared
/// update controller and restarts the device once an image is committed.
pub struct FirmwareUsecases<M: RawMutex + 'static, S: StagingStore + 'static, R: RestartScheduler> {
    controller: &'static SharedController<M, S>,
    restart: R,
    restart_delay: Duration,
}

impl<M: RawMutex + 'static, S: StagingStore + 'static, R: RestartScheduler>
    FirmwareUsecases<M, S, R>
{
    pub fn new(
        controller: &'static SharedController<M, S>,
        restart: R,
        restart_delay: Duration,
    ) -> Self {
        Self {
            controller,
            restart,
            restart_delay,
        }
    }

    /// Stream an upload body into the staging partition.
    ///
    /// Returns the verdict to answer with. A transport error abandons the
    /// session and is returned as is, the peer is gone at that point.
    pub(crate) async fn receive_upload(
        &self,
        body: &mut impl AsyncChunkedReader,
    ) -> Result<UploadVerdict, HttpError> {
        let mut body = RequestBody(body);
        let outcome =
            receive_upload(self.controller, &mut body, Instant::now().as_millis()).await?;
        match &outcome {
            Ok(report) => info!(
                "ota: committed {} bytes in {} ms",
                report.bytes_written,
                Instant::now()
                    .as_millis()
                    .saturating_sub(report.started_at_ms)
            ),
            Err(failure) => warn!("ota: upload failed: {}", failure),
        }

        Ok(UploadVerdict::from_outcome(&outcome))
    }

    /// Schedule the restart into the new image when the verdict asks for it.
    pub(crate) fn restart_if_committed(&self, verdict: &UploadVerdict) {
        if !verdict.reboot {
            return;
        }
        info!("ota: restarting in {} ms", self.restart_delay.as_millis());
        if let Err(e) = self.restart.schedule_restart(self.restart_delay) {
            warn!("ota: restart not scheduled: {:?}", e);
        }
    }
}

/// Request body of an HTTP connection as an upload source.
struct RequestBody<'b, B>(&'b mut B);

impl<B: AsyncChunkedReader> UploadBody for RequestBody<'_, B> {
    type Error = HttpError;

    fn content_type(&self) -> Option<&str> {
        self.0.content_type()
    }

    fn content_length(&self) -> Option<u32> {
        self.0.content_length()
    }

    fn read_and_then<R>(
        &mut self,
        op: impl FnOnce(&[u8]) -> R,
    ) -> impl Future<Output = Result<R, HttpError>> {
        self.0.read_and_then(op)
    }
}
