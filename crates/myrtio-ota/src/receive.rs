//! Streaming a request body through framing into the update controller.

use core::fmt::Debug;

use log::{debug, info, warn};

use crate::{
    controller::UpdateReport,
    error::UploadFailure,
    framing::UploadFraming,
    reassembler::{UpdateSink, UploadReassembler},
};

/// Request body delivered chunk by chunk.
pub trait UploadBody {
    type Error: Debug;

    fn content_type(&self) -> Option<&str>;

    /// Declared body length, `None` when the body ends with the connection.
    fn content_length(&self) -> Option<u32>;

    /// Read the next chunk and pass it to `op`.
    ///
    /// `op` receives an empty slice once the body is exhausted.
    fn read_and_then<R>(
        &mut self,
        op: impl FnOnce(&[u8]) -> R,
    ) -> impl Future<Output = Result<R, Self::Error>>;
}

/// Stream `body` into `sink` and return the upload outcome.
///
/// A transport error abandons the session and is returned as is. When the
/// upload fails before the body ends, the rest of the body is read and
/// dropped so the peer is still reading when the failure is answered.
pub async fn receive_upload<T: UpdateSink, B: UploadBody>(
    sink: T,
    body: &mut B,
    now_ms: u64,
) -> Result<Result<UpdateReport, UploadFailure>, B::Error> {
    let mut framing = match UploadFraming::from_content_type(body.content_type()) {
        Ok(framing) => framing,
        Err(e) => {
            drain(body).await;
            return Ok(Err(e.into()));
        }
    };
    info!(
        "ota: upload started, multipart={}, length={:?}",
        framing.is_multipart(),
        body.content_length()
    );

    let mut upload = UploadReassembler::new(sink, now_ms);
    loop {
        let fed = body
            .read_and_then(|chunk| (!chunk.is_empty()).then(|| framing.feed(chunk, &mut upload)))
            .await;
        match fed {
            Ok(Some(Ok(()))) => {}
            Ok(Some(Err(failure))) => {
                drain(body).await;
                return Ok(Err(failure));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(
                    "ota: connection lost after {} chunks: {:?}",
                    upload.chunks(),
                    e
                );
                upload.abort();
                return Err(e);
            }
        }
    }
    Ok(framing.finish(&mut upload))
}

/// Read and drop the rest of `body`.
async fn drain<B: UploadBody>(body: &mut B) {
    let mut dropped = 0usize;
    loop {
        match body.read_and_then(<[u8]>::len).await {
            Ok(0) => break,
            Ok(n) => dropped += n,
            Err(e) => {
                debug!("ota: drain stopped after {} bytes: {:?}", dropped, e);
                return;
            }
        }
    }
    debug!("ota: dropped {} unread body bytes", dropped);
}
