//! Upload lifecycle events mapped onto an update session.

use log::{debug, warn};

use crate::{
    controller::{UpdateController, UpdateReport},
    error::UpdateError,
    store::StagingStore,
};

/// Target of upload events.
pub trait UpdateSink {
    fn begin(&mut self, now_ms: u64) -> Result<(), UpdateError>;
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UpdateError>;
    fn finish(&mut self) -> Result<UpdateReport, UpdateError>;
    fn reset(&mut self);
}

impl<S: StagingStore> UpdateSink for UpdateController<S> {
    fn begin(&mut self, now_ms: u64) -> Result<(), UpdateError> {
        UpdateController::begin(self, now_ms)
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        UpdateController::write_chunk(self, chunk)
    }

    fn finish(&mut self) -> Result<UpdateReport, UpdateError> {
        UpdateController::finish(self)
    }

    fn reset(&mut self) {
        UpdateController::reset(self);
    }
}

impl<T: UpdateSink + ?Sized> UpdateSink for &mut T {
    fn begin(&mut self, now_ms: u64) -> Result<(), UpdateError> {
        (**self).begin(now_ms)
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        (**self).write_chunk(chunk)
    }

    fn finish(&mut self) -> Result<UpdateReport, UpdateError> {
        (**self).finish()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Receiving,
    Ended,
}

/// Tracks one upload and drives the sink through it.
///
/// Out-of-phase events are protocol violations: the session this upload
/// started is abandoned and [`UpdateError::InvalidState`] is returned. A
/// session still owned when the reassembler is dropped is abandoned too,
/// so a lost connection never leaves the controller stuck.
pub struct UploadReassembler<T: UpdateSink> {
    sink: T,
    phase: UploadPhase,
    started_at_ms: u64,
    owns_session: bool,
    chunks: u32,
}

impl<T: UpdateSink> UploadReassembler<T> {
    pub fn new(sink: T, started_at_ms: u64) -> Self {
        Self {
            sink,
            phase: UploadPhase::Idle,
            started_at_ms,
            owns_session: false,
            chunks: 0,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    pub fn on_start(&mut self) -> Result<(), UpdateError> {
        if self.phase != UploadPhase::Idle {
            return Err(self.violation("start"));
        }
        match self.sink.begin(self.started_at_ms) {
            Ok(()) => {
                self.phase = UploadPhase::Receiving;
                self.owns_session = true;
                Ok(())
            }
            // Another upload holds the controller, leave it alone
            Err(err @ (UpdateError::Busy | UpdateError::InvalidState)) => {
                self.phase = UploadPhase::Ended;
                Err(err)
            }
            Err(err) => {
                self.phase = UploadPhase::Ended;
                self.sink.reset();
                Err(err)
            }
        }
    }

    pub fn on_data(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        if self.phase != UploadPhase::Receiving {
            return Err(self.violation("data"));
        }
        self.chunks += 1;
        self.sink.write_chunk(chunk).map_err(|err| self.release(err))
    }

    pub fn on_end(&mut self) -> Result<UpdateReport, UpdateError> {
        if self.phase != UploadPhase::Receiving {
            return Err(self.violation("end"));
        }
        self.phase = UploadPhase::Ended;
        debug!("ota: upload ended after {} chunks", self.chunks);

        let result = self.sink.finish();
        self.owns_session = false;
        self.sink.reset();
        result
    }

    /// Give up the upload, e.g. when the connection dropped.
    pub fn abort(&mut self) {
        if self.owns_session {
            warn!(
                "ota: upload aborted in {:?} after {} chunks",
                self.phase, self.chunks
            );
            self.owns_session = false;
            self.sink.reset();
        }
        self.phase = UploadPhase::Ended;
    }

    fn release(&mut self, err: UpdateError) -> UpdateError {
        self.phase = UploadPhase::Ended;
        self.owns_session = false;
        self.sink.reset();
        err
    }

    fn violation(&mut self, event: &str) -> UpdateError {
        warn!("ota: unexpected {} event in {:?}", event, self.phase);
        if self.owns_session {
            self.owns_session = false;
            self.sink.reset();
        }
        self.phase = UploadPhase::Ended;
        UpdateError::InvalidState
    }
}

impl<T: UpdateSink> Drop for UploadReassembler<T> {
    fn drop(&mut self) {
        self.abort();
    }
}
