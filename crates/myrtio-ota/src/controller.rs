use log::{info, warn};

use crate::{error::UpdateError, store::StagingStore};

/// Lifecycle of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Receiving,
    Finalizing,
    Committed,
    Aborted,
}

/// The one in-flight update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSession {
    pub state: UpdateState,
    pub bytes_written: u32,
    /// Monotonic milliseconds since boot when the session began
    pub started_at_ms: u64,
}

impl UpdateSession {
    const fn idle() -> Self {
        Self {
            state: UpdateState::Idle,
            bytes_written: 0,
            started_at_ms: 0,
        }
    }
}

/// Summary of a committed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub bytes_written: u32,
    pub started_at_ms: u64,
}

/// Update state machine over a [`StagingStore`].
///
/// ```text
/// Idle -> Receiving -> Finalizing -> Committed
///             |             |
///             +-------------+-----> Aborted
/// ```
///
/// Terminal states stay put until [`UpdateController::reset`].
pub struct UpdateController<S: StagingStore> {
    store: S,
    session: UpdateSession,
    handle: Option<S::Handle>,
    last_error: Option<UpdateError>,
}

impl<S: StagingStore> UpdateController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: UpdateSession::idle(),
            handle: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.session.state
    }

    pub fn session(&self) -> UpdateSession {
        self.session
    }

    pub fn bytes_written(&self) -> u32 {
        self.session.bytes_written
    }

    pub fn last_error(&self) -> Option<UpdateError> {
        self.last_error
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Start a session in unknown-length mode.
    pub fn begin(&mut self, now_ms: u64) -> Result<(), UpdateError> {
        match self.session.state {
            UpdateState::Idle => {}
            UpdateState::Receiving | UpdateState::Finalizing => {
                warn!("ota: begin rejected, session in progress");
                return Err(UpdateError::Busy);
            }
            UpdateState::Committed | UpdateState::Aborted => {
                warn!("ota: begin rejected in {:?}", self.session.state);
                return Err(UpdateError::InvalidState);
            }
        }

        self.last_error = None;
        match self.store.open(None) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.session = UpdateSession {
                    state: UpdateState::Receiving,
                    bytes_written: 0,
                    started_at_ms: now_ms,
                };
                info!("ota: session started");
                Ok(())
            }
            Err(err) => {
                self.session.state = UpdateState::Aborted;
                self.last_error = Some(err);
                Err(err)
            }
        }
    }

    /// Stage the next chunk of the image.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), UpdateError> {
        if self.session.state != UpdateState::Receiving {
            warn!("ota: chunk rejected in {:?}", self.session.state);
            return Err(UpdateError::InvalidState);
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(UpdateError::InvalidState);
        };

        match self.store.append(handle, bytes) {
            Ok(()) => {
                // The store caps a session at the partition size, far below u32::MAX
                self.session.bytes_written += bytes.len() as u32;
                Ok(())
            }
            Err(err) => {
                self.abort(err);
                Err(err)
            }
        }
    }

    /// Validate and commit the staged image.
    pub fn finish(&mut self) -> Result<UpdateReport, UpdateError> {
        match self.session.state {
            UpdateState::Receiving => {}
            UpdateState::Finalizing => return Err(UpdateError::Busy),
            state => {
                warn!("ota: finish rejected in {:?}", state);
                return Err(UpdateError::InvalidState);
            }
        }
        let Some(mut handle) = self.handle.take() else {
            return Err(UpdateError::InvalidState);
        };

        self.session.state = UpdateState::Finalizing;
        match self.store.finalize(&mut handle) {
            Ok(()) => {
                self.session.state = UpdateState::Committed;
                info!(
                    "ota: committed {} bytes",
                    self.session.bytes_written
                );
                Ok(UpdateReport {
                    bytes_written: self.session.bytes_written,
                    started_at_ms: self.session.started_at_ms,
                })
            }
            Err(err) => {
                self.store.abandon(handle);
                self.session.state = UpdateState::Aborted;
                self.last_error = Some(err);
                warn!("ota: finalize failed: {}", err);
                Err(err)
            }
        }
    }

    /// Return to `Idle`, releasing any outstanding staging handle.
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.store.abandon(handle);
        }
        if self.session.state != UpdateState::Idle {
            info!("ota: reset from {:?}", self.session.state);
        }
        self.session = UpdateSession::idle();
    }

    fn abort(&mut self, err: UpdateError) {
        warn!(
            "ota: session aborted after {} bytes: {}",
            self.session.bytes_written, err
        );
        if let Some(handle) = self.handle.take() {
            self.store.abandon(handle);
        }
        self.session.state = UpdateState::Aborted;
        self.last_error = Some(err);
    }
}
