use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use log::warn;

use crate::{
    controller::{UpdateController, UpdateReport, UpdateSession},
    error::UpdateError,
    reassembler::UpdateSink,
    store::StagingStore,
};

/// Update controller shared between connection handlers.
///
/// Every call runs to completion under the lock. A call that arrives while
/// another one still holds the controller is refused with
/// [`UpdateError::Busy`] instead of being interleaved.
pub struct SharedController<M: RawMutex, S: StagingStore> {
    inner: Mutex<M, RefCell<UpdateController<S>>>,
}

impl<M: RawMutex, S: StagingStore> SharedController<M, S> {
    pub fn new(controller: UpdateController<S>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(controller)),
        }
    }

    /// Run `op` with exclusive access to the controller.
    pub fn with<R>(
        &self,
        op: impl FnOnce(&mut UpdateController<S>) -> Result<R, UpdateError>,
    ) -> Result<R, UpdateError> {
        self.inner.lock(|cell| {
            let Ok(mut controller) = cell.try_borrow_mut() else {
                warn!("ota: re-entrant controller call rejected");
                return Err(UpdateError::Busy);
            };
            op(&mut controller)
        })
    }

    /// Current session, or `None` while the controller is held.
    pub fn session(&self) -> Option<UpdateSession> {
        self.inner
            .lock(|cell| cell.try_borrow().ok().map(|controller| controller.session()))
    }
}

impl<M: RawMutex, S: StagingStore> UpdateSink for &SharedController<M, S> {
    fn begin(&mut self, now_ms: u64) -> Result<(), UpdateError> {
        self.with(|controller| controller.begin(now_ms))
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UpdateError> {
        self.with(|controller| controller.write_chunk(chunk))
    }

    fn finish(&mut self) -> Result<UpdateReport, UpdateError> {
        self.with(UpdateController::finish)
    }

    fn reset(&mut self) {
        let _ = self.with(|controller| {
            controller.reset();
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    struct NullStore;

    impl StagingStore for NullStore {
        type Handle = ();

        fn open(&mut self, _expected_size: Option<u32>) -> Result<(), UpdateError> {
            Ok(())
        }

        fn append(&mut self, _handle: &mut (), _bytes: &[u8]) -> Result<(), UpdateError> {
            Ok(())
        }

        fn finalize(&mut self, _handle: &mut ()) -> Result<(), UpdateError> {
            Ok(())
        }

        fn abandon(&mut self, _handle: ()) {}
    }

    #[test]
    fn nested_call_is_rejected_as_busy() {
        let shared =
            SharedController::<NoopRawMutex, _>::new(UpdateController::new(NullStore));

        let nested = shared.with(|_outer| Ok(shared.with(|inner| inner.begin(0))));

        assert_eq!(nested, Ok(Err(UpdateError::Busy)));
        assert_eq!(shared.session().map(|s| s.bytes_written), Some(0));
    }
}
