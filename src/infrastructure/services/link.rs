use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Last known state of the Wi-Fi association.
///
/// Written by the Wi-Fi task, read by request handlers.
pub struct LinkMonitor {
    connected: AtomicBool,
    rssi: AtomicI32,
}

impl LinkMonitor {
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            rssi: AtomicI32::new(0),
        }
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        if !connected {
            self.rssi.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn set_rssi(&self, rssi: i32) {
        self.rssi.store(rssi, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Signal strength in dBm, `0` while not associated.
    pub fn rssi(&self) -> i32 {
        if self.is_connected() {
            self.rssi.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

pub static LINK: LinkMonitor = LinkMonitor::new();
