//! ESP32 firmware that receives new application images over HTTP.
//!
//! The update state machine lives in the `myrtio-ota` crate; this crate wires
//! it to Wi-Fi, the HTTP server and the ESP-IDF partition table. It is empty
//! on the host.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", feature(type_alias_impl_trait))]

#[cfg(target_os = "none")]
pub mod app;
#[cfg(target_os = "none")]
pub mod config;
#[cfg(target_os = "none")]
pub mod controllers;
#[cfg(target_os = "none")]
pub(crate) mod core;
#[cfg(target_os = "none")]
pub mod domain;
#[cfg(target_os = "none")]
pub mod infrastructure;

#[macro_export]
// Create a static cell for a given type and value
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}
