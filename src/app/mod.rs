//! Application layer - usecases driving the update controller and the
//! device services.

mod usecases;

pub use usecases::{DeviceUsecases, FirmwareUsecases};
