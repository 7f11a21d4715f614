//! Protocol plumbing independent of the device services.

pub(crate) mod net;
