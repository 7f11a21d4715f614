//! Domain layer - DTOs and the ports the application layer depends on

pub mod dto;
pub mod ports;
