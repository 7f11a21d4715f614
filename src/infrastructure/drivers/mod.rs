mod random;
pub mod wifi_sta;

pub use wifi_sta::{WifiStartError, start_wifi_sta};
