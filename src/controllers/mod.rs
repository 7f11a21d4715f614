mod http;

pub use http::OtaHttpController;
