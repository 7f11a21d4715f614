mod http_server;

pub use http_server::{HTTP_WORKERS, http_server_task};
