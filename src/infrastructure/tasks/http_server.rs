//! HTTP Server Task
//!
//! Each instance serves one connection at a time, so `/status` and `/info`
//! stay reachable while another instance streams an upload.

use embassy_net::Stack;

use crate::{controllers::OtaHttpController, infrastructure::adapters::run_http_server};

pub const HTTP_WORKERS: usize = 2;

#[embassy_executor::task(pool_size = HTTP_WORKERS)]
pub async fn http_server_task(
    stack: Stack<'static>,
    port: u16,
    handler: &'static OtaHttpController,
) {
    run_http_server(stack, port, handler).await
}
