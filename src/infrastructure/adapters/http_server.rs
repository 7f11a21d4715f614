//! Generic HTTP Server Adapter
//!
//! Allocates the socket buffers and runs the `listen_and_serve` loop of
//! `HttpServer` with the provided handler. Meant to be called from a task.

use embassy_net::Stack;

use crate::core::net::http::{HttpHandler, HttpServer};

const RX_BUFFER_SIZE: usize = 4096;
const TX_BUFFER_SIZE: usize = 2048;

/// Run the HTTP server with the given handler on `port`.
///
/// The buffers live in the calling task's future (4KB RX + 2KB TX).
pub(crate) async fn run_http_server<H: HttpHandler>(
    stack: Stack<'static>,
    port: u16,
    handler: &H,
) -> ! {
    let server = HttpServer::new(handler);
    let mut rx_buffer = [0u8; RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TX_BUFFER_SIZE];

    server
        .listen_and_serve(stack, port, &mut rx_buffer, &mut tx_buffer)
        .await
}
