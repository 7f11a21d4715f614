use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::Duration;
use log::{debug, warn};

use super::{HttpResult, connection::HttpConnection};

const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) trait HttpHandler {
    async fn handle_request(&self, conn: &mut HttpConnection<'_>) -> HttpResult;
}

pub(crate) struct HttpServer<'a, T: HttpHandler> {
    handler: &'a T,
}

impl<'a, T: HttpHandler> HttpServer<'a, T> {
    pub(crate) fn new(handler: &'a T) -> Self {
        Self { handler }
    }

    /// Accept and serve connections one at a time, forever.
    pub(crate) async fn listen_and_serve(
        &self,
        stack: Stack<'static>,
        port: u16,
        rx_buffer: &mut [u8],
        tx_buffer: &mut [u8],
    ) -> ! {
        loop {
            let mut socket = TcpSocket::new(stack, &mut *rx_buffer, &mut *tx_buffer);
            socket.set_timeout(Some(SOCKET_TIMEOUT));

            if let Err(e) = socket.accept(port).await {
                debug!("http_server: accept error: {:?}", e);
                continue;
            }

            let mut conn = match HttpConnection::from_socket(socket).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("http_server: connection startup error: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = self.handler.handle_request(&mut conn).await {
                warn!("http_server: connection error: {:?}", e);
            }
            conn.close().await;
        }
    }
}
